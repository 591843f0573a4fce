//! Linear system solvers behind the stamping matrix.

pub mod lu;
pub mod sparse_direct;

use crate::error::Result;
use crate::options::SolverBackend;
use crate::sparse::CsrMatrix;
use lu::SparseLu;
use num_complex::Complex64;
use std::fmt::Debug;

/// A solver for linear systems Ax = b that may cache structure between calls.
///
/// `b` holds the right-hand side on entry and the solution on return.
pub trait LinearSolver: Debug {
    /// Factor and solve a real-valued system.
    fn solve_real(&mut self, a: &CsrMatrix<f64>, b: &mut [f64]) -> Result<()>;

    /// Factor and solve a complex-valued system.
    fn solve_complex(&mut self, a: &CsrMatrix<Complex64>, b: &mut [Complex64]) -> Result<()>;

    /// Discard cached pivot orders; the next factorization recomputes them.
    fn request_reorder(&mut self);

    /// Determinant of the last complex factorization.
    fn complex_determinant(&self) -> Complex64;

    /// (factorizations, reorders) performed so far.
    fn counters(&self) -> (u32, u32);
}

/// Build the solver selected by the options.
pub fn make_solver(backend: SolverBackend, pivrel: f64, pivtol: f64) -> Box<dyn LinearSolver> {
    match backend {
        SolverBackend::Native => Box::new(NativeSolver::new(pivrel, pivtol)),
        SolverBackend::Faer => Box::new(sparse_direct::FaerSolver::new(pivrel, pivtol)),
    }
}

/// Pivot-caching sparse LU for both real and complex systems.
#[derive(Debug)]
pub struct NativeSolver {
    real: SparseLu<f64>,
    complex: SparseLu<Complex64>,
}

impl NativeSolver {
    pub fn new(pivrel: f64, pivtol: f64) -> Self {
        Self {
            real: SparseLu::new(pivrel, pivtol),
            complex: SparseLu::new(pivrel, pivtol),
        }
    }
}

impl LinearSolver for NativeSolver {
    fn solve_real(&mut self, a: &CsrMatrix<f64>, b: &mut [f64]) -> Result<()> {
        self.real.factor(a)?;
        self.real.solve(b)
    }

    fn solve_complex(&mut self, a: &CsrMatrix<Complex64>, b: &mut [Complex64]) -> Result<()> {
        self.complex.factor(a)?;
        self.complex.solve(b)
    }

    fn request_reorder(&mut self) {
        self.real.request_reorder();
        self.complex.request_reorder();
    }

    fn complex_determinant(&self) -> Complex64 {
        self.complex.determinant()
    }

    fn counters(&self) -> (u32, u32) {
        (
            self.real.factorizations + self.complex.factorizations,
            self.real.reorders + self.complex.reorders,
        )
    }
}
