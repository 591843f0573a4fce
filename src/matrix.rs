//! The stamping matrix: MNA coefficients addressed through handles.
//!
//! Devices call [`SparseMatrix::allocate`] once per `(row, col)` pair at
//! setup and keep the returned [`MatrixHandle`]. Every Newton iteration
//! they add into the cell through the handle. Row and column 0 are the
//! ground node and are not part of the system; handles against ground
//! are the [`MatrixHandle::GROUND`] sentinel and their stamps vanish.
//!
//! After [`SparseMatrix::finalize`] the handles index a CSR structure
//! directly, so the accumulated values can be handed to the solver with
//! no copy.

use crate::error::{NodalError, Result};
use crate::solver::{make_solver, LinearSolver};
use crate::options::SolverBackend;
use crate::sparse::CsrMatrix;
use num_complex::Complex64;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixHandle(u32);

impl MatrixHandle {
    pub const GROUND: MatrixHandle = MatrixHandle(u32::MAX);

    pub fn is_ground(self) -> bool {
        self == Self::GROUND
    }
}

#[derive(Debug)]
pub struct SparseMatrix {
    size: usize,
    positions: HashMap<(usize, usize), MatrixHandle>,
    /// `(row, col)` of each handle, 1-based unknown indices.
    entries: Vec<(usize, usize)>,
    /// CSR value index of each handle; valid after `finalize`.
    slots: Vec<usize>,
    real: CsrMatrix<f64>,
    complex: CsrMatrix<Complex64>,
    solver: Box<dyn LinearSolver>,
    finalized: bool,
}

impl SparseMatrix {
    pub fn new(backend: SolverBackend, pivrel: f64, pivtol: f64) -> Self {
        Self {
            size: 0,
            positions: HashMap::new(),
            entries: Vec::new(),
            slots: Vec::new(),
            real: CsrMatrix::new(0, 0),
            complex: CsrMatrix::new(0, 0),
            solver: make_solver(backend, pivrel, pivtol),
            finalized: false,
        }
    }

    /// Reserve the cell at `(row, col)` and return its handle.
    ///
    /// Repeated allocation of the same cell returns the same handle.
    pub fn allocate(&mut self, row: usize, col: usize) -> MatrixHandle {
        if row == 0 || col == 0 {
            return MatrixHandle::GROUND;
        }
        if let Some(&h) = self.positions.get(&(row, col)) {
            return h;
        }
        let h = MatrixHandle(self.entries.len() as u32);
        self.entries.push((row, col));
        self.positions.insert((row, col), h);
        self.finalized = false;
        h
    }

    /// Freeze the structure for a system of `size` unknowns (ground excluded).
    pub fn finalize(&mut self, size: usize) -> Result<()> {
        if let Some(&(r, c)) = self.entries.iter().find(|&&(r, c)| r > size || c > size) {
            return Err(NodalError::Setup(format!(
                "matrix entry ({r}, {c}) outside a system of {size} unknowns"
            )));
        }
        self.size = size;
        let triplets: Vec<(usize, usize, f64)> =
            self.entries.iter().map(|&(r, c)| (r - 1, c - 1, 0.0)).collect();
        self.real = CsrMatrix::from_triplets(size, size, &triplets);
        self.slots = self
            .entries
            .iter()
            .map(|&(r, c)| {
                let (row, col) = (r - 1, c - 1);
                (self.real.row_pointers[row]..self.real.row_pointers[row + 1])
                    .find(|&idx| self.real.col_indices[idx] == col)
                    .unwrap_or(usize::MAX)
            })
            .collect();
        self.complex = CsrMatrix {
            nrows: size,
            ncols: size,
            values: vec![Complex64::new(0.0, 0.0); self.real.nnz()],
            col_indices: self.real.col_indices.clone(),
            row_pointers: self.real.row_pointers.clone(),
        };
        self.solver.request_reorder();
        self.finalized = true;
        Ok(())
    }

    /// Number of unknowns, ground excluded.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Additive real stamp.
    #[inline]
    pub fn add(&mut self, h: MatrixHandle, value: f64) {
        if !h.is_ground() {
            self.real.values[self.slots[h.0 as usize]] += value;
        }
    }

    /// Additive complex stamp.
    #[inline]
    pub fn add_complex(&mut self, h: MatrixHandle, value: Complex64) {
        if !h.is_ground() {
            self.complex.values[self.slots[h.0 as usize]] += value;
        }
    }

    /// Current real value of a cell (zero for ground).
    pub fn get(&self, h: MatrixHandle) -> f64 {
        if h.is_ground() {
            0.0
        } else {
            self.real.values[self.slots[h.0 as usize]]
        }
    }

    pub fn get_complex(&self, h: MatrixHandle) -> Complex64 {
        if h.is_ground() {
            Complex64::new(0.0, 0.0)
        } else {
            self.complex.values[self.slots[h.0 as usize]]
        }
    }

    pub fn clear_real(&mut self) {
        self.real.values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn clear_complex(&mut self) {
        self.complex.values.iter_mut().for_each(|v| *v = Complex64::new(0.0, 0.0));
    }

    /// Force a fresh pivot order on the next factorization.
    pub fn reorder(&mut self) {
        self.solver.request_reorder();
    }

    /// Factor the real system and solve in place. `rhs[0]` is ground.
    pub fn factor_and_solve(&mut self, rhs: &mut [f64]) -> Result<()> {
        self.check_rhs(rhs.len())?;
        self.solver.solve_real(&self.real, &mut rhs[1..])?;
        rhs[0] = 0.0;
        Ok(())
    }

    /// Factor the complex system and solve in place. `rhs[0]` is ground.
    pub fn factor_and_solve_complex(&mut self, rhs: &mut [Complex64]) -> Result<()> {
        self.check_rhs(rhs.len())?;
        self.solver.solve_complex(&self.complex, &mut rhs[1..])?;
        rhs[0] = Complex64::new(0.0, 0.0);
        Ok(())
    }

    /// Determinant of the last complex factorization.
    pub fn complex_determinant(&self) -> Complex64 {
        self.solver.complex_determinant()
    }

    /// (factorizations, reorders) performed by the solver.
    pub fn solver_counters(&self) -> (u32, u32) {
        self.solver.counters()
    }

    pub fn real_csr(&self) -> &CsrMatrix<f64> {
        &self.real
    }

    pub fn complex_csr(&self) -> &CsrMatrix<Complex64> {
        &self.complex
    }

    fn check_rhs(&self, len: usize) -> Result<()> {
        if !self.finalized {
            return Err(NodalError::Setup("matrix used before finalize".into()));
        }
        if len != self.size + 1 {
            return Err(NodalError::Analysis(format!(
                "rhs length {len} does not match {} unknowns plus ground",
                self.size
            )));
        }
        Ok(())
    }
}
