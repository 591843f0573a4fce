//! faer-backed sparse LU for the real system.
//!
//! faer computes its own fill-reducing ordering on every factorization,
//! so `request_reorder` only affects the complex path, which stays on
//! the native LU.

use super::lu::SparseLu;
use super::LinearSolver;
use crate::error::{NodalError, Result};
use crate::sparse::CsrMatrix;
use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use num_complex::Complex64;

#[derive(Debug)]
pub struct FaerSolver {
    complex: SparseLu<Complex64>,
    factorizations: u32,
}

impl FaerSolver {
    pub fn new(pivrel: f64, pivtol: f64) -> Self {
        Self {
            complex: SparseLu::new(pivrel, pivtol),
            factorizations: 0,
        }
    }
}

impl LinearSolver for FaerSolver {
    fn solve_real(&mut self, a: &CsrMatrix<f64>, b: &mut [f64]) -> Result<()> {
        self.factorizations += 1;
        solve_real_sparse_lu(a, b)
    }

    fn solve_complex(&mut self, a: &CsrMatrix<Complex64>, b: &mut [Complex64]) -> Result<()> {
        self.complex.factor(a)?;
        self.complex.solve(b)
    }

    fn request_reorder(&mut self) {
        self.complex.request_reorder();
    }

    fn complex_determinant(&self) -> Complex64 {
        self.complex.determinant()
    }

    fn counters(&self) -> (u32, u32) {
        (
            self.factorizations + self.complex.factorizations,
            self.factorizations + self.complex.reorders,
        )
    }
}

/// Solve a real-valued linear system with faer's sparse LU, in place.
pub fn solve_real_sparse_lu(a: &CsrMatrix<f64>, b: &mut [f64]) -> Result<()> {
    let n = a.nrows;
    if a.ncols != n || b.len() != n {
        return Err(NodalError::Analysis(format!(
            "dimension mismatch: matrix is {}x{}, rhs length is {}",
            a.nrows,
            a.ncols,
            b.len()
        )));
    }
    if n == 0 {
        return Ok(());
    }

    let mut triplets = Vec::with_capacity(a.values.len());
    for row in 0..n {
        for idx in a.row_pointers[row]..a.row_pointers[row + 1] {
            let val = a.values[idx];
            if !val.is_finite() {
                return Err(NodalError::SingularMatrix { column: a.col_indices[idx] });
            }
            triplets.push(Triplet::new(row, a.col_indices[idx], val));
        }
    }

    let a_sp = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
        .map_err(|e| NodalError::Analysis(format!("sparse matrix build failed: {e:?}")))?;

    let lu = a_sp.sp_lu().map_err(|e| {
        tracing::debug!(?e, "faer sparse LU failed");
        NodalError::SingularMatrix { column: 0 }
    })?;

    let rhs = faer::Mat::<f64>::from_fn(n, 1, |i, _| b[i]);
    let x = lu.solve(rhs);

    for (i, out) in b.iter_mut().enumerate() {
        let xi = x[(i, 0)];
        if !xi.is_finite() {
            return Err(NodalError::SingularMatrix { column: i });
        }
        *out = xi;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_lu_solves_known_2x2() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 5.0), (1, 1, 7.0)]);
        let mut b = vec![11.0, 13.0];
        solve_real_sparse_lu(&a, &mut b).expect("sparse LU should solve");
        assert!((b[0] - 64.0 / 9.0).abs() < 1e-10);
        assert!((b[1] + 29.0 / 9.0).abs() < 1e-10);
    }

    #[test]
    fn sparse_lu_reports_singular() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]);
        let mut b = vec![1.0, 1.0];
        let err = solve_real_sparse_lu(&a, &mut b).expect_err("matrix should be singular");
        assert!(err.is_convergence_failure());
    }
}
