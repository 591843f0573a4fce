//! Compressed Sparse Row (CSR) snapshots and the scalar abstraction.
//!
//! The stamping matrix ([`crate::matrix::SparseMatrix`]) exports its
//! accumulated values as a `CsrMatrix` for external solvers and for
//! residual checks. Generic over value type to support both f64 (DC,
//! transient) and Complex64 (AC, pole-zero).

use num_complex::Complex64;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Field element the matrix and LU factorization operate on.
pub trait Scalar:
    Copy
    + Debug
    + Default
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
{
    fn zero() -> Self {
        Self::default()
    }
    fn one() -> Self;
    /// Magnitude used for pivot selection.
    fn magnitude(&self) -> f64;
    fn is_finite(&self) -> bool;
}

impl Scalar for f64 {
    fn one() -> Self {
        1.0
    }
    fn magnitude(&self) -> f64 {
        self.abs()
    }
    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
}

impl Scalar for Complex64 {
    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }
    fn magnitude(&self) -> f64 {
        self.norm()
    }
    fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Sparse matrix in Compressed Sparse Row format.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    /// Non-zero values, stored row by row.
    pub values: Vec<T>,
    /// Column index for each non-zero value.
    pub col_indices: Vec<usize>,
    /// `row_pointers[i]` is the index into values/col_indices where row i starts.
    /// `row_pointers[nrows]` = total number of non-zeros.
    pub row_pointers: Vec<usize>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Create an empty matrix with no non-zero entries.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_pointers: vec![0; nrows + 1],
        }
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Build CSR matrix from (row, col, value) triplets.
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, T)]) -> Self {
        if triplets.is_empty() {
            return Self::new(nrows, ncols);
        }

        let mut indices: Vec<usize> = (0..triplets.len()).collect();
        indices.sort_by_key(|&i| (triplets[i].0, triplets[i].1));

        let mut values = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut row_pointers = vec![0usize; nrows + 1];

        let (mut cur_row, mut cur_col, mut cur_val) = triplets[indices[0]];
        for &idx in &indices[1..] {
            let (row, col, val) = triplets[idx];
            if row == cur_row && col == cur_col {
                cur_val += val;
            } else {
                values.push(cur_val);
                col_indices.push(cur_col);
                row_pointers[cur_row + 1] += 1;
                cur_row = row;
                cur_col = col;
                cur_val = val;
            }
        }
        values.push(cur_val);
        col_indices.push(cur_col);
        row_pointers[cur_row + 1] += 1;

        for i in 1..=nrows {
            row_pointers[i] += row_pointers[i - 1];
        }

        Self {
            nrows,
            ncols,
            values,
            col_indices,
            row_pointers,
        }
    }

    /// Value stored at `(row, col)`, zero when the entry is structurally absent.
    pub fn get(&self, row: usize, col: usize) -> T {
        (self.row_pointers[row]..self.row_pointers[row + 1])
            .find(|&idx| self.col_indices[idx] == col)
            .map(|idx| self.values[idx])
            .unwrap_or_default()
    }

    /// Sparse matrix-vector multiply: y = A * x. Panics when `x` does not
    /// have `ncols` entries.
    pub fn spmv(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "spmv dimension mismatch");
        let mut y = vec![T::zero(); self.nrows];
        for (row, out) in y.iter_mut().enumerate() {
            let mut sum = T::zero();
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *out = sum;
        }
        y
    }
}
