//! Native sparse LU with a cached pivot order.
//!
//! Gaussian elimination over row maps, column by column. Each column's
//! pivot is chosen by threshold partial pivoting: a candidate row must
//! hold at least `pivrel` times the largest magnitude in the column and
//! more than `pivtol` absolute. Among acceptable rows the sparsest wins
//! (Markowitz tie-break), then the largest magnitude.
//!
//! The chosen order is kept and reused by later factorizations of the
//! same structure. A cached pivot that no longer passes the threshold
//! test triggers a fresh ordering for the rest of the elimination.

use crate::error::{NodalError, Result};
use crate::sparse::{CsrMatrix, Scalar};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SparseLu<T> {
    pivrel: f64,
    pivtol: f64,
    /// `order[k]` is the original row eliminated at step k.
    order: Option<Vec<usize>>,
    reorder_requested: bool,
    /// Multipliers applied to the right-hand side, per elimination step.
    lower: Vec<Vec<(usize, T)>>,
    /// Upper-triangular rows per step; the first entry is the pivot.
    upper: Vec<Vec<(usize, T)>>,
    determinant: T,
    pub factorizations: u32,
    pub reorders: u32,
}

impl<T: Scalar> SparseLu<T> {
    pub fn new(pivrel: f64, pivtol: f64) -> Self {
        Self {
            pivrel,
            pivtol,
            order: None,
            reorder_requested: true,
            lower: Vec::new(),
            upper: Vec::new(),
            determinant: T::one(),
            factorizations: 0,
            reorders: 0,
        }
    }

    /// Forget the cached pivot order; the next factorization recomputes it.
    pub fn request_reorder(&mut self) {
        self.reorder_requested = true;
    }

    /// Determinant of the last successfully factored matrix.
    pub fn determinant(&self) -> T {
        self.determinant
    }

    /// Factor `a` in place of any previous factorization.
    pub fn factor(&mut self, a: &CsrMatrix<T>) -> Result<()> {
        let n = a.nrows;
        let mut work: Vec<BTreeMap<usize, T>> = vec![BTreeMap::new(); n];
        let mut col_rows: Vec<Vec<usize>> = vec![Vec::new(); n];
        for row in 0..n {
            for idx in a.row_pointers[row]..a.row_pointers[row + 1] {
                let col = a.col_indices[idx];
                let val = a.values[idx];
                if !val.is_finite() {
                    return Err(NodalError::SingularMatrix { column: col });
                }
                if work[row].insert(col, val).is_none() {
                    col_rows[col].push(row);
                }
            }
        }

        let cached = if self.reorder_requested || self.order.as_ref().map(Vec::len) != Some(n) {
            None
        } else {
            self.order.take()
        };
        let mut fresh = cached.is_none();

        let mut used = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut determinant = T::one();

        for k in 0..n {
            let col_max = col_rows[k]
                .iter()
                .filter(|&&r| !used[r])
                .filter_map(|&r| work[r].get(&k))
                .map(Scalar::magnitude)
                .fold(0.0, f64::max);
            let threshold = (self.pivrel * col_max).max(self.pivtol);

            let reused = match cached.as_ref() {
                Some(prev) if !fresh => {
                    let p = prev[k];
                    let ok = !used[p]
                        && work[p]
                            .get(&k)
                            .is_some_and(|v| v.magnitude() >= threshold && v.magnitude() > 0.0);
                    if ok {
                        Some(p)
                    } else {
                        tracing::debug!(column = k, "cached pivot rejected, reordering");
                        fresh = true;
                        None
                    }
                }
                _ => None,
            };

            let p = match reused {
                Some(p) => p,
                None => col_rows[k]
                    .iter()
                    .copied()
                    .filter(|&r| !used[r])
                    .filter_map(|r| work[r].get(&k).map(|v| (r, v.magnitude())))
                    .filter(|&(_, mag)| mag >= threshold && mag > 0.0)
                    .min_by(|a, b| {
                        work[a.0]
                            .len()
                            .cmp(&work[b.0].len())
                            .then(b.1.total_cmp(&a.1))
                    })
                    .map(|(r, _)| r)
                    .ok_or(NodalError::SingularMatrix { column: k })?,
            };

            used[p] = true;
            order.push(p);
            let pivot = work[p][&k];
            determinant = determinant * pivot;

            let pivot_row: Vec<(usize, T)> = work[p].range(k..).map(|(&j, &v)| (j, v)).collect();
            let mut ops = Vec::new();
            for i in 0..col_rows[k].len() {
                let r = col_rows[k][i];
                if used[r] {
                    continue;
                }
                let Some(a_rk) = work[r].remove(&k) else {
                    continue;
                };
                let factor = a_rk / pivot;
                ops.push((r, factor));
                for &(j, u) in &pivot_row[1..] {
                    match work[r].get_mut(&j) {
                        Some(v) => *v -= factor * u,
                        None => {
                            work[r].insert(j, -(factor * u));
                            col_rows[j].push(r);
                        }
                    }
                }
            }
            lower.push(ops);
            upper.push(pivot_row);
        }

        if fresh {
            self.reorders += 1;
        }
        self.factorizations += 1;
        determinant = determinant * permutation_sign::<T>(&order);
        self.order = Some(order);
        self.reorder_requested = false;
        self.lower = lower;
        self.upper = upper;
        self.determinant = determinant;
        Ok(())
    }

    /// Solve with the last factorization. `b` is indexed by row on entry
    /// and holds the solution indexed by column on return.
    pub fn solve(&self, b: &mut [T]) -> Result<()> {
        let Some(order) = self.order.as_ref() else {
            return Err(NodalError::Analysis("solve called before factor".into()));
        };
        let n = order.len();
        if b.len() != n {
            return Err(NodalError::Analysis(format!(
                "dimension mismatch: matrix is {n}x{n}, rhs length is {}",
                b.len()
            )));
        }

        for (k, ops) in self.lower.iter().enumerate() {
            let bp = b[order[k]];
            for &(r, factor) in ops {
                b[r] -= factor * bp;
            }
        }

        let mut x = vec![T::zero(); n];
        for k in (0..n).rev() {
            let row = &self.upper[k];
            let mut sum = b[order[k]];
            for &(j, u) in &row[1..] {
                sum -= u * x[j];
            }
            x[k] = sum / row[0].1;
        }
        b.copy_from_slice(&x);
        Ok(())
    }
}

/// Sign of the row permutation `order`, as a scalar.
fn permutation_sign<T: Scalar>(order: &[usize]) -> T {
    let mut seen = vec![false; order.len()];
    let mut odd = false;
    for start in 0..order.len() {
        if seen[start] {
            continue;
        }
        let mut len = 0;
        let mut i = start;
        while !seen[i] {
            seen[i] = true;
            i = order[i];
            len += 1;
        }
        if len % 2 == 0 {
            odd = !odd;
        }
    }
    if odd {
        -T::one()
    } else {
        T::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;

    fn lu<T: Scalar>() -> SparseLu<T> {
        SparseLu::new(1e-3, 1e-13)
    }

    #[test]
    fn solves_known_2x2() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 5.0), (1, 1, 7.0)]);
        let mut solver = lu();
        solver.factor(&a).unwrap();
        let mut b = vec![11.0, 13.0];
        solver.solve(&mut b).unwrap();
        assert_abs_diff_eq!(b[0], 64.0 / 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b[1], -29.0 / 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(solver.determinant(), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_diagonal_needs_pivoting() {
        // Voltage-source style row: [[0, 1, 1], [1, 0, 0], [1, 1, 0]]
        let a = CsrMatrix::from_triplets(
            3,
            3,
            &[(0, 1, 1.0), (0, 2, 1.0), (1, 0, 1.0), (2, 0, 1.0), (2, 1, 1.0)],
        );
        let mut solver = lu();
        solver.factor(&a).unwrap();
        let mut b = vec![3.0, 1.0, 3.0];
        solver.solve(&mut b).unwrap();
        assert_abs_diff_eq!(b[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(solver.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_reports_column() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]);
        let err = lu::<f64>().factor(&a).unwrap_err();
        assert!(matches!(err, NodalError::SingularMatrix { column: 1 }));
    }

    #[test]
    fn cached_order_reused_until_pivot_degrades() {
        let mut solver = lu();
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        solver.factor(&a).unwrap();
        solver.factor(&a).unwrap();
        assert_eq!(solver.factorizations, 2);
        assert_eq!(solver.reorders, 1);

        // Same structure, but the cached first pivot is now tiny.
        let b = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1e-9), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        solver.factor(&b).unwrap();
        assert_eq!(solver.reorders, 2);
        let mut rhs = vec![1.0, 4.0];
        solver.solve(&mut rhs).unwrap();
        let residual = b.spmv(&rhs);
        assert_abs_diff_eq!(residual[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(residual[1], 4.0, epsilon = 1e-9);

        solver.request_reorder();
        solver.factor(&b).unwrap();
        assert_eq!(solver.reorders, 3);
    }

    #[test]
    fn complex_system() {
        // [[1+j, 0], [1, 2]] x = [2j, 1+j]  ->  x = [1+j, -j/2 ... ]
        let j = Complex64::new(0.0, 1.0);
        let one = Complex64::new(1.0, 0.0);
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, one + j), (1, 0, one), (1, 1, 2.0 * one)]);
        let mut solver = lu();
        solver.factor(&a).unwrap();
        let mut b = vec![2.0 * j, one + j];
        solver.solve(&mut b).unwrap();
        // x0 = 2j / (1+j) = 1 + j
        assert_abs_diff_eq!(b[0].re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b[0].im, 1.0, epsilon = 1e-12);
        // x1 = ((1+j) - x0) / 2 = 0
        assert_abs_diff_eq!(b[1].norm(), 0.0, epsilon = 1e-12);
        let det = solver.determinant();
        assert_abs_diff_eq!(det.re, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(det.im, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_system() {
        let mut solver = lu::<f64>();
        solver.factor(&CsrMatrix::new(0, 0)).unwrap();
        let mut b: Vec<f64> = Vec::new();
        solver.solve(&mut b).unwrap();
        assert!(b.is_empty());
    }
}
