//! Linear least squares via Householder QR.
//!
//! Solves `min ‖A·x − b‖` for a tall design matrix `A` (m×n, m ≥ n):
//! factor `A = Q·R`, project `y = Qᵀ·b`, back-substitute `R·x = y`.
//!
//! Columns are scaled to unit norm before factoring. Raw monomials such as
//! `1` and `dx⁵` differ by many orders of magnitude, and without the scaling
//! the rank test below would be dominated by the largest column. The scaling
//! is undone on the solution, so the least-squares optimum is unchanged.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// A QR factorization of a design matrix, reusable for several right-hand
/// sides.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    /// Thin Q factor (m×n).
    q: DMatrix<f64>,
    /// Upper-triangular R factor (n×n) of the column-scaled matrix.
    r: DMatrix<f64>,
    /// Euclidean norm of each original column.
    col_scale: DVector<f64>,
}

impl LeastSquares {
    /// Factor `a`.
    ///
    /// Fails with [`FitError::SingularSystem`] when `a` does not have full
    /// column rank: fewer rows than columns, a zero (or non-finite) column,
    /// or an `R` diagonal entry below `max(m, n) · ε · max|R_ii|`.
    pub fn new(a: &DMatrix<f64>) -> Result<Self, FitError> {
        let (rows, cols) = a.shape();
        let singular = FitError::SingularSystem { rows, cols };
        if cols == 0 || rows < cols {
            return Err(singular);
        }

        let col_scale = DVector::from_iterator(cols, a.column_iter().map(|c| c.norm()));
        if col_scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(singular);
        }

        let mut scaled = a.clone();
        for (mut col, &s) in scaled.column_iter_mut().zip(col_scale.iter()) {
            col /= s;
        }

        let qr = scaled.qr();
        let q = qr.q();
        let r = qr.r();

        let diag = r.diagonal();
        let tol = rows.max(cols) as f64 * f64::EPSILON * diag.amax();
        if diag.iter().any(|d| d.abs() <= tol) {
            return Err(singular);
        }

        Ok(Self { q, r, col_scale })
    }

    /// Number of rows of the factored matrix.
    pub fn rows(&self) -> usize {
        self.q.nrows()
    }

    /// Number of unknowns.
    pub fn cols(&self) -> usize {
        self.r.ncols()
    }

    /// Least-squares solution for right-hand side `b`.
    ///
    /// Fails with [`FitError::RhsLengthMismatch`] unless `b` has one entry per
    /// row of the factored matrix.
    pub fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>, FitError> {
        if b.len() != self.rows() {
            return Err(FitError::RhsLengthMismatch {
                expected: self.rows(),
                got: b.len(),
            });
        }
        let y = self.q.tr_mul(b);
        let x = self
            .r
            .solve_upper_triangular(&y)
            .ok_or(FitError::SingularSystem {
                rows: self.rows(),
                cols: self.cols(),
            })?;
        Ok(x.component_div(&self.col_scale))
    }
}

/// One-shot least-squares solve of `a·x ≈ b`.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, FitError> {
    LeastSquares::new(a)?.solve(b)
}
