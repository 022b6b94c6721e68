//! Polynomial basis in pixel offsets.
//!
//! Terms are `dx^ix · dy^iy` with `ix + iy <= order`, enumerated in a fixed
//! scan of the `(iy, ix)` grid: `iy` outer, `ix` inner. For order 2:
//!
//! ```text
//! slot:  0      1      2      3      4      5
//! term: (0,0)  (1,0)  (2,0)  (0,1)  (1,1)  (0,2)
//! ```
//!
//! The constant term is always slot 0, the pure-x term slot 1 and the pure-y
//! term slot `order + 1`. Callers look slots up by exponent through
//! [`TermSet::slot`] and the named accessors rather than hard-coding indices.

use nalgebra::DMatrix;

use crate::error::FitError;

/// One monomial `dx^ix · dy^iy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolynomialTerm {
    pub ix: u32,
    pub iy: u32,
}

impl PolynomialTerm {
    /// Total degree `ix + iy`.
    pub fn degree(&self) -> u32 {
        self.ix + self.iy
    }

    /// Evaluate the monomial at `(dx, dy)`.
    #[inline]
    pub fn eval(&self, dx: f64, dy: f64) -> f64 {
        dx.powi(self.ix as i32) * dy.powi(self.iy as i32)
    }
}

/// Number of terms with total degree `<= order`.
///
/// Saturates at `usize::MAX` for orders whose term count does not fit.
pub fn term_count(order: u32) -> usize {
    let n = order as usize;
    let (a, b) = (n.saturating_add(1), n.saturating_add(2));
    // one of two consecutive integers is even; halve it first
    let product = if a % 2 == 0 {
        (a / 2).checked_mul(b)
    } else {
        a.checked_mul(b / 2)
    };
    product.unwrap_or(usize::MAX)
}

/// The ordered set of polynomial terms for one fit order.
#[derive(Debug, Clone, PartialEq)]
pub struct TermSet {
    order: u32,
    terms: Vec<PolynomialTerm>,
}

impl TermSet {
    /// Enumerate all terms of total degree `<= order`.
    ///
    /// Fails with [`FitError::InvalidOrder`] for `order < 1`.
    pub fn new(order: u32) -> Result<Self, FitError> {
        if order < 1 {
            return Err(FitError::InvalidOrder(order));
        }
        let mut terms = Vec::with_capacity(term_count(order));
        for iy in 0..=order {
            for ix in 0..=order {
                if ix + iy <= order {
                    terms.push(PolynomialTerm { ix, iy });
                }
            }
        }
        Ok(Self { order, terms })
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[PolynomialTerm] {
        &self.terms
    }

    /// Slot of the term `dx^ix · dy^iy`, if it belongs to this set.
    pub fn slot(&self, ix: u32, iy: u32) -> Option<usize> {
        if ix + iy > self.order {
            return None;
        }
        // Rows iy' < iy hold (order + 1 - iy') terms each.
        let order = self.order as usize;
        let row_start: usize = (0..iy as usize).map(|r| order + 1 - r).sum();
        Some(row_start + ix as usize)
    }

    /// Slot of the constant term.
    pub fn constant_slot(&self) -> usize {
        0
    }

    /// Slot of the linear `dx` term.
    pub fn pure_x_slot(&self) -> usize {
        1
    }

    /// Slot of the linear `dy` term.
    pub fn pure_y_slot(&self) -> usize {
        self.order as usize + 1
    }

    /// Build the design matrix: one row per point, column `j` holding
    /// `dx^ix_j · dy^iy_j`.
    ///
    /// `dx` and `dy` must have equal length.
    pub fn design_matrix(&self, dx: &[f64], dy: &[f64]) -> DMatrix<f64> {
        debug_assert_eq!(dx.len(), dy.len());
        DMatrix::from_fn(dx.len(), self.terms.len(), |row, col| {
            self.terms[col].eval(dx[row], dy[row])
        })
    }
}
