//! Error types for WCS fitting.

use thiserror::Error;

use crate::projection::ProjectionError;

/// Errors that can occur while fitting a WCS.
///
/// Every check runs before any numerical work it guards, so a returned error
/// never comes with a partially fitted model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Input coordinate arrays have different lengths.
    #[error(
        "coordinate arrays differ in length: pixel_x={pixel_x}, pixel_y={pixel_y}, ra={ra}, dec={dec}"
    )]
    DimensionMismatch {
        pixel_x: usize,
        pixel_y: usize,
        ra: usize,
        dec: usize,
    },
    /// Polynomial order below 1.
    #[error("polynomial order must be at least 1, got {0}")]
    InvalidOrder(u32),
    /// Fewer correspondences than polynomial terms.
    #[error("order-{order} fit has {terms} terms but only {points} correspondences")]
    UnderdeterminedSystem {
        points: usize,
        terms: usize,
        order: u32,
    },
    /// Design matrix does not have full column rank.
    #[error("least-squares system is rank deficient ({rows}x{cols} design matrix)")]
    SingularSystem { rows: usize, cols: usize },
    /// Right-hand side handed to a least-squares solve has the wrong length.
    #[error("right-hand side has {got} entries, design matrix has {expected} rows")]
    RhsLengthMismatch { expected: usize, got: usize },
    /// Fitted CD matrix cannot be inverted.
    #[error("fitted CD matrix is singular (det = {det:e})")]
    SingularCd { det: f64 },
    /// Failure reported by the projection capability.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// Fit configuration is unusable.
    #[error("invalid fit configuration: {0}")]
    InvalidConfig(String),
}
