//! # wcsfit
//!
//! Fit a FITS **World Coordinate System** with **SIP distortion** to a set of
//! pixel/sky correspondences.
//!
//! Given measured pixel positions of sources and their known sky positions,
//! `wcsfit` produces a zenithal (TAN or ZEA) WCS: a reference pixel, a
//! reference sky coordinate, a CD matrix, and SIP polynomial grids capturing
//! optical distortion up to the requested order.
//!
//! ## Features
//!
//! - **Gnomonic and zenithal equal-area** projections, numerically stable down
//!   to milliarcsecond offsets from the reference point
//! - **Arbitrary SIP order** — total polynomial degree 1 (linear) and up
//! - **Iterative linearization** — the reference sky coordinate is re-derived
//!   every round, so a coarse initial guess is enough
//! - **QR least squares** with column equilibration for poorly scaled
//!   high-order monomials
//! - **Pluggable projection** — bring your own [`ProjectionModel`]
//!
//! ## Example
//!
//! ```no_run
//! use wcsfit::{fit_wcs, Projection};
//!
//! let pixel_x = vec![100.0, 900.0, 100.0, 900.0, 500.0];
//! let pixel_y = vec![100.0, 100.0, 900.0, 900.0, 500.0];
//! let ra = vec![180.056, 179.944, 180.056, 179.944, 180.0];
//! let dec = vec![44.96, 44.96, 45.04, 45.04, 45.0];
//!
//! let wcs = fit_wcs(
//!     &pixel_x, &pixel_y, &ra, &dec,
//!     500.0, 500.0,   // center pixel → CRPIX
//!     180.0, 45.0,    // initial CRVAL guess
//!     1,              // linear fit
//!     Projection::Tan,
//! )
//! .unwrap();
//!
//! println!("CRVAL = {:?}", wcs.crval);
//! println!("CD    = {:?}", wcs.cd);
//! println!("scale = {:.3}\"/px", wcs.pixel_scale_deg() * 3600.0);
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Basis** — enumerate monomials `dx^ix · dy^iy` (`ix + iy ≤ order`) in
//!    pixel offsets from the center pixel, and factor the design matrix once
//! 2. **Linearize** — project every sky position into a trial tangent frame at
//!    the current reference point (identity CD, origin reference pixel)
//! 3. **Solve** — fit x and y intermediate coordinates independently by least
//!    squares
//! 4. **Recenter** — deproject the fitted constant term to obtain the next
//!    reference point; repeat from step 2
//! 5. **Map** — the linear coefficients become CD; higher-order coefficients
//!    are pulled back through `CD⁻¹` into the SIP A and B grids
//!
//! ## Logging
//!
//! The fit emits [`tracing`] events (per-round reference point and shift,
//! final residuals) at `debug` level. No subscriber is installed by the
//! library.

pub mod error;
pub mod fit;
mod point;
pub mod projection;
pub mod wcs;

pub use error::FitError;
pub use fit::{
    fit_wcs, fit_wcs_with_config, fit_wcs_with_projection, FitConfig, FitResiduals, WcsFit,
    DEFAULT_ITERATIONS,
};
pub use fit::{solve_least_squares, LeastSquares, PolynomialTerm, TermSet};
pub use point::{PixelPoint, SkyPoint};
pub use projection::{LinearWcs, Projection, ProjectionError, ProjectionModel, Zenithal};
pub use wcs::{SipDistortion, SipGrid, WcsModel};
