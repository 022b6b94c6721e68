//! WCS fitting from pixel/sky correspondences.
//!
//! Fits a zenithal (TAN or ZEA) WCS with SIP distortion in three stages:
//!
//! 1. **Basis**: enumerate polynomial terms `dx^ix · dy^iy` up to the
//!    requested order and build the design matrix ([`basis`]).
//! 2. **Iteration**: linearize the projection around a moving reference
//!    point and solve two least-squares systems per round ([`iterate`],
//!    [`lstsq`]).
//! 3. **Mapping**: turn the final coefficients into a CD matrix plus
//!    normalized SIP grids ([`sip_map`]).
//!
//! Input checks (array lengths, order, term count) run before any
//! numerical work, so an invalid call never does partial computation.

pub mod basis;
pub mod iterate;
pub mod lstsq;
pub mod sip_map;

use tracing::debug;

use crate::error::FitError;
use crate::point::{PixelPoint, SkyPoint};
use crate::projection::{Projection, ProjectionModel, Zenithal};
use crate::wcs::WcsModel;

pub use basis::{term_count, PolynomialTerm, TermSet};
pub use iterate::{FitState, IterativeFitter};
pub use lstsq::{solve_least_squares, LeastSquares};
pub use sip_map::map_coefficients;

/// Number of refinement rounds run when no convergence threshold is set.
pub const DEFAULT_ITERATIONS: u32 = 5;

/// Configuration for a WCS fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Total polynomial order (≥ 1). Order 1 fits a purely linear WCS; higher
    /// orders add SIP terms of degree 2..=order. Default 1.
    pub order: u32,
    /// Spherical projection. Default TAN.
    pub projection: Projection,
    /// Maximum number of refinement rounds. Default 5.
    pub iterations: u32,
    /// If set, stop as soon as a round moves the reference point by less than
    /// this many degrees. If `None`, exactly `iterations` rounds run.
    pub convergence_tol_deg: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            order: 1,
            projection: Projection::Tan,
            iterations: DEFAULT_ITERATIONS,
            convergence_tol_deg: None,
        }
    }
}

impl FitConfig {
    fn validate(&self) -> Result<(), FitError> {
        if self.order < 1 {
            return Err(FitError::InvalidOrder(self.order));
        }
        if self.iterations == 0 {
            return Err(FitError::InvalidConfig(
                "iteration budget must be at least 1".to_string(),
            ));
        }
        if let Some(tol) = self.convergence_tol_deg {
            if !(tol > 0.0 && tol.is_finite()) {
                return Err(FitError::InvalidConfig(format!(
                    "convergence threshold must be positive and finite, got {tol}"
                )));
            }
        }
        Ok(())
    }
}

/// Angular residuals of a fitted model against its input correspondences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResiduals {
    /// Root-mean-square angular residual in arcseconds.
    pub rms_arcsec: f64,
    /// Largest angular residual in arcseconds.
    pub max_arcsec: f64,
}

/// Result of [`fit_wcs_with_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct WcsFit {
    /// The fitted model.
    pub model: WcsModel,
    /// Number of refinement rounds run.
    pub rounds: u32,
    /// Residuals of `model` against the input correspondences.
    pub residuals: FitResiduals,
}

/// Fit a WCS from parallel coordinate arrays.
///
/// `pixel_x`, `pixel_y` are measured pixel positions; `ra`, `dec` the sky
/// positions of the same sources in degrees. `center_x`, `center_y` becomes
/// CRPIX; `ref_ra_guess`, `ref_dec_guess` seeds CRVAL. Runs the default five
/// refinement rounds.
///
/// # Errors
///
/// * [`FitError::DimensionMismatch`] if the arrays differ in length.
/// * [`FitError::InvalidOrder`] if `order < 1`.
/// * [`FitError::UnderdeterminedSystem`] if there are fewer points than terms.
/// * [`FitError::SingularSystem`] if the pixel positions cannot support the
///   polynomial (e.g. collinear points).
/// * [`FitError::SingularCd`] if the fitted linear terms are degenerate.
/// * [`FitError::Projection`] if a sky position cannot be projected.
#[allow(clippy::too_many_arguments)]
pub fn fit_wcs(
    pixel_x: &[f64],
    pixel_y: &[f64],
    ra: &[f64],
    dec: &[f64],
    center_x: f64,
    center_y: f64,
    ref_ra_guess: f64,
    ref_dec_guess: f64,
    order: u32,
    projection: Projection,
) -> Result<WcsModel, FitError> {
    let n = pixel_x.len();
    if pixel_y.len() != n || ra.len() != n || dec.len() != n {
        return Err(FitError::DimensionMismatch {
            pixel_x: n,
            pixel_y: pixel_y.len(),
            ra: ra.len(),
            dec: dec.len(),
        });
    }

    let pixels: Vec<PixelPoint> = pixel_x
        .iter()
        .zip(pixel_y)
        .map(|(&x, &y)| PixelPoint::new(x, y))
        .collect();
    let sky: Vec<SkyPoint> = ra
        .iter()
        .zip(dec)
        .map(|(&r, &d)| SkyPoint::new(r, d))
        .collect();

    let config = FitConfig {
        order,
        projection,
        ..Default::default()
    };
    let fit = fit_wcs_with_config(
        &pixels,
        &sky,
        PixelPoint::new(center_x, center_y),
        SkyPoint::new(ref_ra_guess, ref_dec_guess),
        &config,
    )?;
    Ok(fit.model)
}

/// Fit a WCS from correspondence slices with the built-in zenithal
/// projections.
pub fn fit_wcs_with_config(
    pixels: &[PixelPoint],
    sky: &[SkyPoint],
    center: PixelPoint,
    ref_guess: SkyPoint,
    config: &FitConfig,
) -> Result<WcsFit, FitError> {
    fit_wcs_with_projection(&Zenithal, pixels, sky, center, ref_guess, config)
}

/// Fit a WCS, delegating all projection math to `projector`.
pub fn fit_wcs_with_projection<P: ProjectionModel + ?Sized>(
    projector: &P,
    pixels: &[PixelPoint],
    sky: &[SkyPoint],
    center: PixelPoint,
    ref_guess: SkyPoint,
    config: &FitConfig,
) -> Result<WcsFit, FitError> {
    if pixels.len() != sky.len() {
        return Err(FitError::DimensionMismatch {
            pixel_x: pixels.len(),
            pixel_y: pixels.len(),
            ra: sky.len(),
            dec: sky.len(),
        });
    }
    config.validate()?;

    // checked before TermSet::new, which allocates every term
    let n_terms = term_count(config.order);
    if pixels.len() < n_terms {
        return Err(FitError::UnderdeterminedSystem {
            points: pixels.len(),
            terms: n_terms,
            order: config.order,
        });
    }
    let terms = TermSet::new(config.order)?;

    debug!(
        "WCS fit: {} correspondences, order {} ({} terms), {} projection, initial CRVAL = ({:.6}°, {:.6}°)",
        pixels.len(),
        config.order,
        terms.len(),
        config.projection,
        ref_guess.ra,
        ref_guess.dec,
    );

    let fitter = IterativeFitter::new(projector, config.projection, &terms, pixels, sky, center)?;
    let state = fitter.run(ref_guess, config.iterations, config.convergence_tol_deg)?;
    let model = map_coefficients(&state, &terms, center, config.projection)?;
    let residuals = compute_residuals(&model, pixels, sky)?;

    debug!(
        "WCS fit done: {} rounds, CRVAL = ({:.9}°, {:.9}°), scale = {:.4}\"/px, RMSE = {:.3e}\" max = {:.3e}\"",
        state.rounds,
        model.crval[0],
        model.crval[1],
        model.pixel_scale_deg() * 3600.0,
        residuals.rms_arcsec,
        residuals.max_arcsec,
    );

    Ok(WcsFit {
        model,
        rounds: state.rounds,
        residuals,
    })
}

/// Angular residuals between `model(pixel)` and the measured sky position.
fn compute_residuals(
    model: &WcsModel,
    pixels: &[PixelPoint],
    sky: &[SkyPoint],
) -> Result<FitResiduals, FitError> {
    let mut sum_sq = 0.0;
    let mut max_err = 0.0_f64;
    for (&p, s) in pixels.iter().zip(sky) {
        let predicted = model.pixel_to_world(p)?;
        let err = predicted.angular_distance(s) * 3600.0;
        sum_sq += err * err;
        max_err = max_err.max(err);
    }
    let rms = if pixels.is_empty() {
        0.0
    } else {
        (sum_sq / pixels.len() as f64).sqrt()
    };
    Ok(FitResiduals {
        rms_arcsec: rms,
        max_arcsec: max_err,
    })
}
