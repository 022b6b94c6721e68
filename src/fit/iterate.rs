//! Iterative linearization of the spherical projection.
//!
//! The map from sky to pixel is nonlinear, but around a reference point the
//! projection is smooth. Each round:
//!
//! 1. Build a trial frame ([`LinearWcs::trial`]) at the current reference
//!    point: identity CD, reference pixel at the origin.
//! 2. Project every measured sky position into the trial frame, giving
//!    targets `(rx, ry)` in intermediate world coordinates (degrees).
//! 3. Fit `rx ≈ A·ax` and `ry ≈ A·ay`, where `A` is the polynomial design
//!    matrix in pixel offsets from the center pixel.
//! 4. The constant pair `(ax₀, ay₀)` is where the center pixel lands in the
//!    trial frame. Deproject it to get the next reference point.
//!
//! Once the reference point sits on the center pixel, the constant terms
//! vanish and the linear terms are the CD matrix.

use nalgebra::DVector;
use tracing::debug;

use super::basis::TermSet;
use super::lstsq::LeastSquares;
use crate::error::FitError;
use crate::point::{PixelPoint, SkyPoint};
use crate::projection::{LinearWcs, Projection, ProjectionError, ProjectionModel};

/// Working state of the fit after a round.
#[derive(Debug, Clone, PartialEq)]
pub struct FitState {
    /// Reference sky coordinate produced by the last round.
    pub crval: SkyPoint,
    /// Coefficients of the x intermediate coordinate, one per term slot.
    pub ax: DVector<f64>,
    /// Coefficients of the y intermediate coordinate, one per term slot.
    pub ay: DVector<f64>,
    /// Number of rounds run.
    pub rounds: u32,
}

/// Drives the refinement rounds for one set of correspondences.
///
/// The design matrix and its QR factorization depend only on the pixel
/// positions and the term set, so they are computed once and shared by every
/// round and by both coordinate axes.
pub struct IterativeFitter<'a, P: ProjectionModel + ?Sized> {
    projector: &'a P,
    projection: Projection,
    sky: &'a [SkyPoint],
    solver: LeastSquares,
    constant_slot: usize,
}

impl<'a, P: ProjectionModel + ?Sized> IterativeFitter<'a, P> {
    /// Prepare a fitter.
    ///
    /// `pixels` and `sky` must have equal length and at least `terms.len()`
    /// entries; the public entry points check this before getting here.
    pub fn new(
        projector: &'a P,
        projection: Projection,
        terms: &TermSet,
        pixels: &[PixelPoint],
        sky: &'a [SkyPoint],
        center: PixelPoint,
    ) -> Result<Self, FitError> {
        let dx: Vec<f64> = pixels.iter().map(|p| p.x - center.x).collect();
        let dy: Vec<f64> = pixels.iter().map(|p| p.y - center.y).collect();
        let design = terms.design_matrix(&dx, &dy);
        let solver = LeastSquares::new(&design)?;

        Ok(Self {
            projector,
            projection,
            sky,
            solver,
            constant_slot: terms.constant_slot(),
        })
    }

    /// Run one round from reference point `crval`.
    pub fn round(&self, crval: SkyPoint) -> Result<(SkyPoint, DVector<f64>, DVector<f64>), FitError> {
        let trial = LinearWcs::trial(self.projection, crval);

        let targets = self.projector.world_to_pixel(&trial, self.sky)?;
        if targets.len() != self.sky.len() {
            return Err(ProjectionError::WrongPointCount {
                expected: self.sky.len(),
                got: targets.len(),
            }
            .into());
        }
        let rx = DVector::from_iterator(targets.len(), targets.iter().map(|p| p.x));
        let ry = DVector::from_iterator(targets.len(), targets.iter().map(|p| p.y));

        let ax = self.solver.solve(&rx)?;
        let ay = self.solver.solve(&ry)?;

        let offset = PixelPoint::new(ax[self.constant_slot], ay[self.constant_slot]);
        let refined = self
            .projector
            .pixel_to_world(&trial, std::slice::from_ref(&offset))?;
        let next = match refined.as_slice() {
            [next] => *next,
            _ => {
                return Err(ProjectionError::WrongPointCount {
                    expected: 1,
                    got: refined.len(),
                }
                .into())
            }
        };

        Ok((next, ax, ay))
    }

    /// Run up to `max_rounds` rounds starting from `initial`.
    ///
    /// With `convergence_tol_deg` set, stops after the first round whose
    /// reference-point update is smaller than the threshold. Without it,
    /// exactly `max_rounds` rounds run.
    pub fn run(
        &self,
        initial: SkyPoint,
        max_rounds: u32,
        convergence_tol_deg: Option<f64>,
    ) -> Result<FitState, FitError> {
        if max_rounds == 0 {
            return Err(FitError::InvalidConfig(
                "iteration budget must be at least 1".to_string(),
            ));
        }

        let mut crval = initial;
        let mut rounds = 0u32;
        let mut ax: DVector<f64>;
        let mut ay: DVector<f64>;

        loop {
            let (next, round_ax, round_ay) = self.round(crval)?;
            let shift = crval.angular_distance(&next);

            debug!(
                "WCS fit round {}: CRVAL = ({:.9}°, {:.9}°), offset = ({:.3e}°, {:.3e}°), shift = {:.3e}°",
                rounds,
                next.ra,
                next.dec,
                round_ax[self.constant_slot],
                round_ay[self.constant_slot],
                shift,
            );

            crval = next;
            ax = round_ax;
            ay = round_ay;
            rounds += 1;

            if convergence_tol_deg.is_some_and(|tol| shift < tol) {
                debug!("WCS fit converged after {} rounds", rounds);
                break;
            }
            if rounds == max_rounds {
                break;
            }
        }

        Ok(FitState {
            crval,
            ax,
            ay,
            rounds,
        })
    }
}
