//! Spherical projection capability.
//!
//! The fitter never does projection math itself. It describes a trial
//! transform as a [`LinearWcs`] value (projection type, reference pixel,
//! reference sky coordinate, CD matrix) and hands that descriptor, together
//! with the points to map, to a [`ProjectionModel`]. The crate ships one
//! implementation, [`Zenithal`], covering the FITS TAN and ZEA projections;
//! any other capability can be plugged into
//! [`fit_wcs_with_projection`](crate::fit_wcs_with_projection).
//!
//! Intermediate world coordinates follow the FITS convention: degrees, with
//! `pixel = CD⁻¹ · (x, y) + CRPIX`.

pub mod zenithal;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::point::{PixelPoint, SkyPoint};

/// Errors raised by a projection capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Point lies on or behind the tangent plane of a TAN projection.
    #[error("sky position lies on or behind the tangent plane")]
    BehindTangentPlane,
    /// Projection-plane point lies outside the projection's boundary.
    #[error("projection-plane position lies outside the projection boundary")]
    OutsideProjectionBoundary,
    /// CD matrix of a transform descriptor cannot be inverted.
    #[error("linear transform is singular")]
    SingularLinearTransform,
    /// Projection code not understood.
    #[error("unsupported projection type {0:?}")]
    UnsupportedProjection(String),
    /// Newton iteration inverting the SIP polynomial did not converge.
    #[error("SIP distortion inversion did not converge")]
    SipInversionFailed,
    /// A projection capability returned a different number of points than
    /// it was given.
    #[error("projection returned {got} points for {expected} inputs")]
    WrongPointCount { expected: usize, got: usize },
}

/// Spherical projection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Projection {
    /// Gnomonic (tangent-plane) projection.
    #[default]
    Tan,
    /// Zenithal equal-area projection.
    Zea,
}

impl Projection {
    /// Three-letter FITS projection code.
    pub fn code(&self) -> &'static str {
        match self {
            Projection::Tan => "TAN",
            Projection::Zea => "ZEA",
        }
    }

    /// FITS `CTYPE1`/`CTYPE2` pair for a SIP-distorted model of this projection.
    pub fn ctype(&self) -> [String; 2] {
        [
            format!("RA---{}-SIP", self.code()),
            format!("DEC--{}-SIP", self.code()),
        ]
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Projection {
    type Err = ProjectionError;

    /// Parse `"TAN"`, `"ZEA"`, or their `-SIP` forms.
    ///
    /// The `-SIP` suffix is accepted and dropped: every fitted model carries
    /// SIP distortion grids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let code = upper.strip_suffix("-SIP").unwrap_or(&upper);
        match code {
            "TAN" => Ok(Projection::Tan),
            "ZEA" => Ok(Projection::Zea),
            _ => Err(ProjectionError::UnsupportedProjection(s.to_string())),
        }
    }
}

/// Invert a 2×2 matrix.
///
/// Returns `None` when the matrix is singular relative to its own scale
/// (`|det| <= 1e-12 · max|m_ij|²`), or not finite.
#[inline]
pub fn cd_inverse(cd: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    let scale = cd
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !det.is_finite() || scale == 0.0 || det.abs() <= 1e-12 * scale * scale {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [cd[1][1] * inv_det, -cd[0][1] * inv_det],
        [-cd[1][0] * inv_det, cd[0][0] * inv_det],
    ])
}

/// Immutable descriptor of a linear (undistorted) WCS.
///
/// Cheap to copy; the fitter builds a fresh one every round instead of
/// mutating a shared transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWcs {
    pub projection: Projection,
    /// Reference pixel.
    pub crpix: [f64; 2],
    /// Reference sky coordinate `[RA, Dec]` in degrees.
    pub crval: [f64; 2],
    /// CD matrix in degrees per pixel, `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: [[f64; 2]; 2],
}

impl LinearWcs {
    /// Trial frame used while linearizing: identity CD, reference pixel at
    /// the origin, so pixel coordinates equal intermediate world coordinates
    /// in degrees.
    pub fn trial(projection: Projection, crval: SkyPoint) -> Self {
        Self {
            projection,
            crpix: [0.0, 0.0],
            crval: [crval.ra, crval.dec],
            cd: [[1.0, 0.0], [0.0, 1.0]],
        }
    }

    /// Reference sky coordinate.
    pub fn reference(&self) -> SkyPoint {
        SkyPoint::new(self.crval[0], self.crval[1])
    }

    /// Sky → intermediate world coordinates `(x, y)` in degrees.
    pub fn world_to_intermediate(&self, sky: SkyPoint) -> Result<(f64, f64), ProjectionError> {
        let (x, y) = zenithal::project(
            self.projection,
            sky.ra.to_radians(),
            sky.dec.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )?;
        Ok((x.to_degrees(), y.to_degrees()))
    }

    /// Intermediate world coordinates `(x, y)` in degrees → sky.
    pub fn intermediate_to_world(&self, x: f64, y: f64) -> Result<SkyPoint, ProjectionError> {
        let (ra, dec) = zenithal::deproject(
            self.projection,
            x.to_radians(),
            y.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )?;
        Ok(SkyPoint::new(ra.to_degrees(), dec.to_degrees()))
    }

    /// Sky → pixel through the projection and `CD⁻¹`.
    pub fn world_to_pixel(&self, sky: SkyPoint) -> Result<PixelPoint, ProjectionError> {
        let cd_inv = cd_inverse(&self.cd).ok_or(ProjectionError::SingularLinearTransform)?;
        let (x, y) = self.world_to_intermediate(sky)?;
        Ok(PixelPoint::new(
            cd_inv[0][0] * x + cd_inv[0][1] * y + self.crpix[0],
            cd_inv[1][0] * x + cd_inv[1][1] * y + self.crpix[1],
        ))
    }

    /// Pixel → sky through `CD` and the inverse projection.
    pub fn pixel_to_world(&self, pixel: PixelPoint) -> Result<SkyPoint, ProjectionError> {
        let u = pixel.x - self.crpix[0];
        let v = pixel.y - self.crpix[1];
        let x = self.cd[0][0] * u + self.cd[0][1] * v;
        let y = self.cd[1][0] * u + self.cd[1][1] * v;
        self.intermediate_to_world(x, y)
    }
}

/// A spherical projection capability the fitter can delegate to.
///
/// Implementations must be pure functions of the descriptor and the input
/// points, returning exactly one output point per input point, in order.
pub trait ProjectionModel {
    /// Map sky positions into the pixel frame described by `wcs`.
    fn world_to_pixel(
        &self,
        wcs: &LinearWcs,
        sky: &[SkyPoint],
    ) -> Result<Vec<PixelPoint>, ProjectionError>;

    /// Map pixel positions in the frame described by `wcs` onto the sky.
    fn pixel_to_world(
        &self,
        wcs: &LinearWcs,
        pixels: &[PixelPoint],
    ) -> Result<Vec<SkyPoint>, ProjectionError>;
}

/// Built-in FITS zenithal projection capability (TAN, ZEA).
#[derive(Debug, Clone, Copy, Default)]
pub struct Zenithal;

impl ProjectionModel for Zenithal {
    fn world_to_pixel(
        &self,
        wcs: &LinearWcs,
        sky: &[SkyPoint],
    ) -> Result<Vec<PixelPoint>, ProjectionError> {
        sky.iter().map(|&s| wcs.world_to_pixel(s)).collect()
    }

    fn pixel_to_world(
        &self,
        wcs: &LinearWcs,
        pixels: &[PixelPoint],
    ) -> Result<Vec<SkyPoint>, ProjectionError> {
        pixels.iter().map(|&p| wcs.pixel_to_world(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_projection() {
        assert_eq!("TAN".parse::<Projection>().unwrap(), Projection::Tan);
        assert_eq!("ZEA".parse::<Projection>().unwrap(), Projection::Zea);
        assert_eq!("ZEA-SIP".parse::<Projection>().unwrap(), Projection::Zea);
        assert_eq!(" tan ".parse::<Projection>().unwrap(), Projection::Tan);
        assert_eq!(
            "SIN".parse::<Projection>(),
            Err(ProjectionError::UnsupportedProjection("SIN".to_string()))
        );
    }

    #[test]
    fn test_ctype() {
        assert_eq!(Projection::Tan.ctype(), ["RA---TAN-SIP", "DEC--TAN-SIP"]);
        assert_eq!(Projection::Zea.ctype(), ["RA---ZEA-SIP", "DEC--ZEA-SIP"]);
    }

    #[test]
    fn test_cd_inverse_roundtrip() {
        let cd = [[1.2e-5, -3.0e-6], [2.5e-6, 1.1e-5]];
        let inv = cd_inverse(&cd).unwrap();
        let i00 = cd[0][0] * inv[0][0] + cd[0][1] * inv[1][0];
        let i01 = cd[0][0] * inv[0][1] + cd[0][1] * inv[1][1];
        let i10 = cd[1][0] * inv[0][0] + cd[1][1] * inv[1][0];
        let i11 = cd[1][0] * inv[0][1] + cd[1][1] * inv[1][1];
        assert!((i00 - 1.0).abs() < 1e-12);
        assert!(i01.abs() < 1e-12);
        assert!(i10.abs() < 1e-12);
        assert!((i11 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cd_inverse_singular() {
        assert!(cd_inverse(&[[1e-4, 2e-4], [2e-4, 4e-4]]).is_none());
        assert!(cd_inverse(&[[0.0, 0.0], [0.0, 0.0]]).is_none());
        // Tiny but well-conditioned scales are fine.
        assert!(cd_inverse(&[[1e-9, 0.0], [0.0, 1e-9]]).is_some());
    }

    #[test]
    fn test_trial_frame_is_intermediate_coordinates() {
        let wcs = LinearWcs::trial(Projection::Tan, SkyPoint::new(180.0, 45.0));
        let sky = SkyPoint::new(180.01, 45.02);
        let pixel = wcs.world_to_pixel(sky).unwrap();
        let (x, y) = wcs.world_to_intermediate(sky).unwrap();
        assert_eq!(pixel, PixelPoint::new(x, y));
    }

    #[test]
    fn test_linear_roundtrip() {
        let wcs = LinearWcs {
            projection: Projection::Zea,
            crpix: [512.0, 512.0],
            crval: [83.0, -1.0],
            cd: [[-2.0e-4, 3.0e-5], [2.5e-5, 2.1e-4]],
        };
        for &(x, y) in &[(0.0, 0.0), (512.0, 512.0), (1024.0, 100.0), (37.5, 980.25)] {
            let sky = wcs.pixel_to_world(PixelPoint::new(x, y)).unwrap();
            let back = wcs.world_to_pixel(sky).unwrap();
            assert!((back.x - x).abs() < 1e-8 && (back.y - y).abs() < 1e-8);
        }
    }

    #[test]
    fn test_crpix_maps_to_crval() {
        let wcs = LinearWcs {
            projection: Projection::Tan,
            crpix: [100.0, 200.0],
            crval: [10.0, 20.0],
            cd: [[1e-3, 0.0], [0.0, 1e-3]],
        };
        let sky = wcs.pixel_to_world(PixelPoint::new(100.0, 200.0)).unwrap();
        assert!((sky.ra - 10.0).abs() < 1e-12);
        assert!((sky.dec - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_zenithal_model_maps_slices() {
        let wcs = LinearWcs::trial(Projection::Tan, SkyPoint::new(0.0, 0.0));
        let sky = [SkyPoint::new(0.5, 0.5), SkyPoint::new(359.5, -0.5)];
        let pixels = Zenithal.world_to_pixel(&wcs, &sky).unwrap();
        assert_eq!(pixels.len(), 2);
        let back = Zenithal.pixel_to_world(&wcs, &pixels).unwrap();
        for (a, b) in sky.iter().zip(&back) {
            assert!(a.angular_distance(b) < 1e-12);
        }

        let behind = [SkyPoint::new(180.0, 0.0)];
        assert_eq!(
            Zenithal.world_to_pixel(&wcs, &behind),
            Err(ProjectionError::BehindTangentPlane)
        );
    }
}
