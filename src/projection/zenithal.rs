//! Zenithal spherical projections (TAN, ZEA).
//!
//! Implements the celestial ↔ native spherical rotation and the two zenithal
//! projections used by the fitter, following Calabretta & Greisen (2002),
//! FITS WCS Paper II, §2 and §5.1.
//!
//! All angles in this module are radians. Projection-plane coordinates
//! `(x, y)` are radians too; the degree scaling of the FITS convention is
//! applied by the caller.
//!
//! Every formula is arranged so that points close to the reference point do
//! not lose precision to cancellation: `cos θ` comes from the rotated vector
//! components rather than from `asin`, and `1 − sin θ` is never formed
//! directly.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use super::{Projection, ProjectionError};

/// Native longitude of the celestial pole (`LONPOLE`) for a zenithal
/// projection with reference declination `dec0`.
///
/// Paper II, §2.5: 180° unless `δ0 ≥ θ0` (= 90° for zenithal projections).
#[inline]
fn default_lonpole(dec0: f64) -> f64 {
    if dec0 >= FRAC_PI_2 {
        0.0
    } else {
        PI
    }
}

/// Native spherical coordinates: longitude `φ` and the sine/cosine of the
/// latitude `θ`.
#[derive(Debug, Clone, Copy)]
struct Native {
    phi: f64,
    sin_theta: f64,
    cos_theta: f64,
}

/// Rotate celestial `(ra, dec)` into native coordinates of a zenithal
/// projection whose reference point is `(ra0, dec0)`.
fn celestial_to_native(ra: f64, dec: f64, ra0: f64, dec0: f64) -> Native {
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let da = ra - ra0;
    let (sin_da, cos_da) = da.sin_cos();
    let half_sin = (0.5 * da).sin();

    // a, b = cos θ · (sin, cos) of (φ − φp), written without cancellation
    let a = -cos_dec * sin_da;
    let b = (dec - dec0).sin() + 2.0 * cos_dec * sin_dec0 * half_sin * half_sin;

    Native {
        phi: default_lonpole(dec0) + a.atan2(b),
        sin_theta: sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da,
        cos_theta: a.hypot(b),
    }
}

/// Rotate native coordinates back to celestial `(ra, dec)`.
///
/// RA is returned in `[0, 2π)`.
fn native_to_celestial(native: Native, ra0: f64, dec0: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let (sin_dphi, cos_dphi) = (native.phi - default_lonpole(dec0)).sin_cos();

    let x = native.sin_theta * cos_dec0 - native.cos_theta * sin_dec0 * cos_dphi;
    let y = -native.cos_theta * sin_dphi;
    let z = native.sin_theta * sin_dec0 + native.cos_theta * cos_dec0 * cos_dphi;

    let dec = z.atan2(x.hypot(y));
    let ra = (ra0 + y.atan2(x)).rem_euclid(TAU);
    (ra, dec)
}

/// Forward projection: celestial `(ra, dec)` → projection plane `(x, y)`.
///
/// Fails with [`ProjectionError::BehindTangentPlane`] when a TAN point lies
/// on or behind the tangent plane.
pub fn project(
    projection: Projection,
    ra: f64,
    dec: f64,
    ra0: f64,
    dec0: f64,
) -> Result<(f64, f64), ProjectionError> {
    let native = celestial_to_native(ra, dec, ra0, dec0);

    // r = R_θ in radians; the projection plane holds (r sin φ, −r cos φ)
    let r = match projection {
        Projection::Tan => {
            if native.sin_theta <= 1e-12 {
                return Err(ProjectionError::BehindTangentPlane);
            }
            native.cos_theta / native.sin_theta
        }
        // √(2(1 − sin θ)) = cos θ · √(2 / (1 + sin θ))
        Projection::Zea => {
            let one_plus = 1.0 + native.sin_theta;
            if one_plus <= 0.0 {
                // antipode of the reference point, on the boundary circle
                2.0
            } else {
                native.cos_theta * (2.0 / one_plus).sqrt()
            }
        }
    };

    let (sin_phi, cos_phi) = native.phi.sin_cos();
    Ok((r * sin_phi, -r * cos_phi))
}

/// Inverse projection: projection plane `(x, y)` → celestial `(ra, dec)`.
///
/// Fails with [`ProjectionError::OutsideProjectionBoundary`] for ZEA points
/// beyond the projection's boundary circle.
pub fn deproject(
    projection: Projection,
    x: f64,
    y: f64,
    ra0: f64,
    dec0: f64,
) -> Result<(f64, f64), ProjectionError> {
    let r = x.hypot(y);
    // φ is undefined at the reference point; any value works there.
    let phi = if r == 0.0 { 0.0 } else { x.atan2(-y) };

    let (sin_theta, cos_theta) = match projection {
        Projection::Tan => {
            let norm = (1.0 + r * r).sqrt();
            (1.0 / norm, r / norm)
        }
        Projection::Zea => {
            // r = 2 sin γ with γ = (π/2 − θ) / 2
            let s = 0.5 * r;
            if s > 1.0 + 1e-12 {
                return Err(ProjectionError::OutsideProjectionBoundary);
            }
            let s = s.min(1.0);
            (1.0 - 2.0 * s * s, 2.0 * s * (1.0 - s * s).sqrt())
        }
    };

    Ok(native_to_celestial(
        Native {
            phi,
            sin_theta,
            cos_theta,
        },
        ra0,
        dec0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {:e})",
            (a - b).abs()
        );
    }

    fn wrap_diff(a: f64, b: f64) -> f64 {
        (a - b + PI).rem_euclid(TAU) - PI
    }

    #[test]
    fn test_reference_point_maps_to_origin() {
        for projection in [Projection::Tan, Projection::Zea] {
            let (x, y) = project(projection, 1.2, 0.3, 1.2, 0.3).unwrap();
            assert!(x.abs() < 1e-15 && y.abs() < 1e-15);
            let (ra, dec) = deproject(projection, 0.0, 0.0, 1.2, 0.3).unwrap();
            assert_close(ra, 1.2, 1e-15);
            assert_close(dec, 0.3, 1e-15);
        }
    }

    #[test]
    fn test_roundtrip() {
        let ra0 = 1.2_f64;
        let dec0 = 0.3_f64;
        let points = [(1.21, 0.31), (1.25, 0.25), (1.15, 0.35), (1.0, 0.0)];

        for projection in [Projection::Tan, Projection::Zea] {
            for &(ra, dec) in &points {
                let (x, y) = project(projection, ra, dec, ra0, dec0).unwrap();
                let (ra2, dec2) = deproject(projection, x, y, ra0, dec0).unwrap();
                assert_close(wrap_diff(ra, ra2), 0.0, 1e-14);
                assert_close(dec, dec2, 1e-14);
            }
        }
    }

    #[test]
    fn test_axis_orientation() {
        // East (increasing RA) is +x, north (increasing Dec) is +y.
        let d = 1e-4;
        let (x, y) = project(Projection::Tan, d, 0.0, 0.0, 0.0).unwrap();
        assert_close(x, d.tan(), 1e-16);
        assert_close(y, 0.0, 1e-16);

        let (x, y) = project(Projection::Tan, 0.0, d, 0.0, 0.0).unwrap();
        assert_close(x, 0.0, 1e-16);
        assert_close(y, d.tan(), 1e-16);
    }

    #[test]
    fn test_tan_matches_gnomonic_formula() {
        // Standard gnomonic ξ, η (Paper II eq. 5.1.1 in terms of RA/Dec)
        let (ra0, dec0) = (2.0_f64, -0.5_f64);
        let (ra, dec) = (2.05_f64, -0.47_f64);
        let cos_c = dec.sin() * dec0.sin() + dec.cos() * dec0.cos() * (ra - ra0).cos();
        let xi = dec.cos() * (ra - ra0).sin() / cos_c;
        let eta = (dec.sin() * dec0.cos() - dec.cos() * dec0.sin() * (ra - ra0).cos()) / cos_c;

        let (x, y) = project(Projection::Tan, ra, dec, ra0, dec0).unwrap();
        assert_close(x, xi, 1e-14);
        assert_close(y, eta, 1e-14);
    }

    #[test]
    fn test_zea_radius() {
        // A point 60° from the reference: R = 2 sin(30°) = 1
        let (x, y) = project(Projection::Zea, 0.0, PI / 6.0, 0.0, FRAC_PI_2).unwrap();
        assert_close(x.hypot(y), 1.0, 1e-14);
    }

    #[test]
    fn test_small_offsets_keep_precision() {
        // 1 milliarcsecond from the reference point
        let mas = (1.0_f64 / 3_600_000.0).to_radians();
        for projection in [Projection::Tan, Projection::Zea] {
            let (x, y) = project(projection, PI, FRAC_PI_2 / 2.0 + mas, PI, FRAC_PI_2 / 2.0).unwrap();
            assert!(x.abs() < 1e-20);
            assert!(((y - mas) / mas).abs() < 1e-6, "relative error too large: y = {y:e}");
        }
    }

    #[test]
    fn test_tan_behind_plane() {
        assert_eq!(
            project(Projection::Tan, PI, 0.0, 0.0, 0.0),
            Err(ProjectionError::BehindTangentPlane)
        );
    }

    #[test]
    fn test_zea_outside_boundary() {
        assert_eq!(
            deproject(Projection::Zea, 2.5, 0.0, 0.0, 0.0),
            Err(ProjectionError::OutsideProjectionBoundary)
        );
    }

    #[test]
    fn test_pole_reference() {
        let (x, y) = project(Projection::Tan, 0.3, FRAC_PI_2 - 0.01, 0.0, FRAC_PI_2).unwrap();
        let (ra, dec) = deproject(Projection::Tan, x, y, 0.0, FRAC_PI_2).unwrap();
        assert_close(wrap_diff(ra, 0.3), 0.0, 1e-12);
        assert_close(dec, FRAC_PI_2 - 0.01, 1e-14);
    }
}
