//! Fitted WCS model: linear zenithal transform plus SIP distortion.
//!
//! Forward direction (pixel → sky):
//!
//! ```text
//! u, v = pixel − CRPIX
//! U = u + Σ A[iy][ix] · u^ix · v^iy     (ix + iy ≥ 2)
//! V = v + Σ B[iy][ix] · u^ix · v^iy
//! (x, y) = CD · (U, V)                   intermediate world coordinates, degrees
//! sky = inverse projection of (x, y) at CRVAL
//! ```
//!
//! The inverse direction solves the SIP polynomial with Newton iteration
//! instead of carrying fitted AP/BP inverse grids.

use crate::point::{PixelPoint, SkyPoint};
use crate::projection::{cd_inverse, LinearWcs, Projection, ProjectionError};

/// One SIP coefficient grid (A or B).
///
/// Stored indexed by `(iy, ix)`: row `iy` holds the coefficients of
/// `u^0 v^iy, u^1 v^iy, …`. The FITS keyword convention `A_p_q` multiplies
/// `u^p v^q`, i.e. it is the transpose; see [`SipGrid::to_fits_matrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct SipGrid {
    order: u32,
    coeffs: Vec<f64>,
}

impl SipGrid {
    /// All-zero grid of size `(order + 1) × (order + 1)`.
    pub fn zeros(order: u32) -> Self {
        let n = order as usize + 1;
        Self {
            order,
            coeffs: vec![0.0; n * n],
        }
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    #[inline]
    fn index(&self, ix: u32, iy: u32) -> usize {
        iy as usize * (self.order as usize + 1) + ix as usize
    }

    /// Coefficient of `u^ix · v^iy`; zero outside the grid.
    pub fn get(&self, ix: u32, iy: u32) -> f64 {
        if ix > self.order || iy > self.order {
            return 0.0;
        }
        self.coeffs[self.index(ix, iy)]
    }

    /// Set the coefficient of `u^ix · v^iy`.
    ///
    /// # Panics
    ///
    /// If `ix` or `iy` exceeds the grid order.
    pub fn set(&mut self, ix: u32, iy: u32, value: f64) {
        assert!(
            ix <= self.order && iy <= self.order,
            "SIP term ({ix}, {iy}) outside order-{} grid",
            self.order
        );
        let idx = self.index(ix, iy);
        self.coeffs[idx] = value;
    }

    /// Grid as nested rows, indexed `[iy][ix]`.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.coeffs
            .chunks(self.order as usize + 1)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Grid in FITS keyword layout, indexed `[p][q]` where `A_p_q`
    /// multiplies `u^p · v^q`.
    pub fn to_fits_matrix(&self) -> Vec<Vec<f64>> {
        (0..=self.order)
            .map(|p| (0..=self.order).map(|q| self.get(p, q)).collect())
            .collect()
    }

    /// Largest coefficient magnitude.
    pub fn max_abs(&self) -> f64 {
        self.coeffs.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()))
    }

    /// Non-zero distortion terms as `(ix, iy, coefficient)`.
    pub fn terms(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        (0..=self.order)
            .flat_map(move |iy| (0..=self.order).map(move |ix| (ix, iy)))
            .map(|(ix, iy)| (ix, iy, self.get(ix, iy)))
            .filter(|&(_, _, c)| c != 0.0)
    }

    /// Evaluate `Σ c · u^ix · v^iy` over terms of total degree ≥ 2.
    pub fn eval(&self, u: f64, v: f64) -> f64 {
        self.terms()
            .filter(|&(ix, iy, _)| ix + iy >= 2)
            .map(|(ix, iy, c)| c * u.powi(ix as i32) * v.powi(iy as i32))
            .sum()
    }

    /// Partial derivatives `(∂/∂u, ∂/∂v)` of [`SipGrid::eval`].
    pub fn gradient(&self, u: f64, v: f64) -> (f64, f64) {
        let mut du = 0.0;
        let mut dv = 0.0;
        for (ix, iy, c) in self.terms().filter(|&(ix, iy, _)| ix + iy >= 2) {
            if ix > 0 {
                du += c * ix as f64 * u.powi(ix as i32 - 1) * v.powi(iy as i32);
            }
            if iy > 0 {
                dv += c * iy as f64 * u.powi(ix as i32) * v.powi(iy as i32 - 1);
            }
        }
        (du, dv)
    }
}

/// SIP forward distortion grids.
#[derive(Debug, Clone, PartialEq)]
pub struct SipDistortion {
    /// Correction added to `u`.
    pub a: SipGrid,
    /// Correction added to `v`.
    pub b: SipGrid,
}

impl SipDistortion {
    /// Identity distortion of the given order.
    pub fn zeros(order: u32) -> Self {
        Self {
            a: SipGrid::zeros(order),
            b: SipGrid::zeros(order),
        }
    }

    pub fn order(&self) -> u32 {
        self.a.order().max(self.b.order())
    }

    /// Returns `true` if every coefficient is zero.
    pub fn is_zero(&self) -> bool {
        self.a.max_abs() == 0.0 && self.b.max_abs() == 0.0
    }

    /// `(u, v)` → `(U, V)`.
    pub fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (u + self.a.eval(u, v), v + self.b.eval(u, v))
    }

    /// `(U, V)` → `(u, v)` by Newton iteration on [`SipDistortion::apply`].
    pub fn invert(&self, big_u: f64, big_v: f64) -> Result<(f64, f64), ProjectionError> {
        const MAX_STEPS: usize = 50;
        const TOL: f64 = 1e-12;

        if self.is_zero() {
            return Ok((big_u, big_v));
        }

        let mut u = big_u;
        let mut v = big_v;
        for _ in 0..MAX_STEPS {
            let (fu, fv) = self.apply(u, v);
            let ru = fu - big_u;
            let rv = fv - big_v;

            let (a_u, a_v) = self.a.gradient(u, v);
            let (b_u, b_v) = self.b.gradient(u, v);
            let j00 = 1.0 + a_u;
            let j01 = a_v;
            let j10 = b_u;
            let j11 = 1.0 + b_v;
            let det = j00 * j11 - j01 * j10;
            if det.abs() < 1e-12 || !det.is_finite() {
                return Err(ProjectionError::SipInversionFailed);
            }

            let step_u = (j11 * ru - j01 * rv) / det;
            let step_v = (-j10 * ru + j00 * rv) / det;
            u -= step_u;
            v -= step_v;

            if step_u.abs() + step_v.abs() <= TOL * (1.0 + u.abs() + v.abs()) {
                return Ok((u, v));
            }
        }
        Err(ProjectionError::SipInversionFailed)
    }
}

/// A fitted World Coordinate System.
#[derive(Debug, Clone, PartialEq)]
pub struct WcsModel {
    /// Reference pixel (the center pixel supplied to the fit).
    pub crpix: [f64; 2],
    /// Reference sky coordinate `[RA, Dec]` in degrees.
    pub crval: [f64; 2],
    /// CD matrix in degrees per pixel, `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: [[f64; 2]; 2],
    /// SIP distortion grids.
    pub sip: SipDistortion,
    pub projection: Projection,
}

impl WcsModel {
    /// The undistorted part of the model.
    pub fn linear(&self) -> LinearWcs {
        LinearWcs {
            projection: self.projection,
            crpix: self.crpix,
            crval: self.crval,
            cd: self.cd,
        }
    }

    /// FITS `CTYPE1`/`CTYPE2`, e.g. `["RA---TAN-SIP", "DEC--TAN-SIP"]`.
    pub fn ctype(&self) -> [String; 2] {
        self.projection.ctype()
    }

    /// Pixel scale in degrees per pixel, `√|det CD|`.
    pub fn pixel_scale_deg(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt()
    }

    /// Pixel → sky, applying SIP distortion.
    pub fn pixel_to_world(&self, pixel: PixelPoint) -> Result<SkyPoint, ProjectionError> {
        let u = pixel.x - self.crpix[0];
        let v = pixel.y - self.crpix[1];
        let (big_u, big_v) = self.sip.apply(u, v);
        let x = self.cd[0][0] * big_u + self.cd[0][1] * big_v;
        let y = self.cd[1][0] * big_u + self.cd[1][1] * big_v;
        self.linear().intermediate_to_world(x, y)
    }

    /// Sky → pixel, inverting SIP distortion.
    pub fn world_to_pixel(&self, sky: SkyPoint) -> Result<PixelPoint, ProjectionError> {
        let cd_inv = cd_inverse(&self.cd).ok_or(ProjectionError::SingularLinearTransform)?;
        let (x, y) = self.linear().world_to_intermediate(sky)?;
        let big_u = cd_inv[0][0] * x + cd_inv[0][1] * y;
        let big_v = cd_inv[1][0] * x + cd_inv[1][1] * y;
        let (u, v) = self.sip.invert(big_u, big_v)?;
        Ok(PixelPoint::new(u + self.crpix[0], v + self.crpix[1]))
    }
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

    fn test_model() -> WcsModel {
        WcsModel {
            crpix: [512.0, 512.0],
            crval: [180.0, 45.0],
            cd: [[1e-4, 0.0], [0.0, 1e-4]],
            sip: SipDistortion::zeros(3),
            projection: Projection::Tan,
        }
    }

    #[test]
    fn test_grid_layout() {
        let mut grid = SipGrid::zeros(2);
        grid.set(2, 0, 1.0); // u²
        grid.set(1, 1, 2.0); // u·v
        grid.set(0, 2, 3.0); // v²

        // rows() is [iy][ix]
        let rows = grid.rows();
        assert_eq!(rows[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(rows[1], vec![0.0, 2.0, 0.0]);
        assert_eq!(rows[2], vec![3.0, 0.0, 0.0]);

        // FITS layout is [p][q]: A_2_0 multiplies u²
        let fits = grid.to_fits_matrix();
        assert_eq!(fits[2][0], 1.0);
        assert_eq!(fits[1][1], 2.0);
        assert_eq!(fits[0][2], 3.0);
    }

    #[test]
    fn test_eval_known_value() {
        let mut grid = SipGrid::zeros(3);
        grid.set(2, 0, 1.0);
        assert_close(grid.eval(5.0, 3.0), 25.0, 1e-12);
        grid.set(1, 1, 2.0);
        assert_close(grid.eval(5.0, 3.0), 25.0 + 30.0, 1e-12);
        // degree < 2 entries never contribute
        grid.set(1, 0, 100.0);
        assert_close(grid.eval(5.0, 3.0), 55.0, 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut grid = SipGrid::zeros(3);
        grid.set(2, 0, 1.5e-6);
        grid.set(1, 2, -2.0e-9);
        grid.set(0, 3, 4.0e-10);
        let (u, v) = (120.0, -75.0);
        let (du, dv) = grid.gradient(u, v);
        let h = 1e-3;
        let fd_u = (grid.eval(u + h, v) - grid.eval(u - h, v)) / (2.0 * h);
        let fd_v = (grid.eval(u, v + h) - grid.eval(u, v - h)) / (2.0 * h);
        assert_close(du, fd_u, 1e-10);
        assert_close(dv, fd_v, 1e-10);
    }

    #[test]
    fn test_get_outside_grid_is_zero() {
        let grid = SipGrid::zeros(2);
        assert_eq!(grid.get(3, 0), 0.0);
        assert_eq!(grid.get(0, 5), 0.0);
    }

    #[test]
    fn test_zero_sip_matches_linear() {
        let model = test_model();
        let linear = model.linear();
        for &(x, y) in &[(512.0, 512.0), (0.0, 0.0), (1024.0, 1024.0), (256.0, 768.0)] {
            let p = PixelPoint::new(x, y);
            let a = model.pixel_to_world(p).unwrap();
            let b = linear.pixel_to_world(p).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_distorted_roundtrip() {
        let mut model = test_model();
        model.sip.a.set(2, 0, 1e-6);
        model.sip.a.set(1, 1, -4e-7);
        model.sip.b.set(0, 2, 1e-6);
        model.sip.b.set(2, 1, 3e-9);

        for &(x, y) in &[
            (512.0, 512.0),
            (256.0, 256.0),
            (768.0, 768.0),
            (100.0, 512.0),
            (512.0, 100.0),
            (200.0, 800.0),
        ] {
            let sky = model.pixel_to_world(PixelPoint::new(x, y)).unwrap();
            let back = model.world_to_pixel(sky).unwrap();
            assert_close(back.x, x, 1e-8);
            assert_close(back.y, y, 1e-8);
        }
    }

    #[test]
    fn test_distortion_moves_edge_pixels() {
        let mut model = test_model();
        let undistorted = model.clone();
        model.sip.a.set(2, 0, 1e-6);

        // At crpix, distortion vanishes.
        let p = PixelPoint::new(512.0, 512.0);
        assert_eq!(model.pixel_to_world(p).unwrap(), undistorted.pixel_to_world(p).unwrap());

        // Away from crpix it does not: 1e-6 · 512² ≈ 0.26 px
        let p = PixelPoint::new(0.0, 512.0);
        let d = model
            .pixel_to_world(p)
            .unwrap()
            .angular_distance(&undistorted.pixel_to_world(p).unwrap());
        assert_close(d, 0.262144 * 1e-4, 1e-9);
    }

    #[test]
    fn test_pixel_scale_and_ctype() {
        let model = test_model();
        assert_close(model.pixel_scale_deg(), 1e-4, 1e-18);
        assert_eq!(model.ctype(), ["RA---TAN-SIP", "DEC--TAN-SIP"]);
    }
}
