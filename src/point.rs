//! Pixel and sky coordinate pairs.
//!
//! These are the two halves of a correspondence: a measured position on the
//! detector and the catalog position of the same source on the sky.

/// A position on the detector, in pixels.
///
/// The pixel origin is whatever convention the caller uses for the center
/// pixel (`crpix`); no 1-based offset is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A position on the celestial sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkyPoint {
    /// Right ascension in degrees.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
}

impl SkyPoint {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Unit vector pointing at this position on the celestial sphere.
    pub fn uvec(&self) -> nalgebra::Vector3<f64> {
        let (rasin, racos) = self.ra.to_radians().sin_cos();
        let (decsin, deccos) = self.dec.to_radians().sin_cos();
        nalgebra::Vector3::new(deccos * racos, deccos * rasin, decsin)
    }

    /// Great-circle distance to `other`, in degrees.
    pub fn angular_distance(&self, other: &SkyPoint) -> f64 {
        // atan2(|a×b|, a·b) stays accurate for tiny separations, where acos does not.
        let a = self.uvec();
        let b = other.uvec();
        a.cross(&b).norm().atan2(a.dot(&b)).to_degrees()
    }
}
