//! Convert raw polynomial coefficients into CD matrix and SIP grids.
//!
//! After the last round the fit reads
//!
//! ```text
//! x = Σ ax_i · dx^ix · dy^iy
//! y = Σ ay_i · dx^ix · dy^iy
//! ```
//!
//! The degree-1 terms form the CD matrix. SIP applies distortion *before*
//! CD, so each higher-order coefficient pair is pulled back through `CD⁻¹`:
//! `(A, B)_i = CD⁻¹ · (ax_i, ay_i)`. The constant terms have been absorbed
//! into CRVAL by the iteration and are dropped.

use super::basis::TermSet;
use super::iterate::FitState;
use crate::error::FitError;
use crate::point::PixelPoint;
use crate::projection::{cd_inverse, Projection};
use crate::wcs::{SipDistortion, WcsModel};

/// Assemble the output model from the final fit state.
///
/// Fails with [`FitError::SingularCd`] when the fitted linear terms cannot be
/// inverted.
pub fn map_coefficients(
    state: &FitState,
    terms: &TermSet,
    center: PixelPoint,
    projection: Projection,
) -> Result<WcsModel, FitError> {
    let (ax, ay) = (&state.ax, &state.ay);
    let px = terms.pure_x_slot();
    let py = terms.pure_y_slot();

    // rows = output axis, columns = input axis
    let cd = [[ax[px], ax[py]], [ay[px], ay[py]]];
    let cd_inv = cd_inverse(&cd).ok_or(FitError::SingularCd {
        det: cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0],
    })?;

    let mut sip = SipDistortion::zeros(terms.order());
    for (i, term) in terms.terms().iter().enumerate() {
        if term.degree() < 2 {
            continue;
        }
        let a = cd_inv[0][0] * ax[i] + cd_inv[0][1] * ay[i];
        let b = cd_inv[1][0] * ax[i] + cd_inv[1][1] * ay[i];
        sip.a.set(term.ix, term.iy, a);
        sip.b.set(term.ix, term.iy, b);
    }

    Ok(WcsModel {
        crpix: [center.x, center.y],
        crval: [state.crval.ra, state.crval.dec],
        cd,
        sip,
        projection,
    })
}
