//! What a camera behind an optical system sees of a volume emission spectrum.

use std::fmt;

use log::warn;
use ndarray::prelude::*;

use crate::transmittance::{SystemTransmittance, TransmittanceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpticalFilter {
    /// Schott BG3 in front of the sensor.
    Bg3,
    /// No filter at all.
    #[default]
    None,
}

impl OpticalFilter {
    /// Unknown names fall back to no filter.
    pub fn from_name(name: &str) -> OpticalFilter {
        match name.trim().to_ascii_lowercase().as_str() {
            "bg3" => OpticalFilter::Bg3,
            "none" => OpticalFilter::None,
            other => {
                warn!("unknown optical filter type: {other}, falling back to using no filter at all");
                OpticalFilter::None
            }
        }
    }

    /// The system transmittance appropriate for this filter.
    pub fn transmittance<'a>(&self, system_t: &'a SystemTransmittance) -> ArrayView1<'a, f64> {
        match self {
            OpticalFilter::Bg3 => system_t.sys.view(),
            OpticalFilter::None => system_t.sys_no_bg3.view(),
        }
    }
}

impl From<&str> for OpticalFilter {
    fn from(s: &str) -> Self {
        OpticalFilter::from_name(s)
    }
}

impl fmt::Display for OpticalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpticalFilter::Bg3 => write!(f, "bg3"),
            OpticalFilter::None => write!(f, "none"),
        }
    }
}

/// Multiply each wavelength of `ver` (`[altitude][wavelength]`) by the
/// system transmittance for `filter`, then sum over wavelength. The result
/// is the "gray" VER per altitude.
pub fn optical_model(
    ver: ArrayView2<f64>,
    wavelength_nm: ArrayView1<f64>,
    system_t: &SystemTransmittance,
    filter: OpticalFilter,
) -> Result<Array1<f64>, TransmittanceError> {
    let t = filter.transmittance(system_t);
    if ver.ncols() != t.len()
        || wavelength_nm.len() != t.len()
        || wavelength_nm
            .iter()
            .zip(system_t.wavelength_nm.iter())
            .any(|(a, b)| (a - b).abs() > 1e-9 * a.abs().max(1.0))
    {
        return Err(TransmittanceError::GridMismatch {
            ver: ver.ncols(),
            transmittance: t.len(),
        });
    }

    Ok(ver.dot(&t))
}
