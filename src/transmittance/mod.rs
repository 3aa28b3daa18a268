//! Optical system transmittance.
//!
//! Filter, window and quantum-efficiency datasheet curves are interpolated
//! onto a common wavelength grid and multiplied with the atmospheric
//! transmittance. Interpolation is linear in ln(T), which is much better
//! behaved than linear-in-T across the steep edges of absorbing filters.
//!
//! References:
//! - BG3 filter datasheet: <http://www.howardglass.com/pdf/bg3_datasheet.pdf>
//! - Andor iXon Ultra 897 QE and window specifications

mod atmosphere;

pub use atmosphere::{AtmosphereModel, Tabulated, Transparent};

use log::{debug, error};
use ndarray::prelude::*;
use thiserror::Error;

use crate::numeric::{check_table, interp_unchecked, NumericError};

#[derive(Error, Debug)]
pub enum TransmittanceError {
    #[error("Transmittance {value} at index {index} is outside [0, 1]")]
    ValueOutOfRange { index: usize, value: f64 },

    #[error("Wavelength {0} nm is outside the tabulated range [{1}, {2}] nm")]
    OutOfRange(f64, f64, f64),

    #[error("No curves were given to multiply")]
    NoCurves,

    #[error("The VER wavelength grid ({ver} points) does not match the transmittance grid ({transmittance} points)")]
    GridMismatch { ver: usize, transmittance: usize },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// What to do with wavelengths outside a tabulated curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Refuse to extrapolate.
    #[default]
    Error,
    /// Fill with NaN.
    Nan,
    /// Hold the nearest tabulated value.
    Clamp,
}

/// A tabulated transmittance (or quantum efficiency) curve.
#[derive(Debug, Clone)]
pub struct TransmittanceCurve {
    wavelength_nm: Vec<f64>,
    values: Vec<f64>,
    ln_values: Vec<f64>,
}

impl TransmittanceCurve {
    /// `wavelength_nm` must be strictly ascending with at least two points,
    /// and every value must be within [0, 1].
    pub fn new(
        wavelength_nm: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<TransmittanceCurve, TransmittanceError> {
        check_table(&wavelength_nm, &values)?;
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(0.0..=1.0).contains(*v))
        {
            return Err(TransmittanceError::ValueOutOfRange { index, value });
        }

        // Zeros would give ln(0) = -inf.
        let ln_values = values
            .iter()
            .map(|&v| (if v == 0.0 { f64::EPSILON } else { v }).ln())
            .collect();
        Ok(TransmittanceCurve {
            wavelength_nm,
            values,
            ln_values,
        })
    }

    pub fn wavelength_nm(&self) -> &[f64] {
        &self.wavelength_nm
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Log-linearly interpolate this curve onto `new_lambda`.
    pub fn interp_log(
        &self,
        new_lambda: &[f64],
        policy: Extrapolation,
    ) -> Result<Array1<f64>, TransmittanceError> {
        let xs = &self.wavelength_nm;
        let (min, max) = (xs[0], xs[xs.len() - 1]);

        new_lambda
            .iter()
            .map(|&x| {
                let ln_t = if !(min..=max).contains(&x) {
                    match policy {
                        Extrapolation::Error => {
                            return Err(TransmittanceError::OutOfRange(x, min, max))
                        }
                        Extrapolation::Nan => return Ok(f64::NAN),
                        Extrapolation::Clamp if x < min => self.ln_values[0],
                        Extrapolation::Clamp if x > max => self.ln_values[xs.len() - 1],
                        // NaN has no nearest tabulated value.
                        Extrapolation::Clamp => return Ok(f64::NAN),
                    }
                } else {
                    interp_unchecked(x, xs, &self.ln_values)
                };
                Ok(ln_t.exp())
            })
            .collect()
    }
}

/// The datasheet curves of an optical system.
#[derive(Debug, Clone)]
pub struct SystemComponents {
    pub bg3: TransmittanceCurve,
    pub window: TransmittanceCurve,
    pub qe: TransmittanceCurve,
}

/// Component and combined transmittances on a common wavelength grid.
#[derive(Debug, Clone)]
pub struct SystemTransmittance {
    pub wavelength_nm: Array1<f64>,
    pub bg3: Array1<f64>,
    pub window: Array1<f64>,
    pub qe: Array1<f64>,
    pub atm: Array1<f64>,
    /// window * qe * atm
    pub sys_no_bg3: Array1<f64>,
    /// window * qe * bg3 * atm
    pub sys: Array1<f64>,
}

impl SystemTransmittance {
    pub const COLUMNS: [&'static str; 6] = ["bg3", "window", "qe", "atm", "sys_no_bg3", "sys"];

    /// Look up a column by its name in [`SystemTransmittance::COLUMNS`].
    pub fn column(&self, name: &str) -> Option<ArrayView1<f64>> {
        let c = match name {
            "bg3" => &self.bg3,
            "window" => &self.window,
            "qe" => &self.qe,
            "atm" => &self.atm,
            "sys_no_bg3" => &self.sys_no_bg3,
            "sys" => &self.sys,
            _ => return None,
        };
        Some(c.view())
    }
}

/// Interpolate the system components and atmosphere onto `new_lambda` and
/// form the combined transmittances.
pub fn get_system_t(
    new_lambda: &[f64],
    components: &SystemComponents,
    atmosphere: &dyn AtmosphereModel,
    obs_alt_km: f64,
    zenith_deg: f64,
    policy: Extrapolation,
) -> Result<SystemTransmittance, TransmittanceError> {
    let n = new_lambda.len();
    let range = match (new_lambda.first(), new_lambda.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => (f64::NAN, f64::NAN),
    };

    let atm = match atmosphere.transmittance(obs_alt_km, zenith_deg, range) {
        Some(curve) => {
            debug!("Using {} atmosphere model", atmosphere.name());
            curve.interp_log(new_lambda, policy)?
        }
        None => {
            debug!("No atmospheric absorption over {range:?} nm");
            Array1::ones(n)
        }
    };
    if atm.iter().any(|t| !t.is_finite()) {
        error!("problem in computing atmospheric attenuation, results are suspect!");
    }

    let bg3 = components.bg3.interp_log(new_lambda, policy)?;
    let window = components.window.interp_log(new_lambda, policy)?;
    let qe = components.qe.interp_log(new_lambda, policy)?;

    let sys_no_bg3 = &window * &qe * &atm;
    let sys = &sys_no_bg3 * &bg3;

    Ok(SystemTransmittance {
        wavelength_nm: Array1::from(new_lambda.to_vec()),
        bg3,
        window,
        qe,
        atm,
        sys_no_bg3,
        sys,
    })
}

/// Product of several filters on `new_lambda`, e.g. Rayleigh's 1924
/// combination of a Hoya V-10 with a Wratten 21.
pub fn filter_product(
    curves: &[&TransmittanceCurve],
    new_lambda: &[f64],
    policy: Extrapolation,
) -> Result<Array1<f64>, TransmittanceError> {
    if curves.is_empty() {
        return Err(TransmittanceError::NoCurves);
    }
    let mut product = Array1::<f64>::ones(new_lambda.len());
    for curve in curves {
        product *= &curve.interp_log(new_lambda, policy)?;
    }
    Ok(product)
}
