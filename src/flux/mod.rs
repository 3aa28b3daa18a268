//! Differential number flux of precipitating electrons.
//!
//! All spectra are sampled on an energy grid \[eV\] and carry one column per
//! characteristic energy E0, so the flux arrays are `[energy][E0]`. Units are
//! cm^-2 s^-1 eV^-1 sr^-1.

pub mod ellison_ramaty;
pub mod strickland;

pub use ellison_ramaty::ellison_ramaty;
pub use strickland::{dip_ratio, fluxgen, FluxComponents, StricklandParams};

use std::f64::consts::PI;

use itertools::Itertools;
use log::info;
use ndarray::prelude::*;
use thiserror::Error;

use crate::numeric::{trapz, NumericError};

#[derive(Error, Debug)]
pub enum FluxError {
    #[error("Parameter '{name}' has {got} values, but must be a scalar or have {expected}")]
    BadParameterLength {
        name: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("No characteristic energies were supplied")]
    NoCharacteristicEnergies,

    #[error("The energy grid needs at least 2 points")]
    EnergyGridTooSmall,

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// A family of flux spectra, one per characteristic energy.
#[derive(Debug, Clone)]
pub struct FluxSpectrum {
    /// The energy grid \[eV\].
    pub energy_ev: Array1<f64>,

    /// Characteristic energy of each column \[eV\].
    pub e0_ev: Array1<f64>,

    /// Differential number flux, `[energy][E0]`.
    pub diff_num_flux: Array2<f64>,

    /// Total flux of each column (trapezoidal integral over energy).
    pub total_flux: Array1<f64>,
}

impl FluxSpectrum {
    pub(crate) fn new(
        energy_ev: Array1<f64>,
        e0_ev: Array1<f64>,
        diff_num_flux: Array2<f64>,
    ) -> Result<FluxSpectrum, FluxError> {
        let total_flux = total_flux(energy_ev.view(), diff_num_flux.view())?;
        Ok(FluxSpectrum {
            energy_ev,
            e0_ev,
            diff_num_flux,
            total_flux,
        })
    }
}

/// Integrate every column of `phi` over `energy`.
pub fn total_flux(
    energy: ArrayView1<f64>,
    phi: ArrayView2<f64>,
) -> Result<Array1<f64>, NumericError> {
    phi.axis_iter(Axis(1))
        .map(|column| trapz(column, energy))
        .collect::<Result<Vec<_>, _>>()
        .map(Array1::from)
}

/// Expand a scalar-or-vector parameter to `n` values.
pub(crate) fn broadcast(
    name: &'static str,
    values: &[f64],
    n: usize,
) -> Result<Vec<f64>, FluxError> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        l if l == n => Ok(values.to_vec()),
        got => Err(FluxError::BadParameterLength {
            name,
            got,
            expected: n,
        }),
    }
}

pub(crate) fn format_values(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:.1e}")).join(" ")
}

/// Maxwellian differential number flux (Tanaka 2006, Eqn. 1).
///
/// `Phi = Q0 / (2 pi E0^3) * E * exp(-E / E0)`
///
/// `q0` is either a single flux coefficient applied to every E0, or one per
/// E0.
pub fn maxwellian(
    energy_ev: ArrayView1<f64>,
    e0_ev: &[f64],
    q0: &[f64],
) -> Result<FluxSpectrum, FluxError> {
    if e0_ev.is_empty() {
        return Err(FluxError::NoCharacteristicEnergies);
    }
    if energy_ev.len() < 2 {
        return Err(FluxError::EnergyGridTooSmall);
    }
    let q0 = broadcast("Q0", q0, e0_ev.len())?;

    let phi = Array2::from_shape_fn((energy_ev.len(), e0_ev.len()), |(i, j)| {
        let (e, e0) = (energy_ev[i], e0_ev[j]);
        q0[j] / (2.0 * PI * e0.powi(3)) * e * (-e / e0).exp()
    });

    let spectrum = FluxSpectrum::new(energy_ev.to_owned(), Array1::from(e0_ev.to_vec()), phi)?;
    info!(
        "total maxwellian flux Q: {}",
        format_values(&spectrum.total_flux.to_vec())
    );
    Ok(spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::logspace;
    use approx::assert_relative_eq;

    #[test]
    fn maxwellian_total_flux_matches_closed_form() {
        // Integral of E exp(-E/E0) over [0, inf) is E0^2, so Q = Q0 / (2 pi E0).
        let energy = logspace(-2.0, 6.0, 4000);
        let e0 = [500.0, 1000.0, 5000.0];
        let spectrum = maxwellian(energy.view(), &e0, &[1e12]).unwrap();

        assert_eq!(spectrum.diff_num_flux.dim(), (4000, 3));
        for (&q, &e0) in spectrum.total_flux.iter().zip(e0.iter()) {
            assert_relative_eq!(q, 1e12 / (2.0 * PI * e0), max_relative = 1e-3);
        }
    }

    #[test]
    fn maxwellian_peaks_at_e0() {
        let energy = Array1::linspace(100.0, 3000.0, 30);
        let spectrum = maxwellian(energy.view(), &[1000.0], &[1e12]).unwrap();
        let column = spectrum.diff_num_flux.column(0);
        let (i_max, _) = column
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |(ib, b), (i, &v)| if v > b { (i, v) } else { (ib, b) });
        assert_relative_eq!(energy[i_max], 1000.0);
    }

    #[test]
    fn q0_must_broadcast() {
        let energy = Array1::linspace(100.0, 3000.0, 30);
        let result = maxwellian(energy.view(), &[1000.0, 2000.0, 3000.0], &[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(FluxError::BadParameterLength {
                name: "Q0",
                got: 2,
                expected: 3
            })
        ));
        assert!(matches!(
            maxwellian(energy.view(), &[], &[1.0]),
            Err(FluxError::NoCharacteristicEnergies)
        ));
    }
}
