//! Altitude grids and simple vertical profiles.

use lazy_static::lazy_static;
use ndarray::prelude::*;
use vec1::{vec1, Vec1};

use crate::{numeric::linspace, GridError};

/// Mean Earth radius \[km\].
pub const RE_KM: f64 = 6371.0;

lazy_static! {
    /// The altitude grid \[km\] of the GLOW model: 1 km steps through the
    /// E region, then steadily coarser up to 950 km.
    pub static ref GLOW_ALTITUDES_KM: Vec1<f64> = {
        let mut z = vec1![30.0];
        z.extend((31..=110).map(f64::from));
        z.extend([111.5, 113.0, 114.5, 116.0]);
        for (start, stop, step) in [
            (118, 150, 2),
            (153, 168, 3),
            (172, 180, 4),
            (185, 205, 5),
            (211, 223, 6),
            (230, 244, 7),
            (252, 300, 8),
            (309, 345, 9),
            (355, 395, 10),
            (406, 428, 11),
        ] {
            z.extend((start..=stop).step_by(step).map(f64::from));
        }
        z.extend([440.0, 453.0, 467.0, 482.0, 498.0, 515.0, 533.0, 551.0]);
        z.extend((570..=950).step_by(20).map(f64::from));
        z
    };
}

pub fn glow_altitudes() -> &'static Vec1<f64> {
    &GLOW_ALTITUDES_KM
}

/// A continuously stretched altitude grid.
///
/// The step size follows `tanh` from `gridmin` at the bottom of the grid to
/// `gridmin + gridmax` at the top (tanh(3.14) is ~99% of its asymptote).
///
/// * `np`: number of grid points
/// * `zmin`: bottom of the grid \[km\]
/// * `gridmin`: minimum step size \[km\]
/// * `gridmax`: asymptotic increase of the step size \[km\]
pub fn setupz(np: usize, zmin: f64, gridmin: f64, gridmax: f64) -> Result<Array1<f64>, GridError> {
    if np == 0 {
        return Err(GridError::TooFewPoints(np));
    }
    if gridmin <= 0.0 {
        return Err(GridError::BadStep {
            name: "gridmin",
            value: gridmin,
        });
    }

    let dz = linspace(0.0, 3.14, np).mapv(|x| x.tanh() * gridmax + gridmin);
    let mut z = Array1::zeros(np);
    z[0] = zmin;
    for i in 1..np {
        z[i] = z[i - 1] + dz[i - 1];
    }
    Ok(z)
}

/// Chapman production profile, normalised to 1 at the peak `z0` \[km\] with
/// scale height `h` \[km\].
pub fn chapman_profile(z0: f64, z_km: ArrayView1<f64>, h: f64) -> Array1<f64> {
    z_km.mapv(|z| (0.5 * (1.0 - (z - z0) / h - ((z0 - z) / h).exp())).exp())
}

/// Electron density along an auroral field line after Stasiewicz et al.
/// 2000 (Eqn. 3). Distances are geocentric, in Earth radii; densities in
/// cm^-3.
#[derive(Debug, Clone, Copy)]
pub struct StasiewiczDensity {
    pub r0: f64,
    pub h: f64,
    pub na: f64,
    pub nb: f64,
}

impl Default for StasiewiczDensity {
    fn default() -> Self {
        StasiewiczDensity {
            r0: 1.05,
            h: 0.06,
            na: 6e4,
            nb: 17.0,
        }
    }
}

impl StasiewiczDensity {
    /// `Ne = na exp(-(r - r0) / h) + nb (r - 1)^-1.5`
    pub fn electron_density(&self, r_re: f64) -> f64 {
        self.na * (-(r_re - self.r0) / self.h).exp() + self.nb * (r_re - 1.0).powf(-1.5)
    }

    /// Electron inertial length \[km\] at `r_re`.
    pub fn inertial_length_km(&self, r_re: f64) -> f64 {
        inertial_length_km(self.electron_density(r_re))
    }
}

/// Electron inertial length \[km\] for an electron density \[cm^-3\].
pub fn inertial_length_km(ne_cm3: f64) -> f64 {
    5.3 / ne_cm3.sqrt()
}

pub fn re_to_alt_km(r_re: f64) -> f64 {
    r_re * RE_KM - RE_KM
}
