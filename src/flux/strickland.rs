//! Composite auroral electron spectrum after Strickland et al. 1993: a
//! Gaussian core at E0 plus low-energy, mid and high-energy power-law tails.

use std::f64::consts::PI;

use itertools::izip;
use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;

use super::{broadcast, format_values, FluxError, FluxSpectrum};
use crate::numeric::find_nearest;

/// Shape parameters of the Strickland spectrum. Vector-valued parameters carry
/// one value per characteristic energy; a single value is applied to all of
/// them.
#[derive(Debug, Clone)]
pub struct StricklandParams {
    /// Flux coefficient Q0.
    pub q0: Vec<f64>,

    /// Gaussian width as a fraction of E0 (`Wb = width_fraction * E0`).
    pub width_fraction: Vec<f64>,

    /// Low-energy tail exponent `bl` (1 < bl < 2 for the classic LET).
    pub low_exponent: f64,

    /// Mid tail exponent `bm`.
    pub mid_exponent: Vec<f64>,

    /// Mid tail coefficient `Bm`.
    pub mid_coefficient: Vec<f64>,

    /// High-energy tail exponent `bh`.
    pub high_exponent: f64,

    /// High-energy tail coefficient as a fraction of the flux at E0. Strickland
    /// 1993 used 0.2, but ~0.145 better matches the peak flux at E0 = 2500 eV.
    pub high_fraction: Vec<f64>,
}

impl StricklandParams {
    /// Characteristic energies \[eV\] of the dispersive Alfvén wave flux set.
    pub const DEFAULT_E0_EV: [f64; 7] = [1e4, 5250.0, 3500.0, 2250.0, 1000.0, 750.0, 500.0];

    /// The parameter set matching [`StricklandParams::DEFAULT_E0_EV`].
    pub fn dispersive_alfven() -> StricklandParams {
        StricklandParams {
            q0: vec![1e12],
            width_fraction: vec![0.25, 0.375, 0.4, 0.5, 0.75, 0.9, 1.1],
            low_exponent: 0.8,
            mid_exponent: vec![3.0, 2.5, 2.5, 2.5, 3.0, 3.0, 3.0],
            mid_coefficient: vec![6500.0, 5500.0, 4750.0, 4000.0, 3000.0, 2500.0, 2000.0],
            high_exponent: 4.0,
            high_fraction: vec![0.5, 0.3, 0.215, 0.15, 0.125, 0.125, 0.125],
        }
    }
}

/// The total spectrum and each of its parts, all `[energy][E0]`.
#[derive(Debug, Clone)]
pub struct FluxComponents {
    pub spectrum: FluxSpectrum,
    pub base: Array2<f64>,
    pub low: Array2<f64>,
    pub mid: Array2<f64>,
    pub high: Array2<f64>,

    /// Index into the energy grid closest to each E0.
    pub e0_indices: Vec<usize>,
}

/// Per-E0 values after broadcasting.
struct Column {
    e0: f64,
    q0: f64,
    wb: f64,
    bm: f64,
    mid_coef: f64,
    bhf: f64,
    i_e0: usize,
}

struct ColumnParts {
    base: Array1<f64>,
    low: Array1<f64>,
    mid: Array1<f64>,
    high: Array1<f64>,
    bl: f64,
    bh: f64,
}

/// Generate Strickland spectra for every characteristic energy in `e0_ev`.
pub fn fluxgen(
    energy_ev: ArrayView1<f64>,
    e0_ev: &[f64],
    params: &StricklandParams,
) -> Result<FluxComponents, FluxError> {
    if e0_ev.is_empty() {
        return Err(FluxError::NoCharacteristicEnergies);
    }
    if energy_ev.len() < 2 {
        return Err(FluxError::EnergyGridTooSmall);
    }
    let n = e0_ev.len();
    let q0 = broadcast("Q0", &params.q0, n)?;
    let wbc = broadcast("Wbc", &params.width_fraction, n)?;
    let bm = broadcast("bm", &params.mid_exponent, n)?;
    let mid_coef = broadcast("Bm", &params.mid_coefficient, n)?;
    let bhf = broadcast("Bhf", &params.high_fraction, n)?;

    let energy = energy_ev.to_vec();
    let mut columns = Vec::with_capacity(n);
    for (&e0, &q0, &wbc, &bm, &mid_coef, &bhf) in izip!(e0_ev, &q0, &wbc, &bm, &mid_coef, &bhf) {
        columns.push(Column {
            e0,
            q0,
            wb: wbc * e0,
            bm,
            mid_coef,
            bhf,
            // Non-empty energy grid checked above.
            i_e0: find_nearest(&energy, e0).unwrap_or(0),
        });
    }

    let parts: Vec<ColumnParts> = columns
        .par_iter()
        .map(|c| column_parts(energy_ev, c, params.low_exponent, params.high_exponent))
        .collect();
    debug!(
        "Bl: {}",
        parts.iter().map(|p| format!("{:0.1}", p.bl)).collect::<Vec<_>>().join(" ")
    );
    debug!(
        "Bh: {}",
        parts.iter().map(|p| format!("{:0.1}", p.bh)).collect::<Vec<_>>().join(" ")
    );

    let shape = (energy_ev.len(), n);
    let mut base = Array2::zeros(shape);
    let mut low = Array2::zeros(shape);
    let mut mid = Array2::zeros(shape);
    let mut high = Array2::zeros(shape);
    for (j, p) in parts.into_iter().enumerate() {
        base.column_mut(j).assign(&p.base);
        low.column_mut(j).assign(&p.low);
        mid.column_mut(j).assign(&p.mid);
        high.column_mut(j).assign(&p.high);
    }
    let total = &base + &low + &mid + &high;
    let e0_indices: Vec<usize> = columns.iter().map(|c| c.i_e0).collect();

    let ratios = dip_ratio(total.view(), &e0_indices);
    debug!(
        "dipratio: {}",
        ratios.iter().map(|d| format!("{d:0.2}")).collect::<Vec<_>>().join(" ")
    );

    let spectrum = FluxSpectrum::new(energy_ev.to_owned(), Array1::from(e0_ev.to_vec()), total)?;
    debug!("total flux Q: {}", format_values(&spectrum.total_flux.to_vec()));

    Ok(FluxComponents {
        spectrum,
        base,
        low,
        mid,
        high,
        e0_indices,
    })
}

fn column_parts(energy: ArrayView1<f64>, c: &Column, bl: f64, bh: f64) -> ColumnParts {
    // Gaussian core.
    let qc = c.q0 / (PI.powf(1.5) * c.wb * c.e0);
    let base = energy.mapv(|e| qc * (-((e - c.e0) / c.wb).powi(2)).exp());

    // Low-energy tail.
    let low_coef = 0.4 * c.q0 / (2.0 * PI * c.e0.powi(2)) * (-1.0_f64).exp();
    let low = energy.mapv(|e| {
        if e > c.e0 {
            0.0
        } else {
            low_coef * (e / c.e0).powf(-bl)
        }
    });

    let mid = energy.mapv(|e| {
        if e > c.e0 {
            0.0
        } else {
            c.mid_coef * (e / c.e0).powf(c.bm)
        }
    });

    // The high-energy tail is anchored to the flux so far at E0.
    let high_coef = c.bhf * (base[c.i_e0] + low[c.i_e0] + mid[c.i_e0]);
    let high = energy.mapv(|e| {
        if e < c.e0 {
            0.0
        } else {
            high_coef * (e / c.e0).powf(-bh)
        }
    });

    ColumnParts {
        base,
        low,
        mid,
        high,
        bl: low_coef,
        bh: high_coef,
    }
}

/// Ratio of the spectral minimum below E0 to the flux at E0, per column. A
/// column whose E0 sits on the first energy bin has no dip, giving NaN.
pub fn dip_ratio(phi: ArrayView2<f64>, e0_indices: &[usize]) -> Vec<f64> {
    phi.axis_iter(Axis(1))
        .zip(e0_indices)
        .map(|(column, &i_e0)| {
            let below = column.slice(s![..i_e0]);
            match below.iter().copied().reduce(f64::min) {
                Some(dip) => dip / column[i_e0],
                None => f64::NAN,
            }
        })
        .collect()
}
