//! Energy bins of the unit-flux input used to generate eigenprofiles.
//!
//! The grid table has one row per bin and four columns: the bin energies E1
//! and E2 and their "previous" energies pr1 and pr2 \[eV\]. The tabulated
//! grid only reaches ~30 keV, so it's extended with a log-linear regression
//! up to ~100 MeV.

use std::path::Path;

use log::{debug, info};
use ndarray::prelude::*;

use crate::{io::parse_csv_rows, numeric::linregress, GridError};

/// Flux normalisation of the unit-flux beams.
pub const FLUX0: f64 = 70114000000.0;

/// Number of rows of the extended grid.
pub const N_EXTENDED: usize = 81;

/// Read a 4-column, comma-separated energy grid.
pub fn load_csv<P: AsRef<Path>>(file: P) -> Result<Array2<f64>, GridError> {
    let file = file.as_ref();
    let text = std::fs::read_to_string(file).map_err(|err| GridError::Io {
        file: file.to_path_buf(),
        err,
    })?;
    let rows =
        parse_csv_rows(&text, 4).map_err(|(line, reason)| GridError::BadCsv { line, reason })?;
    if rows.is_empty() {
        return Err(GridError::TooFewPoints(0));
    }
    info!("{} energy bins from {}", rows.len(), file.display());

    Ok(Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j]))
}

/// Extend each column of `grid` to [`N_EXTENDED`] rows by fitting log10 of
/// the column against the row index. Grids that are already long enough are
/// returned unchanged.
pub fn load_regress(grid: ArrayView2<f64>) -> Result<Array2<f64>, GridError> {
    if grid.ncols() != 4 {
        return Err(GridError::WrongColumns {
            expected: 4,
            got: grid.ncols(),
        });
    }
    let n_old = grid.nrows();
    if n_old < 2 {
        return Err(GridError::TooFewPoints(n_old));
    }
    if let Some(((row, col), _)) = grid.indexed_iter().find(|(_, v)| **v <= 0.0) {
        return Err(GridError::NonPositive { row, col });
    }
    if n_old >= N_EXTENDED {
        debug!("Energy grid already has {n_old} rows, not extending");
        return Ok(grid.to_owned());
    }

    let mut extended = Array2::zeros((N_EXTENDED, 4));
    extended.slice_mut(s![..n_old, ..]).assign(&grid);

    let index: Vec<f64> = (0..n_old).map(|i| i as f64).collect();
    for (k, column) in grid.axis_iter(Axis(1)).enumerate() {
        let log_e: Vec<f64> = column.iter().map(|e| e.log10()).collect();
        let (slope, intercept) = linregress(&index, &log_e)?;
        debug!("column {k}: log10(E) = {slope:.4} i + {intercept:.4}");
        for i in n_old..N_EXTENDED {
            extended[[i, k]] = 10_f64.powf(slope * i as f64 + intercept);
        }
    }
    Ok(extended)
}

/// Edges and flux of each energy bin.
#[derive(Debug, Clone)]
pub struct EnergyBins {
    /// \[eV\]
    pub low: Array1<f64>,
    /// \[eV\]
    pub high: Array1<f64>,
    /// \[cm^-2 s^-1 sr^-1 eV^-1\]
    pub flux: Array1<f64>,
}

pub fn make_bins(grid: ArrayView2<f64>) -> Result<EnergyBins, GridError> {
    if grid.ncols() != 4 {
        return Err(GridError::WrongColumns {
            expected: 4,
            got: grid.ncols(),
        });
    }
    let (e1, e2, pr1, pr2) = (grid.column(0), grid.column(1), grid.column(2), grid.column(3));

    let de = &e2 - &e1;
    let esum = &e2 + &e1;
    let flux = FLUX0 / 0.5 / &esum / &de;
    let low = &e1 - &((&e1 - &pr1) * 0.5);
    let high = &e2 - &((&e2 - &pr2) * 0.5);

    Ok(EnergyBins { low, high, flux })
}
