//! Auroral and ionospheric optical emission modelling: precipitating electron
//! flux spectra, volume emission rates, optical system transmittance and
//! eigenprofiles, plus the grids and time utilities they need.

pub mod altitude;
pub mod eigen;
pub mod emissions;
pub mod energy_grid;
pub mod flux;
pub mod geo;
pub mod indices;
pub mod io;
pub mod numeric;
pub mod optical;
pub mod time;
pub mod transmittance;

use std::path::PathBuf;

use thiserror::Error;

pub use eigen::EigenError;
pub use emissions::EmissionsError;
pub use flux::FluxError;
pub use indices::IndicesError;
pub use io::FitsError;
pub use numeric::NumericError;
pub use time::TimeError;
pub use transmittance::TransmittanceError;

/// Errors building energy, altitude and world grids.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Couldn't read {}: {err}", .file.display())]
    Io { file: PathBuf, err: std::io::Error },

    #[error("Line {line} of the energy grid: {reason}")]
    BadCsv { line: usize, reason: String },

    #[error("Expected {expected} columns, got {got}")]
    WrongColumns { expected: usize, got: usize },

    #[error("Grid value at row {row}, column {col} is not positive; can't take its log")]
    NonPositive { row: usize, col: usize },

    #[error("A grid needs at least 2 points, got {0}")]
    TooFewPoints(usize),

    #[error("{name} must be positive and finite, got {value}")]
    BadStep { name: &'static str, value: f64 },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// Everything that can go wrong in this crate.
#[derive(Error, Debug)]
pub enum GridAuroraError {
    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Flux(#[from] FluxError),

    #[error(transparent)]
    Emissions(#[from] EmissionsError),

    #[error(transparent)]
    Transmittance(#[from] TransmittanceError),

    #[error(transparent)]
    Eigen(#[from] EigenError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Indices(#[from] IndicesError),

    #[error(transparent)]
    Fits(#[from] FitsError),
}
