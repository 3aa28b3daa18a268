//! Small numerical helpers shared by the physics modules.

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum NumericError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),

    #[error("Input vectors must have at least 2 points")]
    InsufficientData,

    #[error("Input vectors must have the same length ({0} vs. {1})")]
    MismatchedLengths(usize, usize),

    #[error("X values must be sorted in strictly ascending order")]
    UnsortedData,
}

/// Trapezoidal integral of `y` over the abscissa `x`. Fewer than two samples
/// integrate to 0.
pub fn trapz(y: ArrayView1<f64>, x: ArrayView1<f64>) -> Result<f64, NumericError> {
    if y.len() != x.len() {
        return Err(NumericError::MismatchedLengths(y.len(), x.len()));
    }

    Ok(x.windows(2)
        .into_iter()
        .zip(y.windows(2))
        .map(|(x, y)| 0.5 * (x[1] - x[0]) * (y[0] + y[1]))
        .sum())
}

/// Linear interpolation of `x` into the table (`xs`, `ys`).
///
/// `xs` must be strictly ascending. Values outside `[xs[0], xs[n-1]]` are an
/// error; callers decide what to do about extrapolation.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, NumericError> {
    check_table(xs, ys)?;

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];
    if !(min_x..=max_x).contains(&x) {
        return Err(NumericError::OutOfBounds(x, min_x, max_x));
    }

    Ok(interp_unchecked(x, xs, ys))
}

/// Verify that `xs` and `ys` form a usable interpolation table.
pub(crate) fn check_table(xs: &[f64], ys: &[f64]) -> Result<(), NumericError> {
    if xs.len() != ys.len() {
        return Err(NumericError::MismatchedLengths(xs.len(), ys.len()));
    }
    if xs.len() < 2 {
        return Err(NumericError::InsufficientData);
    }
    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(NumericError::UnsortedData);
    }
    Ok(())
}

/// Interpolate without validating the table; `x` must lie inside it.
pub(crate) fn interp_unchecked(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let idx = match xs.binary_search_by(|v| v.partial_cmp(&x).unwrap_or(Ordering::Less)) {
        Ok(exact_idx) => return ys[exact_idx],
        Err(insert_idx) => insert_idx,
    };

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);
    let t = (x - x1) / (x2 - x1);
    y1 + t * (y2 - y1)
}

/// The index of the element of `xs` closest to `x0`. Returns `None` for an
/// empty slice.
pub fn find_nearest(xs: &[f64], x0: f64) -> Option<usize> {
    xs.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - x0)
                .abs()
                .partial_cmp(&(*b - x0).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
}

/// Indices that would sort `v` in ascending order. The sort is stable and
/// NaNs go last.
pub fn argsort(v: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..v.len()).collect();
    indices.sort_by(|&a, &b| match (v[a].is_nan(), v[b].is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => v[a].partial_cmp(&v[b]).unwrap_or(Ordering::Equal),
    });
    indices
}

pub fn linspace(start: f64, stop: f64, num: usize) -> Array1<f64> {
    Array1::linspace(start, stop, num)
}

/// `num` points spaced evenly in log10 between `10^start_exp` and
/// `10^stop_exp`.
pub fn logspace(start_exp: f64, stop_exp: f64, num: usize) -> Array1<f64> {
    Array1::logspace(10.0, start_exp, stop_exp, num)
}

/// Ordinary least-squares fit of `y = slope * x + intercept`.
pub fn linregress(x: &[f64], y: &[f64]) -> Result<(f64, f64), NumericError> {
    if x.len() != y.len() {
        return Err(NumericError::MismatchedLengths(x.len(), y.len()));
    }
    if x.len() < 2 {
        return Err(NumericError::InsufficientData);
    }

    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let (sxy, sxx) = x
        .iter()
        .zip(y)
        .fold((0.0, 0.0), |(sxy, sxx), (&xi, &yi)| {
            let dx = xi - x_mean;
            (sxy + dx * (yi - y_mean), sxx + dx * dx)
        });
    let slope = sxy / sxx;
    Ok((slope, y_mean - slope * x_mean))
}

/// Numerical gradient of `y` with unit spacing in the index: central
/// differences inside, one-sided differences at the ends.
pub fn gradient(y: &[f64]) -> Vec<f64> {
    let n = y.len();
    match n {
        0 => vec![],
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    y[1] - y[0]
                } else if i == n - 1 {
                    y[n - 1] - y[n - 2]
                } else {
                    0.5 * (y[i + 1] - y[i - 1])
                }
            })
            .collect(),
    }
}
