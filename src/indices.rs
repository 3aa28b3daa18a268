//! Monthly geophysical indices (F10.7 and Ap) from NOAA SWPC's
//! `RecentIndices.txt`.
//!
//! Ideally these would come from the NGDC KP_AP archive, but the SWPC weekly
//! file is much easier to get hold of.

use std::{collections::BTreeMap, path::{Path, PathBuf}};

use hifitime::Epoch;
use log::debug;
use thiserror::Error;

pub const DOWNLOAD_URL: &str = "ftp://ftp.swpc.noaa.gov/pub/weekly/RecentIndices.txt";

#[derive(Error, Debug)]
pub enum IndicesError {
    #[error("{} doesn't exist; download it from {}", .file.display(), DOWNLOAD_URL)]
    NotFound { file: PathBuf },

    #[error("Couldn't read {}: {err}", .file.display())]
    Io { file: PathBuf, err: std::io::Error },

    #[error("Line {line} of the indices file: {reason}")]
    Parse { line: usize, reason: String },

    #[error("No indices for {0}")]
    MissingMonth(u32),
}

/// Observed and smoothed monthly indices. Missing values are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyIndices {
    pub f107_observed: f64,
    pub f107_smoothed: f64,
    pub ap_observed: f64,
    pub ap_smoothed: f64,
}

/// Monthly indices keyed by `yyyymm`.
#[derive(Debug, Clone, Default)]
pub struct RecentIndices {
    months: BTreeMap<u32, MonthlyIndices>,
}

impl RecentIndices {
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<RecentIndices, IndicesError> {
        let file = file.as_ref();
        if !file.is_file() {
            return Err(IndicesError::NotFound {
                file: file.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(file).map_err(|err| IndicesError::Io {
            file: file.to_path_buf(),
            err,
        })?;
        Self::parse(&text)
    }

    /// Lines starting with '#' or ':' are comments. Of the remaining
    /// whitespace-separated columns, 0 and 1 are the year and month, and 7
    /// to 10 are F10.7 observed and smoothed then Ap observed and smoothed.
    pub fn parse(text: &str) -> Result<RecentIndices, IndicesError> {
        let mut months = BTreeMap::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(':') {
                continue;
            }
            let parse_err = |reason: String| IndicesError::Parse {
                line: i + 1,
                reason,
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 11 {
                return Err(parse_err(format!("expected 11 columns, found {}", fields.len())));
            }
            let column = |c: usize| -> Result<f64, IndicesError> {
                let v: f64 = fields[c]
                    .parse()
                    .map_err(|e| parse_err(format!("column {c} ('{}'): {e}", fields[c])))?;
                // -1 marks missing data.
                Ok(if v == -1.0 { f64::NAN } else { v })
            };

            let (year, month) = (column(0)?, column(1)?);
            if !(1.0..=12.0).contains(&month) || !(year >= 0.0) {
                return Err(parse_err(format!("bad year/month {year} {month}")));
            }
            let yyyymm = year as u32 * 100 + month as u32;
            months.insert(
                yyyymm,
                MonthlyIndices {
                    f107_observed: column(7)?,
                    f107_smoothed: column(8)?,
                    ap_observed: column(9)?,
                    ap_smoothed: column(10)?,
                },
            );
        }
        debug!("Read indices for {} months", months.len());
        Ok(RecentIndices { months })
    }

    pub fn get(&self, yyyymm: u32) -> Result<MonthlyIndices, IndicesError> {
        self.months
            .get(&yyyymm)
            .copied()
            .ok_or(IndicesError::MissingMonth(yyyymm))
    }

    /// The indices for the month containing `t`.
    pub fn at(&self, t: Epoch) -> Result<MonthlyIndices, IndicesError> {
        let (y, m, ..) = t.to_gregorian_utc();
        self.get(y.max(0) as u32 * 100 + u32::from(m))
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

/// Convenience for a single lookup.
pub fn read_monthly_ap_f107<P: AsRef<Path>>(
    yyyymm: u32,
    file: P,
) -> Result<MonthlyIndices, IndicesError> {
    RecentIndices::from_file(file)?.get(yyyymm)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
:Product: RecentIndices.txt
:Issued: 2017 Oct 02 0325 UTC
#  Monthly Mean Solar Cycle Values
#
#          Sunspot Number  Radio Flux  Geomagnetic
#  YR MO    SWO  RI RATIO  SWO  RI     10.7cm      Ap
2017 07   15.5   18.3 1.18   11.2  9.4   74.2  77.1   11  10.9
2017 08   33.1   25.2 1.31   20.6 15.6   77.9  76.3   12  10.7
2017 09   -1     -1   -1     -1   -1     -1    -1     -1  -1
";

    #[test]
    fn august_2017() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let ind = read_monthly_ap_f107(201708, f.path()).unwrap();
        assert_eq!(ind.f107_observed, 77.9);
        assert_eq!(ind.f107_smoothed, 76.3);
        assert_eq!(ind.ap_observed, 12.0);
        assert_eq!(ind.ap_smoothed, 10.7);
    }

    #[test]
    fn missing_values_and_months() {
        let indices = RecentIndices::parse(SAMPLE).unwrap();
        assert_eq!(indices.len(), 3);
        let sept = indices.get(201709).unwrap();
        assert!(sept.f107_observed.is_nan() && sept.ap_smoothed.is_nan());
        assert!(matches!(indices.get(201710), Err(IndicesError::MissingMonth(201710))));

        let t = Epoch::from_gregorian_utc_at_midnight(2017, 7, 15);
        assert_eq!(indices.at(t).unwrap().ap_observed, 11.0);
    }

    #[test]
    fn missing_file_names_the_download() {
        let err = RecentIndices::from_file("/no/such/RecentIndices.txt").unwrap_err();
        assert!(err.to_string().contains(DOWNLOAD_URL));
    }

    #[test]
    fn short_lines_are_errors() {
        assert!(matches!(
            RecentIndices::parse("2017 08 33.1\n"),
            Err(IndicesError::Parse { line: 1, .. })
        ));
    }
}
