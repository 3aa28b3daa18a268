//! Date and time conversions for the models' Fortran-style time inputs.
//!
//! Times are `hifitime` [`Epoch`]s. Unix seconds ignore leap seconds, like
//! the Unix clock does; UT1 is taken to be UTC.

use std::borrow::Cow;

use hifitime::Epoch;
use ndarray::prelude::*;
use thiserror::Error;

const SECONDS_PER_DAY: f64 = 86400.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimeError {
    #[error("Couldn't parse '{input}' as a date/time: {reason}")]
    Parse { input: String, reason: String },
}

/// Unix seconds of midnight on January 1 of `year` and of the year after.
fn year_bounds(year: i32) -> (f64, f64) {
    (
        Epoch::from_gregorian_utc_at_midnight(year, 1, 1).to_unix_seconds(),
        Epoch::from_gregorian_utc_at_midnight(year + 1, 1, 1).to_unix_seconds(),
    )
}

/// Day of the year, starting at 1 on January 1.
pub fn day_of_year(t: Epoch) -> u32 {
    let (start, _) = year_bounds(t.to_gregorian_utc().0);
    ((t.to_unix_seconds() - start) / SECONDS_PER_DAY).floor() as u32 + 1
}

/// Seconds since UTC midnight.
pub fn utc_seconds_of_day(t: Epoch) -> f64 {
    let (_, _, _, h, mi, s, ns) = t.to_gregorian_utc();
    f64::from(h) * 3600.0 + f64::from(mi) * 60.0 + f64::from(s) + f64::from(ns) * 1e-9
}

/// `yyyyddd` (4-digit year, 3-digit day of year) and seconds since UTC
/// midnight.
pub fn datetime2yd(t: Epoch) -> (i64, f64) {
    let (y, ..) = t.to_gregorian_utc();
    (
        i64::from(y) * 1000 + i64::from(day_of_year(t)),
        utc_seconds_of_day(t),
    )
}

/// Day of year, seconds since UTC midnight and the solar local time
/// \[hours\] at each geodetic longitude \[deg\] of `glon`.
pub fn datetime2gtd(t: Epoch, glon: ArrayView2<f64>) -> (u32, f64, Array2<f64>) {
    let utsec = utc_seconds_of_day(t);
    let stl = glon.mapv(|lon| utsec / 3600.0 + lon / 15.0);
    (day_of_year(t), utsec, stl)
}

/// Decimal year to epoch, e.g. 2013.5 -> 2013-07-02T12:00:00.
pub fn yeardec2datetime(yeardec: f64) -> Epoch {
    let year = yeardec.floor();
    let (start, end) = year_bounds(year as i32);
    Epoch::from_unix_seconds(start + (yeardec - year) * (end - start))
}

/// Epoch to decimal year. Order and time differences within a year are
/// preserved.
pub fn datetime2yeardec(t: Epoch) -> f64 {
    let year = t.to_gregorian_utc().0;
    let (start, end) = year_bounds(year);
    f64::from(year) + (t.to_unix_seconds() - start) / (end - start)
}

/// Anything that can be turned into a Unix time.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeInput {
    Epoch(Epoch),
    /// An ISO-8601 date/time. Without a `Z` or `+HH:MM` suffix it's taken
    /// to be UTC.
    Text(String),
    /// Already seconds since the Unix epoch.
    UnixSeconds(f64),
}

impl From<Epoch> for TimeInput {
    fn from(e: Epoch) -> Self {
        TimeInput::Epoch(e)
    }
}

impl From<&str> for TimeInput {
    fn from(s: &str) -> Self {
        TimeInput::Text(s.to_string())
    }
}

impl From<f64> for TimeInput {
    fn from(s: f64) -> Self {
        TimeInput::UnixSeconds(s)
    }
}

/// UT1 seconds since the Unix epoch.
pub fn to_ut1_unix<T: Into<TimeInput>>(t: T) -> Result<f64, TimeError> {
    Ok(match t.into() {
        TimeInput::Epoch(e) => e.to_unix_seconds(),
        TimeInput::Text(s) => parse_datetime(&s)?.to_unix_seconds(),
        TimeInput::UnixSeconds(s) => s,
    })
}

/// Parse an ISO-8601 date, optionally with a time and a `Z`, `±HH:MM` or
/// `±HHMM` offset.
pub fn parse_datetime(input: &str) -> Result<Epoch, TimeError> {
    Epoch::from_gregorian_str(&colon_offset(input.trim())).map_err(|e| TimeError::Parse {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// hifitime wants offsets as `±HH:MM`.
fn colon_offset(s: &str) -> Cow<str> {
    let b = s.as_bytes();
    let n = b.len();
    // Longer than a bare date, ending in a sign and four digits.
    if n > 15 && matches!(b[n - 5], b'+' | b'-') && b[n - 4..].iter().all(u8::is_ascii_digit) {
        Cow::Owned(format!("{}:{}", &s[..n - 2], &s[n - 2..]))
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ut1_unix_from_various_inputs() {
        let naive = Epoch::from_gregorian_utc_at_midnight(2015, 7, 1);
        assert_abs_diff_eq!(to_ut1_unix(naive).unwrap(), 1435708800.0, epsilon = 1e-6);
        assert_abs_diff_eq!(to_ut1_unix("2015-07-01").unwrap(), 1435708800.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            to_ut1_unix("2015-07-01T00:00:00Z").unwrap(),
            1435708800.0,
            epsilon = 1e-6
        );
        // US/Eastern in summer.
        assert_abs_diff_eq!(
            to_ut1_unix("2015-07-01T00:00:00-04:00").unwrap(),
            1435723200.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            to_ut1_unix("2015-07-01T00:00:00-08:00").unwrap(),
            1435737600.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            to_ut1_unix("2015-07-01T00:00:00-0800").unwrap(),
            1435737600.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(to_ut1_unix(1435708800.0).unwrap(), 1435708800.0);
    }

    #[test]
    fn bad_strings() {
        assert!(matches!(parse_datetime("July 1st"), Err(TimeError::Parse { .. })));
        assert!(parse_datetime("2015-13-01").is_err());
    }

    #[test]
    fn fortran_dates() {
        let t = parse_datetime("2013-07-02T12:00:00").unwrap();
        let (yd, utsec) = datetime2yd(t);
        assert_eq!(yd, 2013183);
        assert_abs_diff_eq!(utsec, 43200.0, epsilon = 1e-6);

        let glon = array![[42.0, -15.0]];
        let (iyd, utsec, stl) = datetime2gtd(t, glon.view());
        assert_eq!(iyd, 183);
        assert_abs_diff_eq!(utsec, 43200.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stl[[0, 0]], 14.8, epsilon = 1e-9);
        assert_abs_diff_eq!(stl[[0, 1]], 11.0, epsilon = 1e-9);

        assert_eq!(day_of_year(parse_datetime("2016-12-31T23:59:59").unwrap()), 366);
        assert_eq!(day_of_year(parse_datetime("2017-01-01").unwrap()), 1);
    }

    #[test]
    fn decimal_years() {
        let t = parse_datetime("2013-07-02T12:00:00").unwrap();
        assert_abs_diff_eq!(datetime2yeardec(t), 2013.5, epsilon = 1e-12);
        assert_abs_diff_eq!(
            yeardec2datetime(2013.5).to_unix_seconds(),
            t.to_unix_seconds(),
            epsilon = 1e-6
        );

        // 2016 is a leap year.
        let t = parse_datetime("2016-12-31T00:00:00").unwrap();
        assert_abs_diff_eq!(datetime2yeardec(t), 2016.0 + 365.0 / 366.0, epsilon = 1e-12);
    }
}
