//! World grids and solar geometry.

use hifitime::Epoch;
use ndarray::prelude::*;

use crate::GridError;

/// Meshgrid of geodetic latitude and longitude \[deg\] covering the globe,
/// `[lat][lon]`. Latitudes run from -90 to 90 and longitudes from -180 to
/// 180; the last point is dropped if a step doesn't land on the end.
pub fn latlon_world_grid(latstep: f64, lonstep: f64) -> Result<(Array2<f64>, Array2<f64>), GridError> {
    let lat = world_axis(-90.0, 90.0, latstep, "latstep")?;
    let lon = world_axis(-180.0, 180.0, lonstep, "lonstep")?;

    let shape = (lat.len(), lon.len());
    let glat = Array2::from_shape_fn(shape, |(i, _)| lat[i]);
    let glon = Array2::from_shape_fn(shape, |(_, j)| lon[j]);
    Ok((glat, glon))
}

fn world_axis(start: f64, stop: f64, step: f64, name: &'static str) -> Result<Vec<f64>, GridError> {
    if !(step > 0.0 && step.is_finite()) {
        return Err(GridError::BadStep { name, value: step });
    }
    // A little slack so that e.g. 180 / 0.1 still reaches the end.
    let n = ((stop - start) / step + 1e-9).floor() as usize + 1;
    Ok((0..n).map(|i| start + i as f64 * step).collect())
}

/// Geometric solar zenith angle \[deg\] at geodetic latitude and longitude
/// \[deg\], from the NOAA low-precision solar position (good to ~0.01 deg
/// between 1800 and 2100). Atmospheric refraction is not included.
pub fn solar_zenith_angle(t: Epoch, glat: f64, glon: f64) -> f64 {
    let unix = t.to_unix_seconds();
    let jd = unix / 86400.0 + 2440587.5;
    let jc = (jd - 2451545.0) / 36525.0;

    let mean_long = (280.46646 + jc * (36000.76983 + jc * 0.0003032)).rem_euclid(360.0);
    let mean_anom = 357.52911 + jc * (35999.05029 - 0.0001537 * jc);
    let ecc = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);
    let m = mean_anom.to_radians();
    let centre = m.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * m).sin() * 0.000289;

    let omega = (125.04 - 1934.136 * jc).to_radians();
    let app_long = mean_long + centre - 0.00569 - 0.00478 * omega.sin();
    let mean_obliq =
        23.0 + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliq = (mean_obliq + 0.00256 * omega.cos()).to_radians();
    let decl = (obliq.sin() * app_long.to_radians().sin()).asin();

    // Equation of time [minutes].
    let y = (obliq / 2.0).tan().powi(2);
    let l = mean_long.to_radians();
    let eq_time = 4.0
        * (y * (2.0 * l).sin() - 2.0 * ecc * m.sin()
            + 4.0 * ecc * y * m.sin() * (2.0 * l).cos()
            - 0.5 * y * y * (4.0 * l).sin()
            - 1.25 * ecc * ecc * (2.0 * m).sin())
        .to_degrees();

    let minutes = unix.rem_euclid(86400.0) / 60.0;
    let true_solar = (minutes + eq_time + 4.0 * glon).rem_euclid(1440.0);
    let hour_angle = (true_solar / 4.0 - 180.0).to_radians();

    let lat = glat.to_radians();
    let cos_zen = lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos();
    cos_zen.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_datetime;
    use approx::assert_abs_diff_eq;

    #[test]
    fn world_grid() {
        let (glat, glon) = latlon_world_grid(10.0, 20.0).unwrap();
        assert_eq!(glat.dim(), (19, 19));
        assert_abs_diff_eq!(glat[[0, 0]], -90.0);
        assert!(glat.row(0).iter().all(|&l| l == glat[[0, 0]]));
        assert_abs_diff_eq!(glon[[0, 1]], -160.0);
        assert!(glon.column(0).iter().all(|&l| l == glon[[0, 0]]));
        assert_abs_diff_eq!(glat[[18, 0]], 90.0);
        assert_abs_diff_eq!(glon[[0, 18]], 180.0);

        let (glat, _) = latlon_world_grid(7.0, 5.0).unwrap();
        assert_abs_diff_eq!(glat[[glat.nrows() - 1, 0]], 85.0);

        assert!(matches!(
            latlon_world_grid(0.0, 5.0),
            Err(GridError::BadStep { name: "latstep", .. })
        ));
    }

    #[test]
    fn alaska_midsummer() {
        let t = parse_datetime("2015-07-01T00:00:00").unwrap();
        assert_abs_diff_eq!(solar_zenith_angle(t, 65.0, -148.0), 46.451623, epsilon = 0.01);
    }

    #[test]
    fn noon_near_the_subsolar_point() {
        // Near the June solstice the Sun is overhead near the Tropic of
        // Cancer at local noon.
        let t = parse_datetime("2015-06-21T12:00:00").unwrap();
        assert!(solar_zenith_angle(t, 23.44, 0.0) < 1.0);
        assert!(solar_zenith_angle(t, -66.56, 0.0) > 89.0);
    }
}
