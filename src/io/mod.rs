//! Reading and writing the data products.
//!
//! Everything is stored as FITS. Tables (same-length columns) are binary
//! tables; everything else is a named image HDU with a `BUNIT` keyword.

pub(crate) mod fits;

pub use fits::FitsError;

use std::path::Path;

use log::{debug, info};
use ndarray::prelude::*;

use crate::{
    eigen::{Eigenprofiles, ReactionEigenprofiles},
    emissions::{BandTable, EmissionsError, ExcitationRates, MetastableTable, ReactionTables, VolumeEmission},
    energy_grid::EnergyBins,
    flux::FluxSpectrum,
    transmittance::{SystemComponents, SystemTransmittance, TransmittanceCurve},
};
use fits::*;

/// Parse numeric comma-separated rows, keeping the first `ncols` columns.
/// Blank lines and lines starting with '#' are ignored. Errors carry the
/// 1-based line number.
pub(crate) fn parse_csv_rows(text: &str, ncols: usize) -> Result<Vec<Vec<f64>>, (usize, String)> {
    let mut rows = vec![];
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split(',')
            .take(ncols)
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| (i + 1, format!("'{}': {e}", v.trim())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() < ncols {
            return Err((
                i + 1,
                format!("expected {ncols} columns, found {}", values.len()),
            ));
        }
        rows.push(values);
    }
    Ok(rows)
}

/// Column names accepted for the transmittance values of a curve.
const TRANSMITTANCE_COLUMNS: [&str; 2] = ["T", "QE"];

/// Read a transmittance (or QE) curve from the first extension of `file`: a
/// table with a `LAMBDA` column \[nm\] and a `T` or `QE` column.
pub fn read_transmittance<P: AsRef<Path>>(file: P) -> Result<TransmittanceCurve, FitsError> {
    let mut fptr = fits_open(&file)?;
    let hdu = fits_open_hdu(&mut fptr, 1)?;
    let names = fits_get_col_names(&fptr, &hdu)?;
    let value_col = TRANSMITTANCE_COLUMNS
        .into_iter()
        .find(|c| names.iter().any(|n| n.eq_ignore_ascii_case(c)))
        .ok_or_else(|| FitsError::MissingCol {
            expected: TRANSMITTANCE_COLUMNS.to_vec(),
            hdu_num: hdu.number + 1,
            file: file.as_ref().to_path_buf(),
        })?;

    let lambda: Vec<f64> = fits_get_col(&mut fptr, &hdu, "LAMBDA")?;
    let values: Vec<f64> = fits_get_col(&mut fptr, &hdu, value_col)?;
    if let Some(source) = fits_get_optional_key_long_string(&mut fptr, &hdu, "SOURCE")? {
        debug!("{}: {source}", file.as_ref().display());
    }
    Ok(TransmittanceCurve::new(lambda, values)?)
}

/// Write a curve in the layout [`read_transmittance`] expects. `value_col`
/// is `T` or `QE`.
pub fn write_transmittance<P: AsRef<Path>>(
    file: P,
    curve: &TransmittanceCurve,
    value_col: &str,
    source: Option<&str>,
) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    let hdu = fits_write_table(
        &mut fptr,
        "TRANSMITTANCE",
        &[
            ("LAMBDA", "nm", curve.wavelength_nm()),
            (value_col, "", curve.values()),
        ],
    )?;
    if let Some(source) = source {
        hdu.write_key(&mut fptr, "SOURCE", source)
            .map_err(fitsio_err(&fptr))?;
    }
    Ok(())
}

pub fn read_system_components<P: AsRef<Path>>(
    bg3: P,
    window: P,
    qe: P,
) -> Result<SystemComponents, FitsError> {
    Ok(SystemComponents {
        bg3: read_transmittance(bg3)?,
        window: read_transmittance(window)?,
        qe: read_transmittance(qe)?,
    })
}

pub fn write_system_t<P: AsRef<Path>>(file: P, t: &SystemTransmittance) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    let lambda = t.wavelength_nm.to_vec();
    let columns: Vec<Vec<f64>> = SystemTransmittance::COLUMNS
        .iter()
        .filter_map(|c| t.column(c))
        .map(|c| c.to_vec())
        .collect();
    let mut table = vec![("LAMBDA", "nm", lambda.as_slice())];
    for (name, values) in SystemTransmittance::COLUMNS.iter().zip(&columns) {
        table.push((*name, "", values.as_slice()));
    }
    fits_write_table(&mut fptr, "SYSTEM_T", &table)?;
    info!("Wrote system transmittance to {}", file.as_ref().display());
    Ok(())
}

/// HDU name prefixes of the band systems in a reaction table file.
const BANDS: [&str; 4] = ["N2P_1NG", "N2P_MEINEL", "N2_2PG", "N2_1PG"];

fn read_band(fptr: &mut fitsio::FitsFile, prefix: &'static str) -> Result<BandTable, FitsError> {
    let a = fits_get_array2(fptr, &format!("{prefix}_A"))?;
    let lambda = fits_get_array2(fptr, &format!("{prefix}_LAMBDA"))?;
    let fc = fits_get_array1(fptr, &format!("{prefix}_FC"))?;
    Ok(BandTable::new(prefix, a, lambda, fc)?)
}

/// Read the spectroscopic constants. Band tables are `[nu'][nu'']` image
/// HDUs named e.g. `N2_1PG_A`, `N2_1PG_LAMBDA` and `N2_1PG_FC`.
pub fn read_reaction_tables<P: AsRef<Path>>(file: P) -> Result<ReactionTables, FitsError> {
    let mut fptr = fits_open(&file)?;
    let metastable = MetastableTable::new(
        fits_get_array1(&mut fptr, "METASTABLE_A")?,
        fits_get_array1(&mut fptr, "METASTABLE_LAMBDA")?,
    )?;
    let atomic = fits_get_array1(&mut fptr, "ATOMIC_LAMBDA")?;
    if atomic.len() != 2 {
        return Err(EmissionsError::TableShape {
            table: "atomic",
            reason: format!("expected 2 wavelengths, got {}", atomic.len()),
        }
        .into());
    }

    Ok(ReactionTables {
        metastable,
        atomic_lambda_nm: [atomic[0], atomic[1]],
        n2_1ng: read_band(&mut fptr, BANDS[0])?,
        n2_meinel: read_band(&mut fptr, BANDS[1])?,
        n2_2pg: read_band(&mut fptr, BANDS[2])?,
        n2_1pg: read_band(&mut fptr, BANDS[3])?,
    })
}

pub fn write_reaction_tables<P: AsRef<Path>>(
    file: P,
    tables: &ReactionTables,
) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    fits_write_array1(&mut fptr, "METASTABLE_A", tables.metastable.a.view(), Some("s-1"))?;
    fits_write_array1(
        &mut fptr,
        "METASTABLE_LAMBDA",
        tables.metastable.lambda_nm.view(),
        Some("nm"),
    )?;
    fits_write_array1(
        &mut fptr,
        "ATOMIC_LAMBDA",
        ArrayView1::from(&tables.atomic_lambda_nm[..]),
        Some("nm"),
    )?;
    for (prefix, band) in BANDS.iter().zip([
        &tables.n2_1ng,
        &tables.n2_meinel,
        &tables.n2_2pg,
        &tables.n2_1pg,
    ]) {
        fits_write_array2(&mut fptr, &format!("{prefix}_A"), band.a.view(), Some("s-1"))?;
        fits_write_array2(
            &mut fptr,
            &format!("{prefix}_LAMBDA"),
            band.lambda_nm.view(),
            Some("nm"),
        )?;
        fits_write_array1(&mut fptr, &format!("{prefix}_FC"), band.franck_condon.view(), None)?;
    }
    Ok(())
}

/// Read excitation rates from the first extension of `file`: a table with an
/// `ALT_KM` column and one column per species (e.g. `NO1S`, `P1PG`). Species
/// names are lower-cased.
pub fn read_excitation_rates<P: AsRef<Path>>(file: P) -> Result<ExcitationRates, FitsError> {
    let mut fptr = fits_open(&file)?;
    let hdu = fits_open_hdu(&mut fptr, 1)?;
    let names = fits_get_col_names(&fptr, &hdu)?;

    let alt_km: Vec<f64> = fits_get_col(&mut fptr, &hdu, "ALT_KM")?;
    let mut rates = ExcitationRates::new(Array1::from(alt_km));
    for name in names.iter().filter(|n| !n.eq_ignore_ascii_case("ALT_KM")) {
        let profile: Vec<f64> = fits_get_col(&mut fptr, &hdu, name)?;
        rates.insert(&name.to_ascii_lowercase(), Array1::from(profile))?;
    }
    debug!(
        "Excitation rates for {}",
        rates.species().collect::<Vec<_>>().join(", ")
    );
    Ok(rates)
}

pub fn write_excitation_rates<P: AsRef<Path>>(
    file: P,
    rates: &ExcitationRates,
) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    let alt_km = rates.alt_km.to_vec();
    let names: Vec<String> = rates.species().map(|s| s.to_ascii_uppercase()).collect();
    let profiles = rates
        .species()
        .map(|s| rates.get(s).map(|p| p.to_vec()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = vec![("ALT_KM", "km", alt_km.as_slice())];
    for (name, profile) in names.iter().zip(&profiles) {
        table.push((name.as_str(), "cm-3 s-1", profile.as_slice()));
    }
    fits_write_table(&mut fptr, "EXCITATION_RATES", &table)?;
    Ok(())
}

pub fn write_flux<P: AsRef<Path>>(file: P, flux: &FluxSpectrum) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    fits_write_array1(&mut fptr, "ENERGY_EV", flux.energy_ev.view(), Some("eV"))?;
    fits_write_array1(&mut fptr, "E0_EV", flux.e0_ev.view(), Some("eV"))?;
    fits_write_array2(
        &mut fptr,
        "DIFF_NUM_FLUX",
        flux.diff_num_flux.view(),
        Some("cm-2 s-1 eV-1 sr-1"),
    )?;
    fits_write_array1(
        &mut fptr,
        "TOTAL_FLUX",
        flux.total_flux.view(),
        Some("cm-2 s-1 sr-1"),
    )?;
    info!("Wrote flux spectra to {}", file.as_ref().display());
    Ok(())
}

pub fn write_ver<P: AsRef<Path>>(file: P, ver: &VolumeEmission) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    fits_write_array1(&mut fptr, "ALT_KM", ver.alt_km.view(), Some("km"))?;
    fits_write_array1(&mut fptr, "WAVELENGTH_NM", ver.wavelength_nm.view(), Some("nm"))?;
    fits_write_array2(&mut fptr, "VER", ver.ver.view(), Some("photons cm-3 s-1"))?;
    fits_write_array1(
        &mut fptr,
        "BRIGHTNESS",
        ver.brightness.view(),
        Some("photons cm-2 s-1"),
    )?;
    Ok(())
}

pub fn read_ver<P: AsRef<Path>>(file: P) -> Result<VolumeEmission, FitsError> {
    let mut fptr = fits_open(&file)?;
    Ok(VolumeEmission {
        alt_km: fits_get_array1(&mut fptr, "ALT_KM")?,
        wavelength_nm: fits_get_array1(&mut fptr, "WAVELENGTH_NM")?,
        ver: fits_get_array2(&mut fptr, "VER")?,
        brightness: fits_get_array1(&mut fptr, "BRIGHTNESS")?,
    })
}

/// The beam energy a VER file was computed for, from the `ENERGY` key of
/// its `VER` HDU.
pub fn read_ver_beam_energy<P: AsRef<Path>>(file: P) -> Result<f64, FitsError> {
    let mut fptr = fits_open(&file)?;
    let hdu = fits_open_hdu(&mut fptr, "VER")?;
    fits_get_required_key(&mut fptr, &hdu, "ENERGY")
}

/// Write a per-beam VER file, noting the beam energy \[eV\].
pub fn write_beam_ver<P: AsRef<Path>>(
    file: P,
    energy_ev: f64,
    ver: &VolumeEmission,
) -> Result<(), FitsError> {
    write_ver(&file, ver)?;
    let mut fptr = fitsio::FitsFile::edit(file.as_ref()).map_err(|err| FitsError::Open {
        err,
        file: file.as_ref().to_path_buf(),
    })?;
    let hdu = fits_open_hdu(&mut fptr, "VER")?;
    hdu.write_key(&mut fptr, "ENERGY", energy_ev)
        .map_err(fitsio_err(&fptr))?;
    Ok(())
}

pub fn write_energy_bins<P: AsRef<Path>>(file: P, bins: &EnergyBins) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    let (low, high, flux) = (bins.low.to_vec(), bins.high.to_vec(), bins.flux.to_vec());
    fits_write_table(
        &mut fptr,
        "ENERGY_BINS",
        &[
            ("LOW", "eV", low.as_slice()),
            ("HIGH", "eV", high.as_slice()),
            ("FLUX", "cm-2 s-1 sr-1 eV-1", flux.as_slice()),
        ],
    )?;
    Ok(())
}

/// Optional companions of [`Eigenprofiles`] in an eigenprofile file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EigenprofileExtras<'a> {
    /// Bin edges for plotting \[eV\].
    pub ek_pcolor: Option<ArrayView1<'a, f64>>,
    /// Simulation times, UT1 seconds since the Unix epoch.
    pub ut1_unix: Option<ArrayView1<'a, f64>>,
    pub production: Option<&'a ReactionEigenprofiles>,
    pub loss: Option<&'a ReactionEigenprofiles>,
    /// Energy deposition, `[altitude][beam]`.
    pub energy_deposition: Option<ArrayView2<'a, f64>>,
}

/// Per-reaction rates as a 3-D image, with the reaction names in `REACTn`
/// keys.
fn write_reaction_eigenprofiles(
    fptr: &mut fitsio::FitsFile,
    extname: &str,
    rates: &ReactionEigenprofiles,
) -> Result<(), FitsError> {
    let hdu = fits_write_array3(fptr, extname, rates.rates.view(), Some("cm-3 s-1 / unit flux"))?;
    for (i, name) in rates.reactions.iter().enumerate() {
        hdu.write_key(fptr, &format!("REACT{}", i + 1), name.as_str())
            .map_err(fitsio_err(fptr))?;
    }
    Ok(())
}

pub fn write_eigenprofiles<P: AsRef<Path>>(
    file: P,
    eig: &Eigenprofiles,
    extras: EigenprofileExtras,
) -> Result<(), FitsError> {
    let mut fptr = fits_create(&file)?;
    fits_write_array1(&mut fptr, "ALT_KM", eig.alt_km.view(), Some("km"))?;
    fits_write_array1(&mut fptr, "ENERGY_EV", eig.energy_ev.view(), Some("eV"))?;
    if let Some(edges) = extras.ek_pcolor {
        fits_write_array1(&mut fptr, "ENERGY_EDGES_EV", edges, Some("eV"))?;
    }
    if let Some(ut1_unix) = extras.ut1_unix {
        fits_write_array1(&mut fptr, "UT1_UNIX", ut1_unix, Some("s"))?;
    }
    fits_write_array2(
        &mut fptr,
        "FILTERED",
        eig.filtered.view(),
        Some("photons cm-3 s-1 / unit flux"),
    )?;
    fits_write_array2(
        &mut fptr,
        "UNFILTERED",
        eig.unfiltered.view(),
        Some("photons cm-3 s-1 / unit flux"),
    )?;
    if let Some(production) = extras.production {
        write_reaction_eigenprofiles(&mut fptr, "PRODUCTION", production)?;
    }
    if let Some(loss) = extras.loss {
        write_reaction_eigenprofiles(&mut fptr, "LOSS", loss)?;
    }
    if let Some(deposition) = extras.energy_deposition {
        fits_write_array2(&mut fptr, "ENERGY_DEPOSITION", deposition, Some("eV cm-3 s-1"))?;
    }
    info!(
        "Wrote {} eigenprofiles to {}",
        eig.energy_ev.len(),
        file.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fits::*;
    use crate::emissions::{calc_emissions, Reaction};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn band(fc: [f64; 2]) -> BandTable {
        BandTable::new(
            "test",
            array![[1.0, 3.0], [2.0, f64::NAN]],
            array![[400.0, 500.0], [450.0, f64::NAN]],
            array![fc[0], fc[1]],
        )
        .unwrap()
    }

    #[test]
    fn transmittance_curve_with_source() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bg3.fits");
        let curve =
            TransmittanceCurve::new(vec![300.0, 400.0, 500.0], vec![0.1, 0.9, 0.5]).unwrap();
        write_transmittance(&file, &curve, "T", Some("http://www.howardglass.com/pdf/bg3_datasheet.pdf"))
            .unwrap();

        let read = read_transmittance(&file).unwrap();
        assert_eq!(read.wavelength_nm(), curve.wavelength_nm());
        assert_eq!(read.values(), curve.values());

        let qe = dir.path().join("qe.fits");
        write_transmittance(&qe, &curve, "QE", None).unwrap();
        assert_eq!(read_transmittance(&qe).unwrap().values(), curve.values());

        let bad = dir.path().join("bad.fits");
        write_transmittance(&bad, &curve, "TAU", None).unwrap();
        assert!(matches!(
            read_transmittance(&bad),
            Err(FitsError::MissingCol { .. })
        ));
    }

    #[test]
    fn emissions_from_files() {
        let dir = tempdir().unwrap();
        let tables = ReactionTables {
            metastable: MetastableTable::new(
                array![1.0, 2.0, 3.0, 4.0, 5.0],
                array![557.7, 297.2, 630.0, 636.4, 732.0],
            )
            .unwrap(),
            atomic_lambda_nm: [844.6, 777.4],
            n2_1ng: band([1.0, 1.0]),
            n2_meinel: band([1.0, 3.0]),
            n2_2pg: band([1.0, 1.0]),
            n2_1pg: band([1.0, 3.0]),
        };
        let tables_file = dir.path().join("tables.fits");
        write_reaction_tables(&tables_file, &tables).unwrap();

        let mut rates = ExcitationRates::new(array![100.0, 110.0, 120.0]);
        for name in ["no1s", "no1d", "noii2p", "po3p3p", "po3p5p", "p1ng", "pmein", "p2pg", "p1pg"] {
            rates.insert(name, array![1.0, 2.0, 4.0]).unwrap();
        }
        let rates_file = dir.path().join("rates.fits");
        write_excitation_rates(&rates_file, &rates).unwrap();

        let tables = read_reaction_tables(&tables_file).unwrap();
        assert!(tables.n2_1pg.a[[1, 1]].is_nan());
        let rates = read_excitation_rates(&rates_file).unwrap();
        assert_eq!(rates.get("p1pg").unwrap().to_vec(), vec![1.0, 2.0, 4.0]);

        let ver = calc_emissions(&rates, &tables, &Reaction::ALL).unwrap();
        let ver_file = dir.path().join("ver.fits");
        write_beam_ver(&ver_file, 1000.0, &ver).unwrap();
        let read = read_ver(&ver_file).unwrap();
        assert_eq!(read.wavelength_nm, ver.wavelength_nm);
        assert_eq!(read.ver, ver.ver);
        assert_relative_eq!(read_ver_beam_energy(&ver_file).unwrap(), 1000.0);
    }

    #[test]
    fn missing_hdus_are_errors() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("empty.fits");
        let curve = TransmittanceCurve::new(vec![300.0, 400.0], vec![0.1, 0.9]).unwrap();
        write_transmittance(&file, &curve, "T", None).unwrap();
        assert!(matches!(
            read_reaction_tables(&file),
            Err(FitsError::NotFound { file: f, .. }) if f == file
        ));
        assert!(matches!(
            read_transmittance(dir.path().join("nope.fits")),
            Err(FitsError::Open { .. })
        ));
        // Errors from an open file name it.
        let mut fptr = fits_open(&file).unwrap();
        assert!(matches!(
            fits_get_array2(&mut fptr, "TRANSMITTANCE"),
            Err(FitsError::NotImage { file: f, .. }) if f == file
        ));
    }

    #[test]
    fn csv_rows() {
        let rows = parse_csv_rows("# E, dE\n1.0, 2.0, 3.0\n\n4.0,5.0\n", 2).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);
        assert_eq!(parse_csv_rows("1.0,x\n", 2).unwrap_err().0, 1);
    }

    #[test]
    fn eigenprofiles_with_extras() {
        let dir = tempdir().unwrap();
        let eig = Eigenprofiles {
            alt_km: array![100.0, 150.0, 200.0],
            energy_ev: array![50.0, 100.0],
            filtered: Array2::from_shape_fn((3, 2), |(i, j)| (i * 2 + j) as f64),
            unfiltered: Array2::ones((3, 2)),
        };
        let production = ReactionEigenprofiles {
            reactions: vec!["no1s".to_string(), "p1ng".to_string()],
            rates: Array3::from_shape_fn((3, 2, 2), |(i, j, k)| (i * 4 + j * 2 + k) as f64),
        };
        let deposition = Array2::from_elem((3, 2), 7.0);
        let times = array![1435708800.0];

        let bare = dir.path().join("bare.fits");
        write_eigenprofiles(&bare, &eig, EigenprofileExtras::default()).unwrap();
        let mut fptr = fits_open(&bare).unwrap();
        assert_eq!(fits_get_array2(&mut fptr, "FILTERED").unwrap(), eig.filtered);
        assert!(matches!(
            fits_get_array1(&mut fptr, "UT1_UNIX"),
            Err(FitsError::NotFound { .. })
        ));

        let file = dir.path().join("full.fits");
        write_eigenprofiles(
            &file,
            &eig,
            EigenprofileExtras {
                ut1_unix: Some(times.view()),
                production: Some(&production),
                loss: Some(&production),
                energy_deposition: Some(deposition.view()),
                ..Default::default()
            },
        )
        .unwrap();
        let mut fptr = fits_open(&file).unwrap();
        assert_eq!(fits_get_array1(&mut fptr, "UT1_UNIX").unwrap(), times);
        assert_eq!(fits_get_array2(&mut fptr, "ENERGY_DEPOSITION").unwrap(), deposition);
        for extname in ["PRODUCTION", "LOSS"] {
            let hdu = fits_open_hdu(&mut fptr, extname).unwrap();
            assert_eq!(fits_get_image_size(&fptr, &hdu).unwrap(), &vec![3, 2, 2]);
            let data: Vec<f64> = fits_get_image(&mut fptr, &hdu).unwrap();
            assert_eq!(data, production.rates.iter().copied().collect::<Vec<_>>());
            let react2: String = fits_get_required_key(&mut fptr, &hdu, "REACT2").unwrap();
            assert_eq!(react2, "p1ng");
        }
    }
}
