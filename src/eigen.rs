//! Eigenprofiles: the optical response of the ionosphere to each
//! monoenergetic electron beam.
//!
//! Each column of an eigenprofile matrix is the VER per unit differential
//! number flux for one beam energy; rows are altitudes.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use ndarray::prelude::*;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    io::parse_csv_rows,
    emissions::{EmissionsError, ExcitationRates, VolumeEmission},
    optical::{optical_model, OpticalFilter},
    transmittance::{SystemTransmittance, TransmittanceError},
};

#[derive(Error, Debug)]
pub enum EigenError {
    #[error("Couldn't read beam energies from {}: {err}", .file.display())]
    Io { file: PathBuf, err: std::io::Error },

    #[error("Line {line} of the beam energy table: {reason}")]
    BadCsv { line: usize, reason: String },

    #[error("The beam energy table has no rows")]
    EmptyCsv,

    #[error("No beams were given")]
    NoBeams,

    #[error("Beam {energy_ev} eV has {got} altitudes, but earlier beams have {expected}")]
    AltitudeMismatch {
        energy_ev: f64,
        got: usize,
        expected: usize,
    },

    #[error("Beam {energy_ev} eV has altitude {got} km at index {index}, but earlier beams have {expected} km")]
    AltitudeGridDiffers {
        energy_ev: f64,
        index: usize,
        got: f64,
        expected: f64,
    },

    #[error(transparent)]
    Emissions(#[from] EmissionsError),

    #[error(transparent)]
    Transmittance(#[from] TransmittanceError),
}

/// Beam energies of a set of monoenergetic simulations.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamEnergies {
    /// Energy of each beam \[eV\].
    pub ek: Array1<f64>,

    /// Bin edges for plotting: `ek` followed by the upper edge of the last
    /// bin.
    pub ek_pcolor: Array1<f64>,
}

impl BeamEnergies {
    pub fn from_csv<P: AsRef<Path>>(file: P) -> Result<BeamEnergies, EigenError> {
        let file = file.as_ref();
        info!("Beam energies from {}", file.display());
        let text = std::fs::read_to_string(file).map_err(|err| EigenError::Io {
            file: file.to_path_buf(),
            err,
        })?;
        Self::parse(&text)
    }

    /// Parse comma-separated rows; the first two columns are used.
    pub fn parse(text: &str) -> Result<BeamEnergies, EigenError> {
        let rows = parse_csv_rows(text, 2).map_err(|(line, reason)| EigenError::BadCsv {
            line,
            reason,
        })?;
        let last = rows.last().ok_or(EigenError::EmptyCsv)?;
        let upper_edge = last[1];

        let ek: Array1<f64> = rows.iter().map(|r| r[0]).collect();
        let ek_pcolor = ek.iter().copied().chain(std::iter::once(upper_edge)).collect();
        Ok(BeamEnergies { ek, ek_pcolor })
    }
}

/// The index of the lowest beam to use. Beams below `min_beam_ev` are only
/// dropped when `zero_unused` is set.
pub fn beams_used(zero_unused: bool, ek: &[f64], min_beam_ev: f64) -> usize {
    if zero_unused {
        match ek.iter().position(|&e| e >= min_beam_ev) {
            Some(i) => return i,
            None => warn!(
                "minimum beam energy {min_beam_ev} eV is outside the simulation energy range, falling back to using all beams"
            ),
        }
    }
    0
}

/// Filtered ("gray") and unfiltered eigenprofiles, `[altitude][beam]`.
#[derive(Debug, Clone)]
pub struct Eigenprofiles {
    pub alt_km: Array1<f64>,
    /// Energy of each column \[eV\].
    pub energy_ev: Array1<f64>,
    /// VER through the optical system, summed over wavelength.
    pub filtered: Array2<f64>,
    /// VER summed over wavelength.
    pub unfiltered: Array2<f64>,
}

/// Per-reaction production or loss rates of each beam,
/// `[altitude][beam][reaction]`.
#[derive(Debug, Clone)]
pub struct ReactionEigenprofiles {
    pub reactions: Vec<String>,
    pub rates: Array3<f64>,
}

impl ReactionEigenprofiles {
    /// Stack the rates of each `(energy [eV], rates)` beam, in beam order. The
    /// reactions are those of the first beam; every beam needs them all, on
    /// the first beam's altitudes.
    pub fn from_beams(
        beams: &[(f64, ExcitationRates)],
    ) -> Result<ReactionEigenprofiles, EigenError> {
        let (_, first) = beams.first().ok_or(EigenError::NoBeams)?;
        let reactions: Vec<String> = first.species().map(str::to_string).collect();

        let mut rates = Array3::zeros((first.alt_km.len(), beams.len(), reactions.len()));
        for (j, (energy_ev, beam)) in beams.iter().enumerate() {
            check_altitudes(*energy_ev, beam.alt_km.view(), first.alt_km.view())?;
            for (k, name) in reactions.iter().enumerate() {
                rates.slice_mut(s![.., j, k]).assign(&beam.get(name)?);
            }
        }
        Ok(ReactionEigenprofiles { reactions, rates })
    }
}

fn check_altitudes(
    energy_ev: f64,
    alt_km: ArrayView1<f64>,
    first: ArrayView1<f64>,
) -> Result<(), EigenError> {
    if first.len() != alt_km.len() {
        return Err(EigenError::AltitudeMismatch {
            energy_ev,
            got: alt_km.len(),
            expected: first.len(),
        });
    }
    match alt_km
        .iter()
        .zip(first.iter())
        .enumerate()
        .find(|(_, (a, b))| !((*a - *b).abs() <= 1e-9 * b.abs().max(1.0)))
    {
        Some((index, (&got, &expected))) => Err(EigenError::AltitudeGridDiffers {
            energy_ev,
            index,
            got,
            expected,
        }),
        None => Ok(()),
    }
}

/// Builds eigenprofiles one beam at a time, in beam order.
pub struct EigenprofileAccumulator<'a> {
    system_t: &'a SystemTransmittance,
    filter: OpticalFilter,
    alt_km: Option<Array1<f64>>,
    energy_ev: Vec<f64>,
    filtered: Vec<Array1<f64>>,
    unfiltered: Vec<Array1<f64>>,
}

impl<'a> EigenprofileAccumulator<'a> {
    pub fn new(system_t: &'a SystemTransmittance, filter: OpticalFilter) -> Self {
        EigenprofileAccumulator {
            system_t,
            filter,
            alt_km: None,
            energy_ev: vec![],
            filtered: vec![],
            unfiltered: vec![],
        }
    }

    /// Reduce the VER of one beam.
    pub fn add(&mut self, energy_ev: f64, ver: &VolumeEmission) -> Result<(), EigenError> {
        let gray = optical_model(
            ver.ver.view(),
            ver.wavelength_nm.view(),
            self.system_t,
            self.filter,
        )?;
        self.push(energy_ev, ver.alt_km.view(), gray, ver.summed_over_wavelength())
    }

    fn push(
        &mut self,
        energy_ev: f64,
        alt_km: ArrayView1<f64>,
        filtered: Array1<f64>,
        unfiltered: Array1<f64>,
    ) -> Result<(), EigenError> {
        let first_alt = self.alt_km.get_or_insert_with(|| alt_km.to_owned());
        check_altitudes(energy_ev, alt_km, first_alt.view())?;

        if let (Some(first), Some(&first_energy)) = (self.filtered.first(), self.energy_ev.first()) {
            if *first == filtered {
                error!(
                    "all eigenprofile values for beam {energy_ev} eV are equal to those for beam {first_energy} eV"
                );
            }
        }

        self.energy_ev.push(energy_ev);
        self.filtered.push(filtered);
        self.unfiltered.push(unfiltered);
        Ok(())
    }

    /// `None` if no beam was added.
    pub fn finish(self) -> Option<Eigenprofiles> {
        let alt_km = self.alt_km?;
        let stack = |columns: &[Array1<f64>]| {
            Array2::from_shape_fn((alt_km.len(), columns.len()), |(i, j)| columns[j][i])
        };
        Some(Eigenprofiles {
            filtered: stack(&self.filtered),
            unfiltered: stack(&self.unfiltered),
            energy_ev: Array1::from(self.energy_ev),
            alt_km,
        })
    }
}

/// Compute eigenprofiles for every used beam. `ver_for_beam` produces the VER
/// of a beam, or `None` if that beam couldn't be read (it's skipped). Beams
/// are evaluated in parallel; the output columns stay in beam order.
pub fn build_eigenprofiles<F>(
    ek: &[f64],
    lowest_beam: usize,
    system_t: &SystemTransmittance,
    filter: OpticalFilter,
    ver_for_beam: F,
) -> Result<Option<Eigenprofiles>, EigenError>
where
    F: Fn(f64) -> Result<Option<VolumeEmission>, EigenError> + Sync,
{
    let beams = ek.get(lowest_beam..).unwrap_or(&[]);

    let reduced = beams
        .par_iter()
        .map(|&energy| {
            let ver = match ver_for_beam(energy)? {
                Some(ver) => ver,
                None => {
                    info!("skipped reading beam {energy} eV");
                    return Ok(None);
                }
            };
            let gray = optical_model(ver.ver.view(), ver.wavelength_nm.view(), system_t, filter)?;
            Ok(Some((energy, ver.alt_km.clone(), gray, ver.summed_over_wavelength())))
        })
        .collect::<Result<Vec<_>, EigenError>>()?;

    let mut acc = EigenprofileAccumulator::new(system_t, filter);
    for (energy, alt_km, gray, unfiltered) in reduced.into_iter().flatten() {
        acc.push(energy, alt_km.view(), gray, unfiltered)?;
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn system_t() -> SystemTransmittance {
        SystemTransmittance {
            wavelength_nm: array![557.7, 630.0],
            bg3: array![0.5, 0.1],
            window: array![1.0, 1.0],
            qe: array![1.0, 1.0],
            atm: array![1.0, 1.0],
            sys_no_bg3: array![1.0, 1.0],
            sys: array![0.5, 0.1],
        }
    }

    fn beam_ver(energy: f64) -> VolumeEmission {
        let alt_km = array![100.0, 150.0, 200.0];
        let ver = Array2::from_shape_fn((3, 2), |(i, j)| energy * (i + 1) as f64 * (j + 1) as f64);
        VolumeEmission {
            brightness: array![0.0, 0.0],
            wavelength_nm: array![557.7, 630.0],
            alt_km,
            ver,
        }
    }

    #[test]
    fn beam_energies_from_csv() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "50.0, 75.0").unwrap();
        writeln!(f, "100.0, 150.0").unwrap();
        writeln!(f, "200.0, 300.0").unwrap();
        let beams = BeamEnergies::from_csv(f.path()).unwrap();
        assert_eq!(beams.ek.to_vec(), vec![50.0, 100.0, 200.0]);
        assert_eq!(beams.ek_pcolor.to_vec(), vec![50.0, 100.0, 200.0, 300.0]);

        assert!(matches!(
            BeamEnergies::parse("1.0, 2.0\n3.0\n"),
            Err(EigenError::BadCsv { line: 2, .. })
        ));
        assert!(matches!(BeamEnergies::parse("\n"), Err(EigenError::EmptyCsv)));
        assert!(matches!(
            BeamEnergies::from_csv("/does/not/exist.csv"),
            Err(EigenError::Io { .. })
        ));
    }

    #[test]
    fn lowest_beam() {
        let ek = [50.0, 100.0, 200.0];
        assert_eq!(beams_used(false, &ek, 100.0), 0);
        assert_eq!(beams_used(true, &ek, 100.0), 1);
        assert_eq!(beams_used(true, &ek, 1e6), 0);
    }

    #[test]
    fn eigenprofiles_per_beam() {
        let t = system_t();
        let ek = [50.0, 100.0, 200.0];
        let eig = build_eigenprofiles(&ek, 1, &t, OpticalFilter::Bg3, |e| Ok(Some(beam_ver(e))))
            .unwrap()
            .unwrap();

        assert_eq!(eig.energy_ev.to_vec(), vec![100.0, 200.0]);
        assert_eq!(eig.filtered.dim(), (3, 2));
        // Row 0 of beam 100 eV: [100, 200] . [0.5, 0.1]
        assert_relative_eq!(eig.filtered[[0, 0]], 70.0);
        assert_relative_eq!(eig.unfiltered[[2, 1]], 200.0 * 3.0 * 3.0);
    }

    #[test]
    fn skipped_beams_and_no_beams() {
        let t = system_t();
        let ek = [50.0, 100.0, 200.0];
        let eig = build_eigenprofiles(&ek, 0, &t, OpticalFilter::None, |e| {
            Ok((e != 100.0).then(|| beam_ver(e)))
        })
        .unwrap()
        .unwrap();
        assert_eq!(eig.energy_ev.to_vec(), vec![50.0, 200.0]);

        let none = build_eigenprofiles(&ek, 0, &t, OpticalFilter::None, |_| Ok(None)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn sequential_accumulation_matches_parallel() {
        let t = system_t();
        let ek = [50.0, 100.0];
        let mut acc = EigenprofileAccumulator::new(&t, OpticalFilter::Bg3);
        for &e in &ek {
            acc.add(e, &beam_ver(e)).unwrap();
        }
        let sequential = acc.finish().unwrap();
        let parallel = build_eigenprofiles(&ek, 0, &t, OpticalFilter::Bg3, |e| Ok(Some(beam_ver(e))))
            .unwrap()
            .unwrap();
        assert_eq!(sequential.filtered, parallel.filtered);
        assert_eq!(sequential.unfiltered, parallel.unfiltered);
    }

    #[test]
    fn mismatched_altitudes() {
        let t = system_t();
        let mut acc = EigenprofileAccumulator::new(&t, OpticalFilter::Bg3);
        acc.add(50.0, &beam_ver(50.0)).unwrap();
        let mut short = beam_ver(100.0);
        short.alt_km = array![100.0, 150.0];
        short.ver = short.ver.slice(s![..2, ..]).to_owned();
        assert!(matches!(
            acc.add(100.0, &short),
            Err(EigenError::AltitudeMismatch { got: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn shifted_altitudes() {
        let t = system_t();
        let mut acc = EigenprofileAccumulator::new(&t, OpticalFilter::Bg3);
        acc.add(50.0, &beam_ver(50.0)).unwrap();

        let mut shifted = beam_ver(100.0);
        shifted.alt_km = array![100.0, 155.0, 200.0];
        assert!(matches!(
            acc.add(100.0, &shifted),
            Err(EigenError::AltitudeGridDiffers { index: 1, got, expected, .. })
                if got == 155.0 && expected == 150.0
        ));

        let mut nan = beam_ver(100.0);
        nan.alt_km[2] = f64::NAN;
        assert!(matches!(
            acc.add(100.0, &nan),
            Err(EigenError::AltitudeGridDiffers { index: 2, .. })
        ));

        // Rounding noise in the altitudes is fine.
        let mut noisy = beam_ver(100.0);
        noisy.alt_km[1] += 1e-12;
        acc.add(100.0, &noisy).unwrap();
        assert_eq!(acc.finish().unwrap().energy_ev.to_vec(), vec![50.0, 100.0]);
    }

    #[test]
    fn repeated_profiles_are_kept() {
        let t = system_t();
        let mut acc = EigenprofileAccumulator::new(&t, OpticalFilter::Bg3);
        acc.add(50.0, &beam_ver(50.0)).unwrap();
        // Same VER as the first beam, so the same filtered profile; that's
        // logged, not rejected.
        acc.add(100.0, &beam_ver(50.0)).unwrap();
        acc.add(200.0, &beam_ver(200.0)).unwrap();

        let eig = acc.finish().unwrap();
        assert_eq!(eig.energy_ev.to_vec(), vec![50.0, 100.0, 200.0]);
        assert_eq!(eig.filtered.dim(), (3, 3));
        assert_eq!(eig.filtered.column(0), eig.filtered.column(1));
        assert_ne!(eig.filtered.column(0), eig.filtered.column(2));
    }

    #[test]
    fn reaction_eigenprofiles() {
        let alt = array![100.0, 150.0];
        let beam = |scale: f64| {
            ExcitationRates::new(alt.clone())
                .with_rate("p1ng", array![1.0, 2.0] * scale)
                .unwrap()
                .with_rate("no1s", array![3.0, 4.0] * scale)
                .unwrap()
        };
        let prod = ReactionEigenprofiles::from_beams(&[(50.0, beam(1.0)), (100.0, beam(10.0))])
            .unwrap();
        assert_eq!(prod.reactions, vec!["no1s", "p1ng"]);
        assert_eq!(prod.rates.dim(), (2, 2, 2));
        assert_eq!(prod.rates[[1, 0, 0]], 4.0);
        assert_eq!(prod.rates[[0, 1, 1]], 10.0);

        let sparse = ExcitationRates::new(alt.clone())
            .with_rate("no1s", array![1.0, 1.0])
            .unwrap();
        assert!(matches!(
            ReactionEigenprofiles::from_beams(&[(50.0, beam(1.0)), (100.0, sparse)]),
            Err(EigenError::Emissions(EmissionsError::MissingRate(name))) if name == "p1ng"
        ));

        let moved = ExcitationRates::new(array![100.0, 160.0])
            .with_rate("no1s", array![1.0, 1.0])
            .unwrap()
            .with_rate("p1ng", array![1.0, 1.0])
            .unwrap();
        assert!(matches!(
            ReactionEigenprofiles::from_beams(&[(50.0, beam(1.0)), (100.0, moved)]),
            Err(EigenError::AltitudeGridDiffers { energy_ev, index: 1, .. }) if energy_ev == 100.0
        ));
        assert!(matches!(
            ReactionEigenprofiles::from_beams(&[]),
            Err(EigenError::NoBeams)
        ));
    }
}
