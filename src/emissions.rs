//! Volume emission rates from excitation rates.
//!
//! Each reaction contributes one or more emission lines or bands. Molecular
//! bands distribute the excitation rate of each upper vibrational level (nu')
//! over the lower levels (nu'') with the Einstein coefficients, weighted by
//! Franck-Condon factors. See Eqn. 9 of Appendix C of Zettergren's 2007 PhD
//! thesis.
//!
//! Band tables are `[nu'][nu'']`. Whenever they are flattened into emission
//! columns, it's in column-major order: all nu' for nu'' = 0, then all nu' for
//! nu'' = 1, and so on.

use std::{collections::BTreeMap, fmt, str::FromStr};

use log::{debug, trace};
use ndarray::{concatenate, prelude::*};
use thiserror::Error;

use crate::numeric::{argsort, trapz, NumericError};

#[derive(Error, Debug)]
pub enum EmissionsError {
    #[error("No reactions were requested, so no VER can be generated")]
    NoReactionsRequested,

    #[error("None of the {0} emission columns has a finite wavelength")]
    NoFiniteWavelengths(usize),

    #[error("Unknown reaction '{0}'; expected one of metastable, atomic, n21ng, n2meinel, n22pg, n21pg")]
    UnknownReaction(String),

    #[error("The excitation rates don't have a '{0}' profile")]
    MissingRate(String),

    #[error("Rate profile '{name}' has {got} altitudes, but the altitude grid has {expected}")]
    RateLength {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("Bad '{table}' table: {reason}")]
    TableShape { table: &'static str, reason: String },

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// The reaction groups that produce optical emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reaction {
    /// O(1S), O(1D) and O+(2P) forbidden lines.
    Metastable,
    /// Prompt atomic oxygen 844.6 and 777.4 nm.
    Atomic,
    /// N2+ first negative group.
    N2FirstNegative,
    /// N2+ Meinel band.
    N2Meinel,
    /// N2 second positive group (Benesch et al. 1966).
    N2SecondPositive,
    /// N2 first positive group.
    N2FirstPositive,
}

impl Reaction {
    /// Every reaction, in the order their emission columns are accumulated.
    pub const ALL: [Reaction; 6] = [
        Reaction::Metastable,
        Reaction::Atomic,
        Reaction::N2FirstNegative,
        Reaction::N2Meinel,
        Reaction::N2SecondPositive,
        Reaction::N2FirstPositive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Reaction::Metastable => "metastable",
            Reaction::Atomic => "atomic",
            Reaction::N2FirstNegative => "n21ng",
            Reaction::N2Meinel => "n2meinel",
            Reaction::N2SecondPositive => "n22pg",
            Reaction::N2FirstPositive => "n21pg",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Reaction {
    type Err = EmissionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reaction::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EmissionsError::UnknownReaction(s.to_string()))
    }
}

/// Excitation rate profiles for a single time, keyed by species name (e.g.
/// "no1s", "p1ng").
#[derive(Debug, Clone)]
pub struct ExcitationRates {
    /// Altitude grid \[km\].
    pub alt_km: Array1<f64>,

    rates: BTreeMap<String, Array1<f64>>,
}

impl ExcitationRates {
    pub fn new(alt_km: Array1<f64>) -> ExcitationRates {
        ExcitationRates {
            alt_km,
            rates: BTreeMap::new(),
        }
    }

    /// Add (or replace) the profile for `name`. The profile must be on the
    /// altitude grid.
    pub fn insert(&mut self, name: &str, profile: Array1<f64>) -> Result<(), EmissionsError> {
        if profile.len() != self.alt_km.len() {
            return Err(EmissionsError::RateLength {
                name: name.to_string(),
                got: profile.len(),
                expected: self.alt_km.len(),
            });
        }
        self.rates.insert(name.to_string(), profile);
        Ok(())
    }

    pub fn with_rate(mut self, name: &str, profile: Array1<f64>) -> Result<Self, EmissionsError> {
        self.insert(name, profile)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<ArrayView1<f64>, EmissionsError> {
        self.rates
            .get(name)
            .map(|r| r.view())
            .ok_or_else(|| EmissionsError::MissingRate(name.to_string()))
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(|k| k.as_str())
    }
}

/// Einstein coefficients and wavelengths of the metastable lines. The first
/// two lines come from O(1S), the next two from O(1D) and the rest from
/// O+(2P).
#[derive(Debug, Clone)]
pub struct MetastableTable {
    pub a: Array1<f64>,
    pub lambda_nm: Array1<f64>,
}

impl MetastableTable {
    pub fn new(a: Array1<f64>, lambda_nm: Array1<f64>) -> Result<MetastableTable, EmissionsError> {
        if a.len() < 5 {
            return Err(EmissionsError::TableShape {
                table: "metastable",
                reason: format!("need at least 5 Einstein coefficients, got {}", a.len()),
            });
        }
        if a.len() != lambda_nm.len() {
            return Err(EmissionsError::TableShape {
                table: "metastable",
                reason: format!("{} coefficients but {} wavelengths", a.len(), lambda_nm.len()),
            });
        }
        Ok(MetastableTable { a, lambda_nm })
    }
}

/// Einstein coefficients, wavelengths and Franck-Condon factors of a
/// molecular band system.
#[derive(Debug, Clone)]
pub struct BandTable {
    /// `[nu'][nu'']` Einstein coefficients. NaN marks absent transitions.
    pub a: Array2<f64>,

    /// `[nu'][nu'']` wavelengths \[nm\]. NaN marks absent transitions.
    pub lambda_nm: Array2<f64>,

    /// One factor per upper level nu'.
    pub franck_condon: Array1<f64>,
}

impl BandTable {
    pub fn new(
        table: &'static str,
        a: Array2<f64>,
        lambda_nm: Array2<f64>,
        franck_condon: Array1<f64>,
    ) -> Result<BandTable, EmissionsError> {
        if a.dim() != lambda_nm.dim() {
            return Err(EmissionsError::TableShape {
                table,
                reason: format!(
                    "Einstein coefficients are {:?} but wavelengths are {:?}",
                    a.dim(),
                    lambda_nm.dim()
                ),
            });
        }
        if franck_condon.len() != a.nrows() {
            return Err(EmissionsError::TableShape {
                table,
                reason: format!(
                    "{} Franck-Condon factors for {} upper levels",
                    franck_condon.len(),
                    a.nrows()
                ),
            });
        }
        Ok(BandTable {
            a,
            lambda_nm,
            franck_condon,
        })
    }

    /// Radiative lifetime of each upper level, 1 / sum(A) ignoring NaNs.
    pub fn lifetimes(&self) -> Array1<f64> {
        self.a
            .map_axis(Axis(1), |row| 1.0 / row.iter().filter(|a| !a.is_nan()).sum::<f64>())
    }

    /// Wavelengths in emission-column order.
    fn flat_lambda(&self) -> Vec<f64> {
        column_major(self.lambda_nm.view())
    }
}

fn column_major(a: ArrayView2<f64>) -> Vec<f64> {
    a.t().iter().copied().collect()
}

fn normalised(v: &Array1<f64>) -> Array1<f64> {
    v / v.sum()
}

/// All of the spectroscopic constants needed to turn excitation rates into
/// emissions.
#[derive(Debug, Clone)]
pub struct ReactionTables {
    pub metastable: MetastableTable,
    /// Wavelengths of the two prompt atomic oxygen lines.
    pub atomic_lambda_nm: [f64; 2],
    pub n2_1ng: BandTable,
    pub n2_meinel: BandTable,
    pub n2_2pg: BandTable,
    pub n2_1pg: BandTable,
}

/// Volume emission rate per altitude and wavelength.
#[derive(Debug, Clone)]
pub struct VolumeEmission {
    /// Altitude grid \[km\].
    pub alt_km: Array1<f64>,

    /// Ascending, finite wavelengths \[nm\].
    pub wavelength_nm: Array1<f64>,

    /// `[altitude][wavelength]` \[photons cm^-3 s^-1\].
    pub ver: Array2<f64>,

    /// Flux-tube (altitude) integrated intensity per wavelength.
    pub brightness: Array1<f64>,
}

impl VolumeEmission {
    /// VER summed over every wavelength, per altitude.
    pub fn summed_over_wavelength(&self) -> Array1<f64> {
        self.ver.sum_axis(Axis(1))
    }
}

/// Emission columns accumulated one reaction at a time.
struct Accumulator<'a> {
    alt_km: ArrayView1<'a, f64>,
    ver: Option<Array2<f64>>,
    lambda: Vec<f64>,
    brightness: Vec<f64>,
}

impl<'a> Accumulator<'a> {
    fn new(alt_km: ArrayView1<'a, f64>) -> Accumulator<'a> {
        Accumulator {
            alt_km,
            ver: None,
            lambda: vec![],
            brightness: vec![],
        }
    }

    /// Append the `[altitude][line]` emissions in `vnew` with their
    /// wavelengths.
    fn push(&mut self, vnew: Array2<f64>, lambda_new: &[f64]) -> Result<(), EmissionsError> {
        debug_assert_eq!(vnew.ncols(), lambda_new.len());
        for column in vnew.axis_iter(Axis(1)) {
            self.brightness.push(trapz(column, self.alt_km)?);
        }
        self.lambda.extend_from_slice(lambda_new);
        self.ver = Some(match self.ver.take() {
            None => vnew,
            Some(ver) => concatenate(Axis(1), &[ver.view(), vnew.view()])?,
        });
        Ok(())
    }

    /// Drop non-finite wavelengths and sort by wavelength.
    fn finish(self) -> Result<VolumeEmission, EmissionsError> {
        let ver = self.ver.ok_or(EmissionsError::NoReactionsRequested)?;

        let finite: Vec<usize> = (0..self.lambda.len())
            .filter(|&i| self.lambda[i].is_finite())
            .collect();
        let finite_lambda: Vec<f64> = finite.iter().map(|&i| self.lambda[i]).collect();
        // The wavelengths are built piecemeal and so are overall non-monotonic.
        let order: Vec<usize> = argsort(&finite_lambda)
            .into_iter()
            .map(|i| finite[i])
            .collect();
        trace!(
            "keeping {} of {} emission columns",
            order.len(),
            self.lambda.len()
        );
        if order.is_empty() {
            return Err(EmissionsError::NoFiniteWavelengths(self.lambda.len()));
        }

        Ok(VolumeEmission {
            alt_km: self.alt_km.to_owned(),
            wavelength_nm: order.iter().map(|&i| self.lambda[i]).collect(),
            ver: ver.select(Axis(1), &order),
            brightness: order.iter().map(|&i| self.brightness[i]).collect(),
        })
    }
}

/// Outer product of an altitude profile and per-line scale factors.
fn outer(profile: ArrayView1<f64>, scale: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((profile.len(), scale.len()), |(i, j)| profile[i] * scale[j])
}

/// Compute VER for the `requested` reactions. Duplicates and request order
/// don't matter; columns are always accumulated in [`Reaction::ALL`] order
/// before being sorted by wavelength.
pub fn calc_emissions(
    rates: &ExcitationRates,
    tables: &ReactionTables,
    requested: &[Reaction],
) -> Result<VolumeEmission, EmissionsError> {
    if requested.is_empty() {
        return Err(EmissionsError::NoReactionsRequested);
    }

    let mut acc = Accumulator::new(rates.alt_km.view());
    for reaction in Reaction::ALL.into_iter().filter(|r| requested.contains(r)) {
        debug!("Adding {reaction} emissions");
        match reaction {
            Reaction::Metastable => metastable(rates, &tables.metastable, &mut acc)?,
            Reaction::Atomic => atomic(rates, &tables.atomic_lambda_nm, &mut acc)?,
            Reaction::N2FirstNegative => {
                band(&tables.n2_1ng, false, rates.get("p1ng")?, &mut acc)?
            }
            Reaction::N2Meinel => band(&tables.n2_meinel, true, rates.get("pmein")?, &mut acc)?,
            Reaction::N2SecondPositive => {
                band(&tables.n2_2pg, false, rates.get("p2pg")?, &mut acc)?
            }
            Reaction::N2FirstPositive => n2_first_positive(&tables.n2_1pg, rates, &mut acc)?,
        }
    }

    acc.finish()
}

fn metastable(
    rates: &ExcitationRates,
    table: &MetastableTable,
    acc: &mut Accumulator,
) -> Result<(), EmissionsError> {
    let no1s = rates.get("no1s")?;
    let no1d = rates.get("no1d")?;
    let noii2p = rates.get("noii2p")?;

    let vnew = Array2::from_shape_fn((rates.alt_km.len(), table.a.len()), |(i, j)| {
        let rate = match j {
            0 | 1 => no1s[i],
            2 | 3 => no1d[i],
            _ => noii2p[i],
        };
        table.a[j] * rate
    });
    acc.push(vnew, &table.lambda_nm.to_vec())
}

fn atomic(
    rates: &ExcitationRates,
    lambda_nm: &[f64; 2],
    acc: &mut Accumulator,
) -> Result<(), EmissionsError> {
    let vnew = ndarray::stack(Axis(1), &[rates.get("po3p3p")?, rates.get("po3p5p")?])?;
    acc.push(vnew, lambda_nm)
}

/// Band systems whose upper-level populations follow directly from the
/// excitation rate: each line is `A * tau(nu') * fc(nu') * rate`.
fn band(
    table: &BandTable,
    normalise_fc: bool,
    rate: ArrayView1<f64>,
    acc: &mut Accumulator,
) -> Result<(), EmissionsError> {
    let tau = table.lifetimes();
    let fc = if normalise_fc {
        normalised(&table.franck_condon)
    } else {
        table.franck_condon.clone()
    };

    let weights = &tau * &fc;
    let scaled = &table.a * &weights.insert_axis(Axis(1));
    acc.push(outer(rate, &column_major(scaled.view())), &table.flat_lambda())
}

/// N2 1PG: solve for the base population from the total loss of the
/// (normalised) Franck-Condon distributed levels, then distribute with A.
fn n2_first_positive(
    table: &BandTable,
    rates: &ExcitationRates,
    acc: &mut Accumulator,
) -> Result<(), EmissionsError> {
    let tau = table.lifetimes();
    let consfac = normalised(&table.franck_condon);
    let loss_coef = (&consfac / &tau).sum();
    let n0 = rates.get("p1pg")?.mapv(|p| p / loss_coef);

    let scaled = &table.a * &consfac.view().insert_axis(Axis(1));
    acc.push(outer(n0.view(), &column_major(scaled.view())), &table.flat_lambda())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn band_table(name: &'static str, fc: [f64; 2]) -> BandTable {
        BandTable::new(
            name,
            array![[1.0, 3.0], [2.0, f64::NAN]],
            array![[400.0, 500.0], [450.0, f64::NAN]],
            array![fc[0], fc[1]],
        )
        .unwrap()
    }

    fn tables() -> ReactionTables {
        ReactionTables {
            metastable: MetastableTable::new(
                array![1.0, 2.0, 3.0, 4.0, 5.0],
                array![557.7, 297.2, 630.0, 636.4, 732.0],
            )
            .unwrap(),
            atomic_lambda_nm: [844.6, 777.4],
            n2_1ng: band_table("N2+1NG", [1.0, 1.0]),
            n2_meinel: band_table("N2+Meinel", [1.0, 3.0]),
            n2_2pg: band_table("N2_2PG", [1.0, 1.0]),
            n2_1pg: band_table("N2_1PG", [1.0, 3.0]),
        }
    }

    fn rates() -> ExcitationRates {
        let alt = array![100.0, 110.0, 120.0];
        let profile = array![1.0, 2.0, 4.0];
        let mut rates = ExcitationRates::new(alt);
        for (i, name) in [
            "no1s", "no1d", "noii2p", "po3p3p", "po3p5p", "p1ng", "pmein", "p2pg", "p1pg",
        ]
        .into_iter()
        .enumerate()
        {
            rates.insert(name, &profile * (i + 1) as f64).unwrap();
        }
        rates
    }

    #[test]
    fn reaction_names_round_trip() {
        for r in Reaction::ALL {
            assert_eq!(r.name().parse::<Reaction>().unwrap(), r);
        }
        assert!(matches!(
            "n2lbh".parse::<Reaction>(),
            Err(EmissionsError::UnknownReaction(_))
        ));
    }

    #[test]
    fn metastable_lines_are_sorted_by_wavelength() {
        let ver = calc_emissions(&rates(), &tables(), &[Reaction::Metastable]).unwrap();
        assert_eq!(
            ver.wavelength_nm.to_vec(),
            vec![297.2, 557.7, 630.0, 636.4, 732.0]
        );
        // At 120 km: no1s = 4, no1d = 8, noii2p = 12.
        let expected = [2.0 * 4.0, 1.0 * 4.0, 3.0 * 8.0, 4.0 * 8.0, 5.0 * 12.0];
        for (got, want) in ver.ver.row(2).iter().zip(expected) {
            assert_relative_eq!(*got, want);
        }
        // 297.2 nm: 2 * no1s = [2, 4, 8] over 10 km steps.
        assert_relative_eq!(ver.brightness[0], 5.0 * (2.0 + 4.0) + 5.0 * (4.0 + 8.0));
    }

    #[test]
    fn band_lines_use_lifetimes_and_drop_nan_wavelengths() {
        let ver = calc_emissions(&rates(), &tables(), &[Reaction::N2FirstNegative]).unwrap();
        assert_eq!(ver.wavelength_nm.to_vec(), vec![400.0, 450.0, 500.0]);
        // tau = [1/4, 1/2]; p1ng at 100 km is 6.
        let expected = [0.25 * 6.0, 1.0 * 6.0, 0.75 * 6.0];
        for (got, want) in ver.ver.row(0).iter().zip(expected) {
            assert_relative_eq!(*got, want);
        }
    }

    #[test]
    fn all_nan_wavelengths_are_an_error() {
        let mut tables = tables();
        tables.n2_1ng = BandTable::new(
            "N2+1NG",
            array![[1.0, 3.0], [2.0, 1.0]],
            Array2::from_elem((2, 2), f64::NAN),
            array![1.0, 1.0],
        )
        .unwrap();
        assert!(matches!(
            calc_emissions(&rates(), &tables, &[Reaction::N2FirstNegative]),
            Err(EmissionsError::NoFiniteWavelengths(4))
        ));

        // Other reactions keep their columns.
        let ver = calc_emissions(
            &rates(),
            &tables,
            &[Reaction::N2FirstNegative, Reaction::Atomic],
        )
        .unwrap();
        assert_eq!(ver.wavelength_nm.to_vec(), vec![777.4, 844.6]);
    }

    #[test]
    fn meinel_normalises_franck_condon() {
        let ver = calc_emissions(&rates(), &tables(), &[Reaction::N2Meinel]).unwrap();
        // fc -> [0.25, 0.75]; pmein at 100 km is 7.
        let expected = [0.0625 * 7.0, 0.75 * 7.0, 0.1875 * 7.0];
        for (got, want) in ver.ver.row(0).iter().zip(expected) {
            assert_relative_eq!(*got, want);
        }
    }

    #[test]
    fn first_positive_solves_for_base_population() {
        let ver = calc_emissions(&rates(), &tables(), &[Reaction::N2FirstPositive]).unwrap();
        // loss = 0.25 / 0.25 + 0.75 / 0.5 = 2.5; p1pg at 100 km is 9.
        let n0 = 9.0 / 2.5;
        let expected = [0.25 * n0, 1.5 * n0, 0.75 * n0];
        for (got, want) in ver.ver.row(0).iter().zip(expected) {
            assert_relative_eq!(*got, want);
        }
    }

    #[test]
    fn request_order_does_not_matter() {
        let a = calc_emissions(
            &rates(),
            &tables(),
            &[Reaction::N2FirstPositive, Reaction::Atomic, Reaction::Metastable],
        )
        .unwrap();
        let b = calc_emissions(
            &rates(),
            &tables(),
            &[Reaction::Metastable, Reaction::Atomic, Reaction::N2FirstPositive, Reaction::Atomic],
        )
        .unwrap();
        assert_eq!(a.wavelength_nm, b.wavelength_nm);
        assert_eq!(a.ver, b.ver);
        assert_eq!(a.wavelength_nm.len(), 5 + 2 + 3);
        assert!(a.wavelength_nm.windows(2).into_iter().all(|w| w[0] <= w[1]));
    }

    #[test]
    fn bad_requests() {
        assert!(matches!(
            calc_emissions(&rates(), &tables(), &[]),
            Err(EmissionsError::NoReactionsRequested)
        ));

        let sparse = ExcitationRates::new(array![100.0, 110.0])
            .with_rate("po3p3p", array![1.0, 1.0])
            .unwrap();
        assert!(matches!(
            calc_emissions(&sparse, &tables(), &[Reaction::Atomic]),
            Err(EmissionsError::MissingRate(name)) if name == "po3p5p"
        ));
        assert!(matches!(
            sparse.clone().with_rate("p1ng", array![1.0]),
            Err(EmissionsError::RateLength { got: 1, expected: 2, .. })
        ));
    }
}
