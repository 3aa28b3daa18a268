use std::{path::PathBuf, thread::scope};

use clap::{AppSettings, ArgEnum, Parser, Subcommand};
use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::prelude::*;

use gridaurora::{
    altitude::{glow_altitudes, setupz},
    eigen::{beams_used, BeamEnergies, EigenprofileAccumulator},
    emissions::{calc_emissions, Reaction},
    energy_grid::{load_csv, load_regress, make_bins},
    flux::{dip_ratio, ellison_ramaty, fluxgen, maxwellian, total_flux, FluxSpectrum, StricklandParams},
    geo::solar_zenith_angle,
    indices::RecentIndices,
    io::{
        read_excitation_rates, read_reaction_tables, read_system_components, read_transmittance,
        read_ver, read_ver_beam_energy, write_eigenprofiles, EigenprofileExtras, write_energy_bins, write_flux,
        write_system_t, write_transmittance, write_ver,
    },
    numeric::{linspace, logspace},
    optical::OpticalFilter,
    time::{datetime2yd, datetime2yeardec, parse_datetime, to_ut1_unix},
    transmittance::{
        filter_product, get_system_t, AtmosphereModel, Extrapolation, SystemComponents,
        SystemTransmittance, Tabulated, TransmittanceCurve, Transparent,
    },
    GridAuroraError,
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences), global = true)]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long, global = true)]
    no_progress_bars: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate precipitating electron flux spectra.
    Flux(FluxArgs),

    /// Combine filter, window, QE and atmosphere into system transmittance.
    Transmittance(TransmittanceArgs),

    /// Multiply several filter curves into a single curve.
    FilterProduct(FilterProductArgs),

    /// Turn excitation rates into a volume emission rate spectrum.
    Emissions(EmissionsArgs),

    /// Reduce per-beam VER files into eigenprofiles.
    Eigen(EigenArgs),

    /// Unit-flux energy bins from an energy grid CSV.
    EnergyBins(EnergyBinsArgs),

    /// Print an altitude grid.
    Zgrid(ZgridArgs),

    /// Print solar geometry and geophysical indices for a time and place.
    Sun(SunArgs),
}

#[derive(ArgEnum, Clone, Copy, Debug)]
enum FluxModel {
    Maxwellian,
    Strickland,
    EllisonRamaty,
}

#[derive(ArgEnum, Clone, Copy, Debug)]
enum ExtrapolationArg {
    Error,
    Nan,
    Clamp,
}

impl From<ExtrapolationArg> for Extrapolation {
    fn from(e: ExtrapolationArg) -> Self {
        match e {
            ExtrapolationArg::Error => Extrapolation::Error,
            ExtrapolationArg::Nan => Extrapolation::Nan,
            ExtrapolationArg::Clamp => Extrapolation::Clamp,
        }
    }
}

#[derive(clap::Args)]
struct FluxArgs {
    #[clap(long, arg_enum, default_value = "strickland")]
    model: FluxModel,

    /// Characteristic energies [eV]. Defaults to the Strickland 1993 set.
    #[clap(long, multiple_values(true))]
    e0: Option<Vec<f64>>,

    /// Flux coefficient(s) Q0; one value, or one per E0.
    #[clap(long, multiple_values(true))]
    q0: Option<Vec<f64>>,

    /// Ellison-Ramaty power-law index gamma.
    #[clap(long, multiple_values(true), allow_hyphen_values = true, default_value = "-1")]
    gamma: Vec<f64>,

    /// Ellison-Ramaty cutoff sharpness kappa.
    #[clap(long, multiple_values(true), default_value = "1")]
    kappa: Vec<f64>,

    /// Ellison-Ramaty scale C0.
    #[clap(long, multiple_values(true), default_value = "1e12")]
    c0: Vec<f64>,

    #[clap(long, default_value = "1")]
    energy_min: f64,

    #[clap(long, default_value = "1e5")]
    energy_max: f64,

    #[clap(long, default_value = "1000")]
    num_energies: usize,

    /// Log the depth of the dip below E0 of each Strickland spectrum.
    #[clap(long)]
    dip: bool,

    #[clap(short, long)]
    output: PathBuf,
}

/// Files describing the optical system.
#[derive(clap::Args)]
struct SystemArgs {
    /// Filter curve (LAMBDA and T columns).
    #[clap(long)]
    bg3: PathBuf,

    /// Sensor window curve.
    #[clap(long)]
    window: PathBuf,

    /// Sensor quantum efficiency (LAMBDA and QE columns).
    #[clap(long)]
    qe: PathBuf,

    /// Precomputed atmospheric transmittance. Without one the atmosphere is
    /// transparent.
    #[clap(long)]
    atmosphere: Option<PathBuf>,

    /// Observer altitude [km].
    #[clap(long, default_value = "0")]
    obs_alt_km: f64,

    /// Observer zenith angle [deg].
    #[clap(long, default_value = "0")]
    zenith_deg: f64,

    /// What to do with wavelengths outside the tabulated curves.
    #[clap(long, arg_enum, default_value = "error")]
    extrapolation: ExtrapolationArg,
}

#[derive(clap::Args)]
struct TransmittanceArgs {
    #[clap(flatten)]
    system: SystemArgs,

    #[clap(long, default_value = "200")]
    lambda_min: f64,

    #[clap(long, default_value = "1000")]
    lambda_max: f64,

    #[clap(long, default_value = "801")]
    num_lambda: usize,

    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct FilterProductArgs {
    /// The filter curves to multiply.
    #[clap(required = true)]
    curves: Vec<PathBuf>,

    #[clap(long, default_value = "200")]
    lambda_min: f64,

    #[clap(long, default_value = "1000")]
    lambda_max: f64,

    #[clap(long, default_value = "801")]
    num_lambda: usize,

    #[clap(long, arg_enum, default_value = "error")]
    extrapolation: ExtrapolationArg,

    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct EmissionsArgs {
    /// Excitation rates (an ALT_KM column plus one column per species).
    #[clap(long)]
    rates: PathBuf,

    /// Spectroscopic constants.
    #[clap(long)]
    tables: PathBuf,

    /// Reactions to include. Defaults to all of them.
    #[clap(long, multiple_values(true))]
    reactions: Option<Vec<Reaction>>,

    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct EigenArgs {
    /// Per-beam VER files; each carries its beam energy in the ENERGY key.
    #[clap(required = true)]
    ver: Vec<PathBuf>,

    #[clap(flatten)]
    system: SystemArgs,

    /// bg3 or none.
    #[clap(long, parse(from_str), default_value = "bg3")]
    filter: OpticalFilter,

    /// Drop beams below --min-beam-ev.
    #[clap(long)]
    zero_unused: bool,

    #[clap(long, default_value = "0")]
    min_beam_ev: f64,

    /// Beam energy table, for the bin edges written alongside the profiles.
    #[clap(long)]
    energies: Option<PathBuf>,

    /// Simulation time, ISO-8601 or Unix seconds, recorded as UT1_UNIX.
    #[clap(long)]
    time: Option<String>,

    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct EnergyBinsArgs {
    /// Rows of E1, E2, pr1, pr2.
    grid: PathBuf,

    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct ZgridArgs {
    /// Print the GLOW model grid instead.
    #[clap(long)]
    glow: bool,

    #[clap(long, default_value = "250")]
    np: usize,

    #[clap(long, default_value = "90")]
    zmin: f64,

    #[clap(long, default_value = "1.5")]
    gridmin: f64,

    #[clap(long, default_value = "10.575")]
    gridmax: f64,
}

#[derive(clap::Args)]
struct SunArgs {
    /// ISO-8601 time; without an offset it's UTC.
    #[clap(long)]
    time: String,

    /// Geodetic latitude [deg].
    #[clap(long, allow_hyphen_values = true)]
    glat: f64,

    /// Geodetic longitude [deg].
    #[clap(long, allow_hyphen_values = true)]
    glon: f64,

    /// NOAA SWPC RecentIndices.txt.
    #[clap(long)]
    indices: Option<PathBuf>,
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), GridAuroraError> {
    let args = Args::parse();
    setup_logging(args.verbosity);

    match args.command {
        Command::Flux(a) => flux(a),
        Command::Transmittance(a) => transmittance(a),
        Command::FilterProduct(a) => product(a),
        Command::Emissions(a) => emissions(a),
        Command::Eigen(a) => eigen(a, args.no_progress_bars),
        Command::EnergyBins(a) => energy_bins(a),
        Command::Zgrid(a) => zgrid(a),
        Command::Sun(a) => sun(a),
    }
}

fn flux(args: FluxArgs) -> Result<(), GridAuroraError> {
    let energy = logspace(
        args.energy_min.log10(),
        args.energy_max.log10(),
        args.num_energies,
    );
    let e0 = args
        .e0
        .unwrap_or_else(|| StricklandParams::DEFAULT_E0_EV.to_vec());
    info!("Flux model {:?} for E0 = {e0:?} eV", args.model);

    let spectrum = match args.model {
        FluxModel::Maxwellian => {
            maxwellian(energy.view(), &e0, &args.q0.unwrap_or_else(|| vec![1e12]))?
        }

        FluxModel::Strickland => {
            let mut params = StricklandParams::dispersive_alfven();
            if let Some(q0) = args.q0 {
                params.q0 = q0;
            }
            let components = fluxgen(energy.view(), &e0, &params)?;
            if args.dip {
                let dips = dip_ratio(
                    components.spectrum.diff_num_flux.view(),
                    &components.e0_indices,
                );
                for (e0, dip) in e0.iter().zip(dips) {
                    debug!("E0 {e0} eV: dip ratio {dip:.3}");
                }
            }
            components.spectrum
        }

        FluxModel::EllisonRamaty => {
            let phi = ellison_ramaty(energy.view(), &e0, &args.gamma, &args.kappa, &args.c0)?;
            let total_flux = total_flux(energy.view(), phi.view())?;
            info!("total Ellison-Ramaty flux Q: {total_flux}");
            // Broadcasting may give more columns than E0 values.
            let e0_ev = if e0.len() == phi.ncols() {
                Array1::from(e0)
            } else {
                Array1::from_elem(phi.ncols(), e0[0])
            };
            FluxSpectrum {
                energy_ev: energy,
                e0_ev,
                diff_num_flux: phi,
                total_flux,
            }
        }
    };

    write_flux(&args.output, &spectrum)?;
    Ok(())
}

fn atmosphere_model(system: &SystemArgs) -> Result<Box<dyn AtmosphereModel>, GridAuroraError> {
    Ok(match &system.atmosphere {
        Some(file) => Box::new(Tabulated::new(
            read_transmittance(file)?,
            system.obs_alt_km,
            system.zenith_deg,
        )),
        None => Box::new(Transparent),
    })
}

fn system_transmittance(
    system: &SystemArgs,
    lambda: &[f64],
) -> Result<SystemTransmittance, GridAuroraError> {
    let components: SystemComponents =
        read_system_components(&system.bg3, &system.window, &system.qe)?;
    let atmosphere = atmosphere_model(system)?;
    Ok(get_system_t(
        lambda,
        &components,
        atmosphere.as_ref(),
        system.obs_alt_km,
        system.zenith_deg,
        system.extrapolation.into(),
    )?)
}

fn transmittance(args: TransmittanceArgs) -> Result<(), GridAuroraError> {
    let lambda = linspace(args.lambda_min, args.lambda_max, args.num_lambda);
    let system_t = system_transmittance(&args.system, lambda.as_slice().unwrap_or(&[]))?;
    write_system_t(&args.output, &system_t)?;
    Ok(())
}

fn product(args: FilterProductArgs) -> Result<(), GridAuroraError> {
    let lambda = linspace(args.lambda_min, args.lambda_max, args.num_lambda).to_vec();
    let curves = args
        .curves
        .iter()
        .map(read_transmittance)
        .collect::<Result<Vec<_>, _>>()?;
    let product = filter_product(
        &curves.iter().collect::<Vec<_>>(),
        &lambda,
        args.extrapolation.into(),
    )?;

    // Values outside the curves are NaN under --extrapolation nan.
    let (lambda, values): (Vec<f64>, Vec<f64>) = lambda
        .into_iter()
        .zip(product)
        .filter(|(_, t)| t.is_finite())
        .unzip();
    let source = args.curves.iter().map(|c| c.display()).join(" x ");
    write_transmittance(
        &args.output,
        &TransmittanceCurve::new(lambda, values)?,
        "T",
        Some(&source),
    )?;
    Ok(())
}

fn emissions(args: EmissionsArgs) -> Result<(), GridAuroraError> {
    let rates = read_excitation_rates(&args.rates)?;
    let tables = read_reaction_tables(&args.tables)?;
    let reactions = args.reactions.unwrap_or_else(|| Reaction::ALL.to_vec());
    info!("Reactions: {}", reactions.iter().join(", "));

    let ver = calc_emissions(&rates, &tables, &reactions)?;
    info!(
        "{} emission lines, total brightness {:.3e} photons cm^-2 s^-1",
        ver.wavelength_nm.len(),
        ver.brightness.sum()
    );
    write_ver(&args.output, &ver)?;
    Ok(())
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    ProgressBar::new(len as _)
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} beams ({elapsed_precise}<{eta_precise})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message(message)
}

fn eigen(args: EigenArgs, no_progress_bars: bool) -> Result<(), GridAuroraError> {
    let ut1_unix = args
        .time
        .as_deref()
        .map(|t| match t.parse::<f64>() {
            Ok(unix) => to_ut1_unix(unix),
            Err(_) => to_ut1_unix(t),
        })
        .transpose()?
        .map(|t| array![t]);
    let mut beams = args
        .ver
        .iter()
        .map(|f| Ok((read_ver_beam_energy(f)?, f.clone())))
        .collect::<Result<Vec<(f64, PathBuf)>, GridAuroraError>>()?;
    beams.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    let ek: Vec<f64> = beams.iter().map(|(e, _)| *e).collect();
    let lowest = beams_used(args.zero_unused, &ek, args.min_beam_ev);
    let beams = &beams[lowest..];
    info!(
        "Using {} of {} beams, {} to {} eV",
        beams.len(),
        ek.len(),
        ek[lowest],
        ek[ek.len() - 1]
    );

    // Every beam shares the first beam's wavelengths.
    let first = read_ver(&beams[0].1)?;
    let lambda = first.wavelength_nm.to_vec();
    let system_t = system_transmittance(&args.system, &lambda)?;
    info!("Optical filter: {}", args.filter);

    let (tx, rx) = bounded(5);
    let error = AtomicCell::new(false);
    let multi_progress = MultiProgress::with_draw_target(if no_progress_bars {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stdout()
    });
    let read_progress = multi_progress.add(progress_bar(beams.len(), "Reading"));
    let reduce_progress = multi_progress.add(progress_bar(beams.len(), "Reducing"));
    read_progress.tick();
    reduce_progress.tick();

    let eig = scope(|s| {
        let error = &error;
        let read_progress = &read_progress;
        s.spawn(move || {
            for (energy, file) in beams {
                if error.load() {
                    break;
                }
                debug!("Reading beam {energy} eV from {}", file.display());
                match read_ver(file) {
                    Ok(ver) => {
                        // The receiver hangs up on error.
                        if tx.send((*energy, ver)).is_err() {
                            break;
                        }
                    }
                    Err(e) => info!("skipped reading beam {energy} eV: {e}"),
                }
                read_progress.inc(1);
            }
            read_progress.abandon_with_message("Finished reading");
        });

        let mut acc = EigenprofileAccumulator::new(&system_t, args.filter);
        for (energy, ver) in rx {
            if let Err(e) = acc.add(energy, &ver) {
                error.store(true);
                return Err(e);
            }
            reduce_progress.inc(1);
        }
        reduce_progress.abandon_with_message("Finished reducing");
        Ok(acc.finish())
    })?;

    match eig {
        Some(eig) => {
            let edges = args
                .energies
                .as_ref()
                .map(BeamEnergies::from_csv)
                .transpose()?
                .map(|b| b.ek_pcolor);
            write_eigenprofiles(
                &args.output,
                &eig,
                EigenprofileExtras {
                    ek_pcolor: edges.as_ref().map(|e| e.view()),
                    ut1_unix: ut1_unix.as_ref().map(|t| t.view()),
                    ..Default::default()
                },
            )?;
        }
        None => warn!("No beams could be read; nothing written"),
    }
    Ok(())
}

fn energy_bins(args: EnergyBinsArgs) -> Result<(), GridAuroraError> {
    let grid = load_regress(load_csv(&args.grid)?.view())?;
    let bins = make_bins(grid.view())?;
    info!(
        "{} energy bins, {:.1} to {:.1} eV",
        bins.low.len(),
        bins.low[0],
        bins.high[bins.high.len() - 1]
    );
    write_energy_bins(&args.output, &bins)?;
    Ok(())
}

fn zgrid(args: ZgridArgs) -> Result<(), GridAuroraError> {
    let z = if args.glow {
        Array1::from(glow_altitudes().to_vec())
    } else {
        setupz(args.np, args.zmin, args.gridmin, args.gridmax)?
    };
    println!("{}", z.iter().map(|z| format!("{z:.3}")).join(" "));
    Ok(())
}

fn sun(args: SunArgs) -> Result<(), GridAuroraError> {
    let t = parse_datetime(&args.time)?;
    let (yd, utsec) = datetime2yd(t);
    println!("yyyyddd {yd}, UT seconds {utsec:.1}");
    println!("decimal year {:.6}", datetime2yeardec(t));
    println!("unix seconds {:.3}", to_ut1_unix(t)?);
    println!(
        "solar zenith angle {:.3} deg",
        solar_zenith_angle(t, args.glat, args.glon)
    );
    if let Some(file) = &args.indices {
        let ind = RecentIndices::from_file(file)?.at(t)?;
        println!(
            "F10.7 {} (smoothed {}), Ap {} (smoothed {})",
            ind.f107_observed, ind.f107_smoothed, ind.ap_observed, ind.ap_smoothed
        );
    }
    Ok(())
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn eigen_args_with_tabulated_atmosphere() {
        let dir = tempdir().unwrap();
        let curve = TransmittanceCurve::new(vec![400.0, 700.0], vec![0.5, 0.8]).unwrap();
        let atm = dir.path().join("atm.fits");
        write_transmittance(&atm, &curve, "T", None).unwrap();

        let args = Args::try_parse_from([
            "gridaurora",
            "eigen",
            "beam1.fits",
            "--bg3",
            "bg3.fits",
            "--window",
            "window.fits",
            "--qe",
            "qe.fits",
            "--atmosphere",
            atm.to_str().unwrap(),
            "--time",
            "2015-07-01T00:00:00-0800",
            "-o",
            "eig.fits",
        ])
        .unwrap();
        let eigen_args = match args.command {
            Command::Eigen(a) => a,
            _ => panic!("expected the eigen subcommand"),
        };
        assert_eq!(eigen_args.time.as_deref(), Some("2015-07-01T00:00:00-0800"));

        let model = atmosphere_model(&eigen_args.system).unwrap();
        assert_eq!(model.name(), "tabulated");
        let components = SystemComponents {
            bg3: curve.clone(),
            window: curve.clone(),
            qe: curve,
        };
        let t = get_system_t(&[500.0], &components, model.as_ref(), 0.0, 0.0, Extrapolation::Error)
            .unwrap();
        assert!(t.atm[0] > 0.5 && t.atm[0] < 0.8);
    }
}
