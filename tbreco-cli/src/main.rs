//! tbreco command-line interface.
//!
//! Reconstructs hits from test-beam event files.
#![allow(clippy::cast_precision_loss)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tbreco_core::{parse_vga, GainLevel, GainSetting, QualityCuts};
use tbreco_fit::{ReconstructionPipeline, ReconstructionStatistics, ShapeFitter};
use tbreco_io::{EventFileReader, HitFileWriter, RunConfig, TableMapper};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    TbrecoIo(#[from] tbreco_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] tbreco_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

/// Amplifier gain level.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Gain {
    Low,
    Mid,
    High,
    Vhigh,
}

impl From<Gain> for GainLevel {
    fn from(gain: Gain) -> Self {
        match gain {
            Gain::Low => GainLevel::Low,
            Gain::Mid => GainLevel::Mid,
            Gain::High => GainLevel::High,
            Gain::Vhigh => GainLevel::VHigh,
        }
    }
}

/// Gain setting given on the command line.
#[derive(Args, Debug, Clone)]
struct GainArgs {
    /// PGA gain level
    #[arg(long, value_enum)]
    pga: Option<Gain>,

    /// LNA gain level
    #[arg(long, value_enum)]
    lna: Option<Gain>,

    /// VGA register value in hexadecimal (e.g. 300 or 0x300)
    #[arg(long)]
    vga: Option<String>,
}

impl GainArgs {
    /// The gain setting, if all three parts were given.
    fn setting(&self) -> Result<Option<GainSetting>> {
        match (self.pga, self.lna, &self.vga) {
            (None, None, None) => Ok(None),
            (Some(pga), Some(lna), Some(vga)) => Ok(Some(GainSetting::new(
                pga.into(),
                lna.into(),
                parse_vga(vga)?,
            ))),
            _ => Err(CliError::Usage(
                "--pga, --lna and --vga must be given together".into(),
            )),
        }
    }
}

/// Test-beam waveform to hit reconstruction.
#[derive(Parser)]
#[command(name = "tbreco")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct, calibrate and classify hits from event files
    Reconstruct {
        /// Input event file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,

        /// Channel map file
        #[arg(short, long)]
        mapping: PathBuf,

        /// Run configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Zero-suppression threshold in units of the noise
        #[arg(long)]
        zs_threshold: Option<f64>,

        /// Skip pulse fitting
        #[arg(long)]
        skip_fit: bool,

        /// Worker threads (defaults to the number of cores)
        #[arg(short, long)]
        threads: Option<usize>,

        #[command(flatten)]
        gains: GainArgs,
    },

    /// Show information about event files
    Info {
        /// Input event file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Print the quality cut table
    Cuts {
        /// Run configuration file with cut overrides
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        gains: GainArgs,
    },
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => {
            debug!("Loading run configuration from {}", path.display());
            Ok(RunConfig::from_file(path)?)
        }
        None => Ok(RunConfig::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn reconstruct(
    input: &[PathBuf],
    output: &Path,
    mapping: &Path,
    config: Option<&Path>,
    zs_threshold: Option<f64>,
    skip_fit: bool,
    threads: Option<usize>,
    gains: &GainArgs,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(threshold) = zs_threshold {
        config.reconstruction.zs_threshold = threshold;
    }
    if skip_fit {
        config.reconstruction.skip_fit = true;
    }
    if let Some(setting) = gains.setting()? {
        config.gains = Some(setting);
    }
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let mapper = TableMapper::from_file(mapping)?;
    info!(
        "Zero-suppression threshold {}, fitting {}",
        config.reconstruction.zs_threshold,
        if config.reconstruction.skip_fit {
            "disabled"
        } else {
            "enabled"
        }
    );
    match config.gains {
        Some(gains) => info!("Gain setting {gains}"),
        None => warn!("No gain setting given; every hit is classified good"),
    }

    let mut pipeline = ReconstructionPipeline::new(
        ShapeFitter::with_config(config.fit)?,
        config.reconstruction,
    )
    .with_cuts(config.cuts);
    if let Some(table) = config.calibration {
        pipeline = pipeline.with_calibration(table);
    }
    if let Some(gains) = config.gains {
        pipeline = pipeline.with_gains(gains);
    }

    let start = Instant::now();
    let mut writer = HitFileWriter::create(output)?;
    let mut stats = ReconstructionStatistics::default();
    let mut events = 0usize;

    for path in input {
        info!("Reading: {}", path.display());
        let reader = EventFileReader::open(path)?;
        let mut file_events = 0usize;
        for event in reader.events() {
            let event = event?;
            let hits = pipeline.process_event(&event.channels, &mut stats)?;
            writer.write_event(event.event, &hits, &mapper)?;
            file_events += 1;
        }
        debug!("  {file_events} events");
        events += file_events;
    }
    writer.flush()?;

    let elapsed = start.elapsed();
    println!(
        "Processed {} events from {} files in {:.2}s",
        events,
        input.len(),
        elapsed.as_secs_f64()
    );
    println!("Hits: {}", stats.total);
    println!("  fitted:          {}", stats.clean);
    println!("  zero-suppressed: {}", stats.zero_suppressed);
    println!("  poor fit:        {}", stats.poor_fit);
    println!("  not fitted:      {}", stats.no_fit);
    println!("  good:            {}", stats.good);
    println!("Rows written: {} ({} unmapped)", writer.rows(), writer.unmapped());
    println!("Output: {}", output.display());
    Ok(())
}

fn show_info(input: &[PathBuf]) -> Result<()> {
    for path in input {
        let reader = EventFileReader::open(path)?;
        let file_size = reader.file_size();

        let mut events = 0usize;
        let mut channels = 0usize;
        let mut first: Option<u64> = None;
        let mut last: Option<u64> = None;
        let mut spills = std::collections::BTreeSet::new();
        for event in reader.events() {
            let event = event?;
            events += 1;
            channels += event.channels.len();
            spills.insert(event.spill);
            let ts = event.timestamp.as_u64();
            first = Some(first.map_or(ts, |f| f.min(ts)));
            last = Some(last.map_or(ts, |l| l.max(ts)));
        }

        println!("File: {}", path.display());
        println!(
            "Size: {} bytes ({:.2} MB)",
            file_size,
            file_size as f64 / 1_000_000.0
        );
        println!("Events: {events}");
        println!("Channel samples: {channels}");
        println!("Spills: {}", spills.len());
        if let (Some(first), Some(last)) = (first, last) {
            println!("Timestamp range: {first} - {last}");
        }
    }
    Ok(())
}

fn print_cuts(config: Option<&Path>, gains: &GainArgs) -> Result<()> {
    let cuts: QualityCuts = load_config(config)?.cuts;
    match gains.setting()? {
        Some(setting) => match cuts.get(&setting) {
            Some(cut) => println!(
                "{setting}: amplitude < {}, chi2/ndof < {}",
                cut.max_amplitude, cut.max_chi2_per_ndof
            ),
            None => println!("{setting}: no cut defined, every pulse passes"),
        },
        None => {
            println!(
                "{:<6} {:<6} {:<5} | {:>13} | {:>13}",
                "PGA", "LNA", "VGA", "max amplitude", "max chi2/ndof"
            );
            println!("{:-<52}", "");
            for (setting, cut) in cuts.entries() {
                println!(
                    "{:<6} {:<6} {:<5x} | {:>13} | {:>13}",
                    setting.pga.as_str(),
                    setting.lna.as_str(),
                    setting.vga,
                    cut.max_amplitude,
                    cut.max_chi2_per_ndof
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Reconstruct {
            input,
            output,
            mapping,
            config,
            zs_threshold,
            skip_fit,
            threads,
            gains,
        } => reconstruct(
            &input,
            &output,
            &mapping,
            config.as_deref(),
            zs_threshold,
            skip_fit,
            threads,
            &gains,
        ),
        Commands::Info { input } => show_info(&input),
        Commands::Cuts { config, gains } => print_cuts(config.as_deref(), &gains),
    }
}
