use clap::Parser;
use log::{info, LevelFilter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};
use townvillage::config::{load_parameters, SimulationConfig};
use townvillage::metrics::CsvSink;
use townvillage::{logging, Result, Runner};

/// Stochastic town and village epidemic simulator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Parameter file; `.json` files are read as JSON, anything else as text
    params: PathBuf,

    /// Prefix for every output file
    #[arg(default_value = "output/outfile")]
    output: PathBuf,

    /// Random seed; overrides the `seed` option
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn run(args: Args) -> Result<()> {
    let _handle = logging::init(args.log_level, Some(&with_suffix(&args.output, "_log")))?;
    info!("reading parameters from {}", args.params.display());

    let source = load_parameters(&args.params)?;
    let config = SimulationConfig::from_source(source.as_ref())?;
    let seed = args.seed.or(config.run.seed).unwrap_or_else(clock_seed);
    info!("seed = {}", seed);

    let mut sink = CsvSink::create(&args.output)?;
    let mut runner = Runner::new(config, seed).with_progress(!args.quiet);
    runner.run_batch(&mut sink)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
