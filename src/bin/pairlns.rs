use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use pairlns_lib::errors::Error;
use pairlns_lib::lns::{LogObserver, OptimizeParams, OptimizerOptions, SampleOptimizer};
use pairlns_lib::sample::{read_sample, to_json_string, write_sample, InitialSampler};
use pairlns_lib::{parser, ExternalSample, Instance};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Shrinks a pairwise-interaction sample of a feature model without losing
/// coverage, and reports a matching lower bound.
#[derive(Parser, Debug)]
#[command(name = "pairlns", version, about)]
struct Cli {
    /// Path to the feature model (FeatureIDE XML, DIMACS, or an archive
    /// wrapping either).
    #[arg(short, long)]
    file: PathBuf,

    /// Path to the initial sample (.csv or .json).
    #[arg(long, conflicts_with = "initial_sample_algorithm", required_unless_present = "initial_sample_algorithm")]
    initial_sample: Option<PathBuf>,

    /// Name of a registered initial-sample algorithm to run instead.
    #[arg(long)]
    initial_sample_algorithm: Option<String>,

    /// Time limit for the initial-sample algorithm in seconds.
    #[arg(long, default_value_t = 60.0)]
    initial_sample_timelimit: f64,

    /// Global time limit in seconds.
    #[arg(long, default_value_t = 900.0)]
    timelimit: f64,

    /// Time limit per LNS iteration in seconds.
    #[arg(long, default_value_t = 60.0)]
    iteration_timelimit: f64,

    /// Time limit per background CDS iteration in seconds.
    #[arg(long, default_value_t = 60.0)]
    cds_iteration_timelimit: f64,

    /// Maximum number of LNS iterations.
    #[arg(long, default_value_t = 10000)]
    max_iterations: usize,

    /// Random seed.
    #[arg(long, default_value_t = 0xC0FFEE)]
    seed: u64,

    /// Where to write the optimized sample (.csv or .json). Prints JSON to
    /// stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Registered initial-sample producers. The algorithms live outside this
/// crate; an empty registry means `--initial-sample-algorithm` cannot be
/// served.
fn samplers() -> Vec<Box<dyn InitialSampler>> {
    Vec::new()
}

fn initial_sample(cli: &Cli, instance: &Instance) -> Result<ExternalSample, Error> {
    if let Some(path) = &cli.initial_sample {
        return read_sample(path);
    }
    let name = cli
        .initial_sample_algorithm
        .as_deref()
        .expect("clap enforces one of the two options");
    let registry = samplers();
    let sampler = registry
        .iter()
        .find(|s| s.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            Error::MalformedInput(format!(
                "no initial-sample algorithm named '{name}' is registered"
            ))
        })?;
    sampler.sample(instance, cli.initial_sample_timelimit)
}

fn run(cli: &Cli) -> Result<(), Error> {
    let instance = parser::parse_file(&cli.file)?;
    let initial = initial_sample(cli, &instance)?;
    let initial_size = initial.len();

    let options = OptimizerOptions {
        seed: cli.seed,
        ..OptimizerOptions::default()
    };
    let mut optimizer =
        SampleOptimizer::new(instance, initial, Box::new(LogObserver), options)?;
    let params = OptimizeParams {
        iterations: cli.max_iterations,
        iteration_timelimit: cli.iteration_timelimit,
        cds_iteration_timelimit: cli.cds_iteration_timelimit,
        timelimit: cli.timelimit,
    };
    let optimal = optimizer.optimize(params)?;

    let sample = optimizer.best_sample(true)?;
    println!(
        "reduced initial sample of size {initial_size} to {}",
        sample.len()
    );
    println!(
        "proved lower bound is {}{}",
        optimizer.lower_bound(),
        if optimal { " (optimal)" } else { "" }
    );
    match &cli.output {
        Some(path) => write_sample(path, &sample, optimizer.instance())?,
        None => println!("{}", to_json_string(&sample)?),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // help and version are not configuration errors
            if error.use_stderr() {
                eprint!("{error}");
                return ExitCode::from(1);
            }
            print!("{error}");
            return ExitCode::SUCCESS;
        }
    };
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            eprintln!("error: {error}");
            match error {
                Error::MalformedInput(_)
                | Error::InconsistentModel(_)
                | Error::InfeasibleConfiguration(_)
                | Error::Io(_) => ExitCode::from(1),
                Error::CoverageMismatch
                | Error::InvariantViolation(_)
                | Error::Timeout
                | Error::SolverUnknown => ExitCode::from(2),
            }
        }
    }
}
