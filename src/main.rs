//! Burnin CLI Entry Point
//!
//! Runs a burn-in from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Two hour matmul burn-in on 4 lanes (the defaults)
//! burnin
//!
//! # Short training run sampling every second
//! burnin --duration 10m --workload training --sample-interval 1s
//!
//! # Settings from a file, with one flag on top
//! burnin --config burnin.yaml --lanes 16
//! ```
//!
//! Ctrl-C stops the run early; a partial report is still written.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info, warn};

use burnin::config::{format_duration, load_config, ConfigError, RunConfig};
use burnin::execution::{CancelReason, Harness, HarnessError};
use burnin::report::{ChartRenderer, ConsoleRenderer, JsonRenderer, MultiRenderer};
use burnin::{APP_NAME, VERSION};

/// What the command line asked for.
#[derive(Debug, PartialEq)]
enum CliAction {
    Run(CliArgs),
    Help,
    Version,
}

/// Command-line settings before they are layered onto the config.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config_path: Option<PathBuf>,
    overrides: Vec<(String, String)>,
    no_chart: bool,
    verbose: bool,
}

/// Flags that take a value and map straight onto a config setting.
const VALUE_FLAGS: &[&str] = &[
    "duration",
    "lanes",
    "sample-interval",
    "status-every",
    "probe",
    "workload",
    "matrix-size",
    "device",
    "output-dir",
];

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Compute & Resource Burn-in Harness");
    println!();
}

/// Prints usage information.
fn print_usage() {
    let defaults = RunConfig::default();

    println!("Usage: burnin [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --duration D         Wall-clock budget, e.g. 30s, 10m, 2h (default: {})", format_duration(defaults.duration));
    println!("  --lanes N            Concurrent workload lanes (default: {})", defaults.lanes);
    println!("  --sample-interval D  Resource sampling cadence (default: {})", format_duration(defaults.sample_interval));
    println!("  --status-every N     Status line every N iterations, 0 = off (default: {})", defaults.status_every);
    println!("  --probe P            system | accelerator | all (default: {})", defaults.probe);
    println!("  --workload W         matmul | training (default: {})", defaults.workload);
    println!("  --matrix-size N      Matrix edge length for matmul (default: {})", defaults.matrix_size);
    println!("  --device N           GPU index for the accelerator probe (default: {})", defaults.accelerator_device);
    println!("  --output-dir PATH    Where reports are written (default: {})", defaults.output_dir.display());
    println!("  --no-chart           Skip the ASCII resource chart");
    println!("  --config FILE        Load settings from a YAML file");
    println!("  --verbose            Enable debug logging");
    println!("  --help               Show this help message");
    println!("  --version            Show version information");
    println!();
    println!("Examples:");
    println!("  burnin --duration 10m --lanes 8");
    println!("  burnin --workload training --probe system --no-chart");
    println!("  burnin --config burnin.yaml --duration 30s");
}

/// Parses command-line arguments.
///
/// Value flags accept both `--flag value` and `--flag=value`.
fn parse_arguments(args: &[String]) -> Result<CliAction, String> {
    let mut cli = CliArgs::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };

        match flag {
            "--help" | "-h" => return Ok(CliAction::Help),
            "--version" | "-V" => return Ok(CliAction::Version),
            "--verbose" | "-v" => cli.verbose = true,
            "--no-chart" => cli.no_chart = true,
            "--config" => {
                let value = take_value(args, &mut i, flag, inline_value)?;
                cli.config_path = Some(PathBuf::from(value));
            }
            long if long.starts_with("--") && VALUE_FLAGS.contains(&&long[2..]) => {
                let value = take_value(args, &mut i, long, inline_value)?;
                cli.overrides.push((long[2..].to_string(), value));
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            other => return Err(format!("Unexpected argument: {}", other)),
        }
        i += 1;
    }

    Ok(CliAction::Run(cli))
}

fn take_value(
    args: &[String],
    i: &mut usize,
    flag: &str,
    inline_value: Option<String>,
) -> Result<String, String> {
    if let Some(value) = inline_value {
        return Ok(value);
    }
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// Layers defaults, the optional config file and command-line flags.
fn build_config(cli: &CliArgs) -> Result<RunConfig, ConfigError> {
    let mut config = match &cli.config_path {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };

    for (key, value) in &cli.overrides {
        config.set(key, value)?;
    }
    if cli.no_chart {
        config.chart = false;
    }

    config.validate()?;
    Ok(config)
}

/// Main application entry point.
async fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let cli = match parse_arguments(&args) {
        Ok(CliAction::Run(cli)) => cli,
        Ok(CliAction::Help) => {
            print_usage();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("{} {}", APP_NAME, VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return Err(e.into());
        }
    };

    setup_logging(cli.verbose);
    print_banner();

    let config = build_config(&cli).map_err(|e| {
        error!("Configuration error: {}", e);
        HarnessError::from(e)
    })?;

    info!(
        "Configuration: {} for {} on {} lane(s), sampling '{}' every {}",
        config.workload,
        format_duration(config.duration),
        config.lanes,
        config.probe,
        format_duration(config.sample_interval)
    );

    // Bind collaborators before any thread starts
    let workload = config.workload.build(config.matrix_size).map_err(HarnessError::from)?;
    let probe = config
        .probe
        .build(config.accelerator_device)
        .map_err(HarnessError::from)?;

    let mut renderer = MultiRenderer::new()
        .with(ConsoleRenderer)
        .with(JsonRenderer::new(&config.output_dir));
    if config.chart {
        renderer = renderer.with(ChartRenderer::new(&config.output_dir));
    }

    let harness = Harness::new(config.to_harness_options());
    let interrupt = harness.interrupt_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && interrupt.cancel(CancelReason::Interrupt) {
            warn!("Interrupt received - finishing in-flight steps");
        }
    });

    let report = tokio::task::spawn_blocking(move || harness.run(workload, probe, &renderer))
        .await??;

    if report.is_partial() {
        info!("Partial report written ({} s elapsed)", report.duration_elapsed.as_secs());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
