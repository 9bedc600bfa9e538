#![forbid(unsafe_code)]

mod output;

use anyhow::{Context, bail};
use clap::Parser;
use logtally_core::config::{self, ErrorPolicy, TallyConfig};
use logtally_core::{RunSummary, TallyError, tally_dir};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status when the run completed but some lines or files were skipped.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "logtally",
    author,
    version,
    about = "logtally: per-day request validity counts over NDJSON logs",
    long_about = None,
    after_help = "EXAMPLES:\n    # Count every log file in a directory\n    logtally /var/log/requests\n\n    # Use every CPU and emit JSON\n    logtally --parallel --json /var/log/requests\n\n    # Skip malformed lines instead of aborting\n    logtally --keep-going /var/log/requests"
)]
struct Cli {
    /// Directory of log files. Falls back to `source_dir` from the config file.
    dir: Option<PathBuf>,

    /// Worker threads. `0` means one per available CPU.
    #[arg(short = 'j', long, value_name = "N", conflicts_with = "parallel")]
    workers: Option<usize>,

    /// Use one worker per available CPU.
    #[arg(long)]
    parallel: bool,

    /// Skip malformed lines and unreadable files instead of aborting.
    #[arg(long)]
    keep_going: bool,

    /// Output format.
    #[arg(long, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, hide = true)]
    json: bool,

    /// Config file (default: `<config dir>/logtally/config.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    /// Load the config file and apply flag overrides on top.
    fn resolve_config(&self) -> anyhow::Result<TallyConfig> {
        let mut cfg = match self.config {
            Some(ref path) => config::load_config(path)?,
            None => config::load_user_config()?,
        };
        self.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut TallyConfig) {
        if let Some(ref dir) = self.dir {
            cfg.source_dir = Some(dir.clone());
        }
        if self.parallel {
            cfg.workers = 0;
        } else if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        if self.keep_going {
            cfg.error_policy = ErrorPolicy::Isolate;
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("LOGTALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "logtally=debug,info"
        } else {
            "logtally=info,warn"
        })
    });

    let format = env::var("LOGTALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<RunSummary> {
    let cfg = cli.resolve_config()?;
    let Some(ref dir) = cfg.source_dir else {
        bail!("no log directory given; pass <DIR> or set source_dir in the config file");
    };
    debug!(
        dir = %dir.display(),
        workers = cfg.resolved_workers().get(),
        policy = ?cfg.error_policy,
        "starting run"
    );

    let summary = tally_dir(dir, &cfg)?;
    output::render_summary(output, &summary).context("Failed to write report")?;
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(&cli, output) {
        Ok(summary) if summary.failures.is_empty() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_PARTIAL),
        Err(err) => {
            let cli_error = err
                .downcast_ref::<TallyError>()
                .map_or_else(|| CliError::new(format!("{err:#}")), CliError::from);
            if output::render_error(output, &cli_error).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
