//! `catt`: CVP2 authentication test tool.
//!
//! Runs the standard CVP2 scenarios against a server and prints a verdict
//! per case. Exit status: 0 when every case passed or was skipped, 1 when
//! any case failed, 2 when nothing failed but the test environment is
//! broken, 3 when the run could not be set up (bad arguments or config) or
//! the report could not be written.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use catt_core::config::DEFAULT_CONFIG_FILE;
use catt_core::report::{EXIT_OK, EXIT_SETUP};
use catt_core::{
    CattConfig, EvidenceExtractor, HandshakeTarget, ProcessRunner, STANDARD_SCENARIOS,
    SuiteEvent, SuiteRunner, SuiteSettings, render_case_header, render_case_outcome,
    render_summary,
};
use clap::Parser;
use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// CVP2 Authentication Test Tool.
#[derive(Parser, Debug)]
#[command(name = "catt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host to test.
    #[arg(long)]
    host: String,

    /// Port to connect to.
    #[arg(long, short = 'p', default_value_t = HandshakeTarget::DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Path to the TOML config file.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Absolute path to request on the server.
    #[arg(long, default_value = "/")]
    path: String,

    /// Show every handshake client command line.
    #[arg(long, short = 'd')]
    debug: bool,

    /// Seconds to wait for each handshake (overrides `main.timeout_secs`).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Directory for per-case logs (overrides `main.log_path`).
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write a JSON Lines report here.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run only these cases, by log id.
    #[arg(long, value_parser = PossibleValuesParser::new(STANDARD_SCENARIOS.map(|scenario| scenario.log_id)))]
    only: Vec<String>,
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    // RUST_LOG replaces the info default entirely when set.
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if debug {
        filter = filter.add_directive("catt_core=debug".parse()?);
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = CattConfig::load(&cli.config)
        .with_context(|| format!("invalid config {}", cli.config.display()))?;
    if let Some(secs) = cli.timeout {
        config.main.timeout_secs = secs;
    }
    let log_dir = cli.log_dir.unwrap_or_else(|| config.main.log_path.clone());
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let suite = config.standard_suite().only(&cli.only);
    let target = HandshakeTarget::new(cli.host, cli.port)
        .with_path(&cli.path)
        .with_ca_file(config.main.ca_file.clone());
    let settings = SuiteSettings::new(config.main.client.clone(), target, log_dir)
        .with_time_limit(config.time_limit());
    let runner = SuiteRunner::new(ProcessRunner::new(), settings)
        .with_extractor(EvidenceExtractor::new(config.marker_registry()?));

    info!(
        host = runner.settings().target.host(),
        port = runner.settings().target.port(),
        cases = suite.len(),
        "starting CVP2 authentication tests"
    );

    let debug = cli.debug;
    let report = runner
        .run_observed(&suite, |event| {
            let text = match event {
                SuiteEvent::Started { case, log_path } => render_case_header(case.name(), log_path),
                SuiteEvent::Finished(result) => render_case_outcome(result, debug),
            };
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
        .await;
    println!("{}", render_summary(&report.summary()));

    if let Some(path) = &cli.report {
        let file = File::create(path)
            .with_context(|| format!("failed to create report {}", path.display()))?;
        report
            .write_json_lines(Uuid::new_v4(), BufWriter::new(file))
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    Ok(report.exit_code())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            process::exit(EXIT_SETUP);
        }
    };
    if let Err(err) = init_tracing(cli.debug) {
        eprintln!("Error: {err:?}");
        process::exit(EXIT_SETUP);
    }

    // 1 and 2 come from the verdicts; setup and report errors exit 3.
    match run(cli).await {
        Ok(EXIT_OK) => {}
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:?}");
            process::exit(EXIT_SETUP);
        }
    }
}
