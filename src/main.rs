use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txconfirm::application::engine::{EngineConfig, SubmissionEngine};
use txconfirm::application::tracker::Finality;
use txconfirm::domain::outcome::FailureMarker;
use txconfirm::infrastructure::in_memory::{InMemoryLedger, SealMode, dev_address};
use txconfirm::interfaces::csv::report_writer::ReportWriter;
use txconfirm::interfaces::csv::scenario_reader::ScenarioReader;
use txconfirm::interfaces::scenario::ScenarioRunner;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario CSV file (signer, module, call, dest, amount, expect)
    input: PathBuf,

    /// Engine configuration as JSON. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Confirmation timeout per transaction, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Event marking an application-level failure, as <section>.<method>
    #[arg(long)]
    failure_marker: Option<FailureMarker>,

    /// Settle on block inclusion (in_block) or on finality (finalized)
    #[arg(long)]
    finality: Option<Finality>,

    /// Initial balance for a dev account, as URI=AMOUNT (repeatable)
    #[arg(long = "endow", value_parser = parse_endowment)]
    endowments: Vec<(String, u128)>,

    /// Submit consecutive rows of one signer as a batch
    #[arg(long)]
    concurrent: bool,
}

fn parse_endowment(raw: &str) -> std::result::Result<(String, u128), String> {
    let (uri, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected URI=AMOUNT, got '{raw}'"))?;
    let amount = amount
        .parse()
        .map_err(|e| format!("invalid amount '{amount}': {e}"))?;
    Ok((uri.to_string(), amount))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if let Some(secs) = cli.timeout_secs {
        config.timeout_ms = secs.saturating_mul(1000);
    }
    if let Some(marker) = cli.failure_marker {
        config.tracker.failure_marker = marker;
    }
    if let Some(finality) = cli.finality {
        config.tracker.finality = finality;
    }
    let timeout: Duration = config.default_timeout();

    let ledger = Arc::new(InMemoryLedger::new(SealMode::Instant));
    for (uri, amount) in &cli.endowments {
        ledger.endow(&dev_address(uri), *amount).await;
    }
    let engine = SubmissionEngine::new(ledger, config);

    // Load the scenario, skipping malformed rows
    let file = File::open(&cli.input).into_diagnostic()?;
    let mut steps = Vec::new();
    for step in ScenarioReader::new(file).steps() {
        match step {
            Ok(step) => steps.push(step),
            Err(e) => eprintln!("Error reading scenario row: {}", e),
        }
    }

    let mut runner = ScenarioRunner::new(&engine, timeout);
    let rows = if cli.concurrent {
        runner.run_concurrent(&steps).await
    } else {
        runner.run_sequential(&steps).await
    };

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_rows(&rows).into_diagnostic()?;

    let failed = rows.iter().filter(|row| !row.passed()).count();
    if failed > 0 {
        return Err(miette!("{failed} of {} expectation(s) not met", rows.len()));
    }
    Ok(())
}
