mod backfill;
mod classify;
mod proxies;
mod scan;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ferroscan_core::{
    JsonLinesSink, ProxySource, ScanOrchestrator, ScanResult, ScanState, ScannerConfig,
    YahooTierFetcher,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ScannerArgs};
use crate::error::CliError;

/// Output of one command, rendered by [`crate::output`].
#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    /// The command ran but did not finish its work (cancelled or degraded pass).
    pub partial: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            partial: false,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Scan(args) => scan::run(args, cli.config.as_deref()).await,
        Command::Backfill(args) => backfill::run(args, cli.config.as_deref()).await,
        Command::Classify(args) => classify::run(args),
        Command::Proxies(args) => proxies::run(args),
    }
}

/// Defaults, then the config file, then `FERROSCAN_*`, then flags.
fn build_config(config_path: Option<&Path>, args: &ScannerArgs) -> Result<ScannerConfig, CliError> {
    let base = match config_path {
        Some(path) => ScannerConfig::from_json_file(path)?,
        None => ScannerConfig::default(),
    };
    let mut config = base.overlay_env(|name| std::env::var(name).ok())?;

    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config = config.with_per_request_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(max_retries) = args.max_retries {
        config = config.with_max_retries(max_retries);
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(path) = &args.proxy_file {
        config = config.with_proxy_source(ProxySource::File(path.clone()));
    }
    if let Some(deadline_secs) = args.deadline_secs {
        config = config.with_deadline(Duration::from_secs(deadline_secs));
    }
    if let Some(wait_ms) = args.max_exhausted_wait_ms {
        config = config.with_max_exhausted_wait(Duration::from_millis(wait_ms));
    }
    if args.max_rps.is_some() {
        config = config.with_max_requests_per_second(args.max_rps);
    }
    if args.direct_fallback {
        config = config.with_direct_fallback(true);
    }
    if args.dry_run {
        config = config.with_dry_run(true);
    }

    config.validate()?;
    Ok(config)
}

/// Wires the upstream fetcher, optional sink and Ctrl-C cancellation.
fn build_orchestrator(config: ScannerConfig, args: &ScannerArgs) -> Result<ScanOrchestrator, CliError> {
    let timeout_ms = config.per_request_timeout.as_millis() as u64;
    let fetcher = YahooTierFetcher::default().with_timeout_ms(timeout_ms);
    let mut orchestrator = ScanOrchestrator::new(config, Arc::new(fetcher))?;

    if let Some(path) = &args.output {
        orchestrator = orchestrator.with_sink(Arc::new(JsonLinesSink::new(path.clone())));
    } else if !orchestrator.config().dry_run {
        info!("no --output given, records are only reported");
    }

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling scan");
            token.cancel();
        }
    });

    Ok(orchestrator)
}

/// One ticker per line; blank lines and `#` comments are skipped.
fn read_ticker_file(path: &Path) -> Result<Vec<String>, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

#[derive(Debug, Serialize)]
struct FailureView {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ScanResponseData<'a> {
    summary: ferroscan_core::ScanSummary,
    failures: BTreeMap<&'a str, FailureView>,
    skipped: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<&'a [ferroscan_core::QuoteRecord]>,
}

fn scan_output(result: &ScanResult, include_records: bool) -> Result<CommandResult, CliError> {
    let failures = result
        .failures
        .iter()
        .map(|(ticker, error)| {
            (
                ticker.as_str(),
                FailureView {
                    code: error.code(),
                    message: error.message().to_owned(),
                },
            )
        })
        .collect();

    let data = serde_json::to_value(ScanResponseData {
        summary: result.summary(),
        failures,
        skipped: result.skipped.iter().map(|ticker| ticker.as_str()).collect(),
        records: include_records.then_some(result.records.as_slice()),
    })?;

    Ok(CommandResult::ok(data).with_partial(result.status != ScanState::Completed))
}
