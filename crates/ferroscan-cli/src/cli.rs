//! CLI argument definitions for Ferroscan.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan an explicit ticker list |
//! | `backfill` | Select hot and stale tickers under a budget, then scan |
//! | `classify` | Classify raw error strings as hard or soft |
//! | `proxies` | Load and validate a proxy list |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--config` | none | JSON configuration file |
//!
//! Configuration is layered: defaults, then `--config`, then `FERROSCAN_*`
//! environment variables, then command-line flags.
//!
//! # Examples
//!
//! ```bash
//! # Scan three tickers through a proxy list
//! ferroscan scan AAPL MSFT TSLA --proxy-file proxies.txt
//!
//! # Backfill with a budget, without persisting
//! ferroscan backfill --hot-file watched.txt --stale-file universe.txt --max-tickers 500 --dry-run
//!
//! # Check how an error string would be treated
//! ferroscan classify "CONNECT tunnel failed, response 407"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ferroscan - proxy-rotating market-data scanner
#[derive(Debug, Parser)]
#[command(
    name = "ferroscan",
    author,
    version,
    about = "Proxy-rotating market-data scanner",
    long_about = "Ferroscan fetches quotes for large ticker universes through a rotating \
pool of proxies. Features include:\n\
\n\
  • Bounded worker pool with adaptive backoff\n\
  • Proxy quarantine with exponential cooldown\n\
  • Tiered fallback from summary quotes to historical bars\n\
  • Hot/stale backfill selection under a ticker budget\n\
\n\
Use 'ferroscan <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// JSON configuration file applied before environment variables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Aligned key/value text for terminals.
    Table,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan an explicit list of tickers.
    ///
    /// # Examples
    ///
    ///   ferroscan scan AAPL MSFT
    ///   ferroscan scan --symbols-file universe.txt --workers 20
    Scan(ScanArgs),

    /// Select hot tickers ahead of stale ones, capped at a budget, then scan.
    ///
    /// # Examples
    ///
    ///   ferroscan backfill --hot AAPL,MSFT --stale-file universe.txt
    ///   ferroscan backfill --hot-file watched.txt --max-tickers 1000
    Backfill(BackfillArgs),

    /// Classify raw error strings as hard (quarantine) or soft (retry).
    ///
    /// # Examples
    ///
    ///   ferroscan classify "Connection refused" "No price data"
    Classify(ClassifyArgs),

    /// Load a proxy list and report the endpoints it contains.
    ///
    /// # Examples
    ///
    ///   ferroscan proxies proxies.json
    Proxies(ProxiesArgs),
}

/// Scanner tuning flags shared by `scan` and `backfill`.
///
/// Every flag is optional; unset flags keep the configured value.
#[derive(Debug, Default, Args)]
pub struct ScannerArgs {
    /// Number of concurrent fetch workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Retries per ticker after the first attempt.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Progress and persistence batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Proxy list file (JSON array or one address per line).
    #[arg(long)]
    pub proxy_file: Option<PathBuf>,

    /// Wall-clock budget for the whole pass, in seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Global cap on upstream calls per second, counting every tier call.
    #[arg(long)]
    pub max_rps: Option<u32>,

    /// Longest wait for a fully quarantined pool before the pass degrades.
    #[arg(long)]
    pub max_exhausted_wait_ms: Option<u64>,

    /// Fetch without a proxy when the pool has nothing selectable.
    #[arg(long, default_value_t = false)]
    pub direct_fallback: bool,

    /// Run the pass but skip persistence.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Append fetched records to this NDJSON file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Include every fetched record in the command output.
    #[arg(long, default_value_t = false)]
    pub include_records: bool,
}

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Tickers to scan (e.g., AAPL MSFT BRK.B).
    #[arg(num_args = 0..)]
    pub symbols: Vec<String>,

    /// File with one ticker per line.
    #[arg(long)]
    pub symbols_file: Option<PathBuf>,

    #[command(flatten)]
    pub scanner: ScannerArgs,
}

/// Arguments for the `backfill` command.
#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Actively watched tickers, scanned first.
    #[arg(long, value_delimiter = ',')]
    pub hot: Vec<String>,

    /// File with one hot ticker per line.
    #[arg(long)]
    pub hot_file: Option<PathBuf>,

    /// Least recently refreshed tickers, scanned after hot ones.
    #[arg(long, value_delimiter = ',')]
    pub stale: Vec<String>,

    /// File with one stale ticker per line.
    #[arg(long)]
    pub stale_file: Option<PathBuf>,

    /// Upper bound on tickers selected for the pass.
    #[arg(long, allow_negative_numbers = true)]
    pub max_tickers: Option<i64>,

    #[command(flatten)]
    pub scanner: ScannerArgs,
}

/// Arguments for the `classify` command.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Raw error strings.
    #[arg(required = true, num_args = 1..)]
    pub errors: Vec<String>,
}

/// Arguments for the `proxies` command.
#[derive(Debug, Args)]
pub struct ProxiesArgs {
    /// Proxy list file.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_flags() {
        let cli = Cli::parse_from([
            "ferroscan",
            "--format",
            "table",
            "scan",
            "AAPL",
            "MSFT",
            "--workers",
            "4",
            "--dry-run",
        ]);

        assert_eq!(cli.format, OutputFormat::Table);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(args.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(args.scanner.workers, Some(4));
        assert!(args.scanner.dry_run);
        assert_eq!(args.scanner.timeout_ms, None);
    }

    #[test]
    fn backfill_accepts_comma_separated_lists() {
        let cli = Cli::parse_from([
            "ferroscan",
            "backfill",
            "--hot",
            "AAPL,MSFT",
            "--stale",
            "TSLA",
            "--max-tickers",
            "-1",
        ]);

        let Command::Backfill(args) = cli.command else {
            panic!("expected backfill command");
        };
        assert_eq!(args.hot, vec!["AAPL", "MSFT"]);
        assert_eq!(args.stale, vec!["TSLA"]);
        assert_eq!(args.max_tickers, Some(-1));
    }

    #[test]
    fn classify_requires_input() {
        assert!(Cli::try_parse_from(["ferroscan", "classify"]).is_err());
    }
}
