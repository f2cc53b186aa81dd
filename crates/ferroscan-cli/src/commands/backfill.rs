use std::path::Path;

use crate::cli::BackfillArgs;
use crate::error::CliError;

use super::{build_config, build_orchestrator, read_ticker_file, scan_output, CommandResult};

pub async fn run(args: &BackfillArgs, config_path: Option<&Path>) -> Result<CommandResult, CliError> {
    let mut hot = args.hot.clone();
    if let Some(path) = &args.hot_file {
        hot.extend(read_ticker_file(path)?);
    }
    let mut stale = args.stale.clone();
    if let Some(path) = &args.stale_file {
        stale.extend(read_ticker_file(path)?);
    }

    let mut config = build_config(config_path, &args.scanner)?;
    if let Some(max_tickers) = args.max_tickers {
        config = config.with_max_tickers(max_tickers);
    }

    let orchestrator = build_orchestrator(config, &args.scanner)?;
    let result = orchestrator.run_backfill(&hot, &stale).await;

    scan_output(&result, args.scanner.include_records)
}
