use std::path::Path;

use ferroscan_core::Ticker;

use crate::cli::ScanArgs;
use crate::error::CliError;

use super::{build_config, build_orchestrator, read_ticker_file, scan_output, CommandResult};

pub async fn run(args: &ScanArgs, config_path: Option<&Path>) -> Result<CommandResult, CliError> {
    let mut raw = args.symbols.clone();
    if let Some(path) = &args.symbols_file {
        raw.extend(read_ticker_file(path)?);
    }
    if raw.is_empty() {
        return Err(CliError::Input(String::from(
            "no tickers given; pass symbols or --symbols-file",
        )));
    }

    let tickers = raw
        .iter()
        .map(|symbol| Ticker::parse(symbol))
        .collect::<Result<Vec<_>, _>>()?;

    let config = build_config(config_path, &args.scanner)?;
    let orchestrator = build_orchestrator(config, &args.scanner)?;
    let result = orchestrator.run(tickers).await;

    scan_output(&result, args.scanner.include_records)
}
