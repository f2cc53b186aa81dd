use ferroscan_core::{load_proxy_file, ProxyPool, ProxyPoolConfig, ProxyProtocol, ProxySnapshot};
use serde::Serialize;

use crate::cli::ProxiesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ProxyView {
    address: String,
    protocol: ProxyProtocol,
    has_credentials: bool,
}

#[derive(Debug, Serialize)]
struct ProxiesResponseData {
    count: usize,
    proxies: Vec<ProxyView>,
    pool: Vec<ProxySnapshot>,
}

pub fn run(args: &ProxiesArgs) -> Result<CommandResult, CliError> {
    let endpoints = load_proxy_file(&args.path)?;
    if endpoints.is_empty() {
        return Err(CliError::Input(format!(
            "'{}' contains no usable proxy entries",
            args.path.display()
        )));
    }

    let proxies = endpoints
        .iter()
        .map(|endpoint| ProxyView {
            address: endpoint.display_address(),
            protocol: endpoint.protocol(),
            has_credentials: endpoint.url() != endpoint.display_address(),
        })
        .collect();
    let pool = ProxyPool::new(endpoints, ProxyPoolConfig::default());

    let data = serde_json::to_value(ProxiesResponseData {
        count: pool.len(),
        proxies,
        pool: pool.snapshot(),
    })?;
    Ok(CommandResult::ok(data))
}
