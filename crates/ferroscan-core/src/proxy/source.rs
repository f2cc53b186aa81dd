//! Proxy list loading.
//!
//! Accepted formats:
//!
//! - JSON array of address strings: `["http://1.2.3.4:8080", ...]`
//! - JSON array of annotated objects: `[{"proxy": "socks5://...", "country": "DE", "latency_ms": 120}]`
//!   (`address`, `url` and `host`/`port`/`protocol` are accepted too; other
//!   metadata is ignored)
//! - newline-delimited addresses, with blank lines and `#` comments skipped

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::endpoint::ProxyEndpoint;
use crate::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProxyEntry {
    Plain(String),
    Annotated(AnnotatedProxy),
}

#[derive(Debug, Deserialize)]
struct AnnotatedProxy {
    #[serde(alias = "address", alias = "url")]
    proxy: Option<String>,
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

impl ProxyEntry {
    fn into_address(self) -> Option<String> {
        match self {
            Self::Plain(address) => Some(address),
            Self::Annotated(AnnotatedProxy {
                proxy: Some(address),
                ..
            }) => Some(address),
            Self::Annotated(AnnotatedProxy {
                proxy: None,
                protocol,
                host: Some(host),
                port: Some(port),
            }) => Some(format!(
                "{}://{host}:{port}",
                protocol.as_deref().unwrap_or("http")
            )),
            Self::Annotated(_) => None,
        }
    }
}

/// Parse a proxy list. Malformed entries are skipped with a warning; duplicate
/// addresses keep their first occurrence.
pub fn parse_proxy_list(text: &str) -> Result<Vec<ProxyEndpoint>, ConfigError> {
    let trimmed = text.trim_start();
    let addresses: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<ProxyEntry>>(trimmed)?
            .into_iter()
            .filter_map(|entry| {
                let address = entry.into_address();
                if address.is_none() {
                    warn!("skipping proxy entry without an address");
                }
                address
            })
            .collect()
    } else {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect()
    };

    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(addresses.len());
    for address in addresses {
        match ProxyEndpoint::parse(&address) {
            Ok(endpoint) => {
                if seen.insert(endpoint.url()) {
                    endpoints.push(endpoint);
                }
            }
            Err(error) => warn!(%error, "skipping malformed proxy entry"),
        }
    }

    debug!(count = endpoints.len(), "parsed proxy list");
    Ok(endpoints)
}

/// Read and parse a proxy list file.
pub fn load_proxy_file(path: impl AsRef<Path>) -> Result<Vec<ProxyEndpoint>, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_proxy_list(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyProtocol;
    use std::io::Write;

    #[test]
    fn parses_newline_delimited_list() {
        let text = "# pool A\nhttp://10.0.0.1:8080\n\n  socks5://10.0.0.2:1080  \n10.0.0.3:3128\nnot a proxy\n";
        let endpoints = parse_proxy_list(text).expect("parsable");

        let addresses: Vec<String> = endpoints.iter().map(ProxyEndpoint::display_address).collect();
        assert_eq!(
            addresses,
            vec![
                "http://10.0.0.1:8080",
                "socks5://10.0.0.2:1080",
                "http://10.0.0.3:3128",
            ]
        );
    }

    #[test]
    fn parses_json_strings_and_annotated_objects() {
        let text = r#"[
            "https://10.0.0.1:443",
            {"proxy": "socks5h://10.0.0.2:1080", "country": "NL", "latency_ms": 84.5},
            {"protocol": "http", "host": "10.0.0.3", "port": 8000, "country": "US"},
            {"country": "FR"},
            "https://10.0.0.1:443"
        ]"#;
        let endpoints = parse_proxy_list(text).expect("parsable");

        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[0].protocol(), ProxyProtocol::Https);
        assert_eq!(endpoints[1].protocol(), ProxyProtocol::Socks5h);
        assert_eq!(endpoints[2].host(), "10.0.0.3");
        assert_eq!(endpoints[2].port(), 8000);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let error = parse_proxy_list("[\"http://10.0.0.1:8080\"").expect_err("truncated json");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "http://10.1.1.1:8080").expect("write");
        writeln!(file, "http://10.1.1.2:8080").expect("write");

        let endpoints = load_proxy_file(file.path()).expect("loadable");
        assert_eq!(endpoints.len(), 2);

        let missing = load_proxy_file("/definitely/not/here.txt").expect_err("missing file");
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
