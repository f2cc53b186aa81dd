//! Proxy endpoints, the shared pool and list loading.

mod endpoint;
mod pool;
mod source;

pub use endpoint::{ProxyEndpoint, ProxyHealth, ProxyLease, ProxyProtocol, ReleaseOutcome};
pub use pool::{ProxyPool, ProxyPoolConfig, ProxySnapshot, QuarantinePolicy};
pub use source::{load_proxy_file, parse_proxy_list};
