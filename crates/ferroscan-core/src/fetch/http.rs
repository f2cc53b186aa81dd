use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::proxy::ProxyLease;

/// HTTP request envelope used by tier fetchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP failure. The message keeps the full error chain so
/// the classifier can see proxy and socket details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract for tier fetchers. `proxy = None` means a direct
/// connection.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
        proxy: Option<&'a ProxyLease>,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production client backed by reqwest, one pooled client per proxy URL.
#[derive(Debug)]
pub struct ReqwestHttpClient {
    user_agent: String,
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_user_agent(concat!("ferroscan/", env!("CARGO_PKG_VERSION")))
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let direct = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            user_agent,
            direct,
            proxied: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyLease>) -> Result<reqwest::Client, HttpError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self
            .proxied
            .lock()
            .expect("proxied client cache lock is not poisoned");
        if let Some(client) = clients.get(proxy.url()) {
            return Ok(client.clone());
        }

        let reqwest_proxy = reqwest::Proxy::all(proxy.url()).map_err(|error| {
            HttpError::new(format!(
                "unable to connect to proxy {}: invalid proxy configuration: {error}",
                proxy.display_address()
            ))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .proxy(reqwest_proxy)
            .build()
            .map_err(|error| HttpError::new(format!("failed to build proxied client: {error}")))?;
        clients.insert(proxy.url().to_owned(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
        proxy: Option<&'a ProxyLease>,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for(proxy)?;
            let mut builder = client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|error| {
                let chain = error_chain(&error);
                if error.is_timeout() {
                    HttpError::new(format!("request timed out: {chain}"))
                } else if error.is_connect() {
                    match proxy {
                        Some(proxy) => HttpError::new(format!(
                            "cannot connect to proxy {}: {chain}",
                            proxy.display_address()
                        )),
                        None => HttpError::new(format!("connection failed: {chain}")),
                    }
                } else {
                    HttpError::new(format!("request failed: {chain}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|error| {
                HttpError::new(format!(
                    "connection reset while reading body: {}",
                    error_chain(&error)
                ))
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
