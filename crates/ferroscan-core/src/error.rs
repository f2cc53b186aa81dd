use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

use crate::classifier::{classify, FailureClass};

/// Validation and contract errors exposed by `ferroscan-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 between 1970 and 9999: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("unix timestamp {seconds} is out of range")]
    TimestampOutOfRange { seconds: i64 },

    #[error("invalid proxy address '{value}', expected protocol://host:port")]
    InvalidProxyAddress { value: String },
    #[error("unsupported proxy protocol '{value}', expected one of http, https, socks5, socks5h")]
    UnsupportedProxyProtocol { value: String },
}

/// Errors raised while building or loading a [`ScannerConfig`](crate::ScannerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: String, value: String },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Error returned by a [`RecordSink`](crate::RecordSink).
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sink i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Fetch-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Proxy or network failure; the proxy itself is suspect.
    Transport,
    /// Upstream throttling.
    RateLimited,
    /// Missing or invalid fields in an upstream payload.
    Validation,
    /// No selectable proxy endpoint.
    ProxyExhausted,
    /// The pass deadline elapsed before the ticker resolved.
    DeadlineExceeded,
}

impl FetchErrorKind {
    /// Stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Transport => "fetch.transport",
            Self::RateLimited => "fetch.rate_limited",
            Self::Validation => "fetch.validation",
            Self::ProxyExhausted => "fetch.proxy_exhausted",
            Self::DeadlineExceeded => "fetch.deadline_exceeded",
        }
    }
}

/// Structured fetch error carried through workers into scan results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retry_after: Option<Duration>,
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Validation, message)
    }

    /// `retry_after` is set when every endpoint is quarantined and one becomes
    /// selectable again after the given delay; `None` means nothing is left.
    pub fn proxy_exhausted(retry_after: Option<Duration>) -> Self {
        let message = match retry_after {
            Some(delay) => format!(
                "all proxies quarantined; earliest release in {}ms",
                delay.as_millis()
            ),
            None => String::from("no active proxy endpoints remain"),
        };
        Self {
            kind: FetchErrorKind::ProxyExhausted,
            message,
            retry_after,
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(
            FetchErrorKind::DeadlineExceeded,
            "scan deadline elapsed before every ticker resolved",
        )
    }

    /// External cancellation; reported under the deadline code.
    pub fn cancelled() -> Self {
        Self::new(
            FetchErrorKind::DeadlineExceeded,
            "scan cancelled before every ticker resolved",
        )
    }

    fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Maps the error onto the hard/soft split used for quarantine decisions.
    ///
    /// Transport errors are always hard. Validation and rate-limit errors fall
    /// back to message classification, so a payload error that wraps a proxy
    /// tunnel failure still quarantines.
    pub fn failure_class(&self) -> FailureClass {
        match self.kind {
            FetchErrorKind::Transport => FailureClass::Hard,
            FetchErrorKind::Validation | FetchErrorKind::RateLimited => classify(Some(&self.message)),
            FetchErrorKind::ProxyExhausted | FetchErrorKind::DeadlineExceeded => FailureClass::Soft,
        }
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_hard() {
        let error = FetchError::transport("upstream closed the stream");
        assert_eq!(error.failure_class(), FailureClass::Hard);
        assert_eq!(error.code(), "fetch.transport");
    }

    #[test]
    fn validation_errors_are_soft_unless_message_says_otherwise() {
        assert_eq!(
            FetchError::validation("price field missing").failure_class(),
            FailureClass::Soft
        );
        assert_eq!(
            FetchError::rate_limited("upstream returned 429").failure_class(),
            FailureClass::Soft
        );
    }

    #[test]
    fn proxy_exhausted_carries_retry_hint() {
        let error = FetchError::proxy_exhausted(Some(Duration::from_millis(250)));
        assert_eq!(error.kind(), FetchErrorKind::ProxyExhausted);
        assert_eq!(error.retry_after(), Some(Duration::from_millis(250)));
        assert!(error.message().contains("250ms"));

        let terminal = FetchError::proxy_exhausted(None);
        assert_eq!(terminal.retry_after(), None);
    }
}
