use std::future::Future;
use std::pin::Pin;

use crate::proxy::ProxyLease;
use crate::{FetchError, QuoteFields, Ticker, Tier};

/// Future returned by [`TierFetcher::fetch_tier`].
pub type TierFuture<'a> = Pin<Box<dyn Future<Output = Result<QuoteFields, FetchError>> + Send + 'a>>;

/// Capability to fetch raw quote fields for one ticker through one tier.
///
/// `proxy = None` means a direct connection. Implementations report proxy
/// and socket failures as [`FetchError::transport`], upstream throttling as
/// [`FetchError::rate_limited`] and unusable payloads as
/// [`FetchError::validation`].
pub trait TierFetcher: Send + Sync {
    fn fetch_tier<'a>(
        &'a self,
        ticker: &'a Ticker,
        tier: Tier,
        proxy: Option<&'a ProxyLease>,
    ) -> TierFuture<'a>;
}
