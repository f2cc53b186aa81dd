//! Upstream [`TierFetcher`] backed by the public Yahoo Finance JSON endpoints.
//!
//! | Tier | Endpoint |
//! |------|----------|
//! | summary | `v7/finance/quote` |
//! | detail | `v10/finance/quoteSummary` (`price`, `summaryDetail` modules) |
//! | history | `v8/finance/chart` (last non-null daily close and volume) |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use super::tier::{TierFetcher, TierFuture};
use crate::proxy::ProxyLease;
use crate::{FetchError, QuoteFields, Ticker, Tier, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance tier fetcher.
#[derive(Clone)]
pub struct YahooTierFetcher {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout_ms: u64,
}

impl Default for YahooTierFetcher {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::default()))
    }
}

impl YahooTierFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Transport-level timeout passed to the HTTP client. The strategy applies
    /// its own per-tier timeout on top of this.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn endpoint(&self, ticker: &Ticker, tier: Tier) -> String {
        let symbol = urlencoding::encode(ticker.as_str());
        match tier {
            Tier::Summary => format!("{}/v7/finance/quote?symbols={symbol}", self.base_url),
            Tier::Detail => format!(
                "{}/v10/finance/quoteSummary/{symbol}?modules=price,summaryDetail",
                self.base_url
            ),
            Tier::History => format!(
                "{}/v8/finance/chart/{symbol}?range=5d&interval=1d",
                self.base_url
            ),
        }
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        tier: Tier,
        proxy: Option<&ProxyLease>,
    ) -> Result<QuoteFields, FetchError> {
        let request = HttpRequest::get(self.endpoint(ticker, tier))
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http_client
            .execute(request, proxy)
            .await
            .map_err(|error| FetchError::transport(error.message()))?;
        check_status(&response, tier)?;

        match tier {
            Tier::Summary => parse_summary(&response.body, ticker),
            Tier::Detail => parse_detail(&response.body, ticker),
            Tier::History => parse_history(&response.body, ticker),
        }
    }
}

impl TierFetcher for YahooTierFetcher {
    fn fetch_tier<'a>(
        &'a self,
        ticker: &'a Ticker,
        tier: Tier,
        proxy: Option<&'a ProxyLease>,
    ) -> TierFuture<'a> {
        Box::pin(self.fetch(ticker, tier, proxy))
    }
}

fn check_status(response: &HttpResponse, tier: Tier) -> Result<(), FetchError> {
    match response.status {
        status if (200..300).contains(&status) => Ok(()),
        407 => Err(FetchError::transport(
            "proxy authentication required (status 407)",
        )),
        429 => Err(FetchError::rate_limited("upstream returned status 429")),
        status if status >= 500 => Err(FetchError::rate_limited(format!(
            "upstream unavailable, returned status {status}"
        ))),
        status => Err(FetchError::validation(format!(
            "{tier} endpoint returned status {status}"
        ))),
    }
}

fn decode<T: DeserializeOwned>(body: &str, tier: Tier) -> Result<T, FetchError> {
    serde_json::from_str(body)
        .map_err(|error| FetchError::validation(format!("malformed {tier} payload: {error}")))
}

fn parse_summary(body: &str, ticker: &Ticker) -> Result<QuoteFields, FetchError> {
    let response: QuoteResponse = decode(body, Tier::Summary)?;
    let quote = response
        .quote_response
        .result
        .into_iter()
        .find(|quote| quote.symbol.eq_ignore_ascii_case(ticker.as_str()))
        .ok_or_else(|| FetchError::validation(format!("no summary quote for {ticker}")))?;

    Ok(QuoteFields {
        price: quote.regular_market_price,
        previous_close: quote.regular_market_previous_close,
        open: quote.regular_market_open,
        day_high: quote.regular_market_day_high,
        day_low: quote.regular_market_day_low,
        volume: quote.regular_market_volume,
        market_cap: quote.market_cap,
        currency: quote.currency,
        as_of: quote
            .regular_market_time
            .and_then(|seconds| UtcDateTime::from_unix_timestamp(seconds).ok()),
    })
}

fn parse_detail(body: &str, ticker: &Ticker) -> Result<QuoteFields, FetchError> {
    let response: QuoteSummaryResponse = decode(body, Tier::Detail)?;
    let result = response
        .quote_summary
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::validation(format!("no detail payload for {ticker}")))?;

    let price = result.price.unwrap_or_default();
    let detail = result.summary_detail.unwrap_or_default();

    Ok(QuoteFields {
        price: RawValue::get(&price.regular_market_price),
        previous_close: RawValue::get(&price.regular_market_previous_close)
            .or_else(|| RawValue::get(&detail.previous_close)),
        open: RawValue::get(&price.regular_market_open).or_else(|| RawValue::get(&detail.open)),
        day_high: RawValue::get(&price.regular_market_day_high)
            .or_else(|| RawValue::get(&detail.day_high)),
        day_low: RawValue::get(&price.regular_market_day_low)
            .or_else(|| RawValue::get(&detail.day_low)),
        volume: RawValue::get(&price.regular_market_volume)
            .or_else(|| RawValue::get(&detail.volume)),
        market_cap: RawValue::get(&price.market_cap).or_else(|| RawValue::get(&detail.market_cap)),
        currency: price.currency.or(detail.currency),
        as_of: price
            .regular_market_time
            .and_then(|seconds| UtcDateTime::from_unix_timestamp(seconds).ok()),
    })
}

fn parse_history(body: &str, ticker: &Ticker) -> Result<QuoteFields, FetchError> {
    let response: ChartResponse = decode(body, Tier::History)?;
    let result = response
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::validation(format!("no chart data for {ticker}")))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let bars = result.indicators.quote.into_iter().next().unwrap_or_default();

    // Walk back from the newest bar to the last one with a close.
    let last = (0..bars.close.len())
        .rev()
        .find(|&index| bars.close[index].is_some_and(f64::is_finite));
    let Some(index) = last else {
        return Err(FetchError::validation(format!(
            "chart for {ticker} has no closing prices"
        )));
    };

    let at = |series: &[Option<f64>]| series.get(index).copied().flatten();
    let previous_close = (0..index)
        .rev()
        .find_map(|prior| bars.close[prior].filter(|value| value.is_finite()));

    Ok(QuoteFields {
        price: at(&bars.close[..]),
        previous_close: result
            .meta
            .as_ref()
            .and_then(|meta| meta.chart_previous_close)
            .or(previous_close),
        open: at(&bars.open[..]),
        day_high: at(&bars.high[..]),
        day_low: at(&bars.low[..]),
        volume: at(&bars.volume[..]),
        market_cap: None,
        currency: result.meta.and_then(|meta| meta.currency),
        as_of: timestamps
            .get(index)
            .and_then(|&seconds| UtcDateTime::from_unix_timestamp(seconds).ok()),
    })
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseData,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseData {
    #[serde(default)]
    result: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteData {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_time: Option<i64>,
    market_cap: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetailModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
    regular_market_open: Option<RawValue>,
    regular_market_day_high: Option<RawValue>,
    regular_market_day_low: Option<RawValue>,
    regular_market_volume: Option<RawValue>,
    regular_market_time: Option<i64>,
    market_cap: Option<RawValue>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDetailModule {
    previous_close: Option<RawValue>,
    open: Option<RawValue>,
    day_high: Option<RawValue>,
    day_low: Option<RawValue>,
    volume: Option<RawValue>,
    market_cap: Option<RawValue>,
    currency: Option<String>,
}

/// Numeric value wrapped as `{"raw": 1.0, "fmt": "1.00"}`.
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl RawValue {
    fn get(value: &Option<Self>) -> Option<f64> {
        value.and_then(|value| value.raw)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartBars>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChartBars {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}
