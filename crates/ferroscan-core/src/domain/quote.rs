use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{FetchError, Ticker, UtcDateTime};

/// One fetch strategy in the fallback chain, from lightest to richest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Lightweight summary quote fields.
    Summary,
    /// Full detail payload.
    Detail,
    /// Price and volume derived from recent historical bars.
    History,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Summary, Self::Detail, Self::History];

    /// 1-based position in the fallback chain.
    pub const fn index(self) -> u8 {
        match self {
            Self::Summary => 1,
            Self::Detail => 2,
            Self::History => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detail => "detail",
            Self::History => "history",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}:{}", self.index(), self.as_str())
    }
}

/// Raw, unvalidated field set produced by a tier fetcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteFields {
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub currency: Option<String>,
    pub as_of: Option<UtcDateTime>,
}

impl QuoteFields {
    pub fn with_price(price: f64) -> Self {
        Self {
            price: Some(price),
            ..Self::default()
        }
    }
}

/// Normalized quote produced by the first tier that passes validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub ticker: Ticker,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub currency: Option<String>,
    pub as_of: UtcDateTime,
    pub tier: Tier,
}

impl QuoteRecord {
    /// Validates raw tier output.
    ///
    /// Price is required and must be finite and positive. Every other numeric
    /// field is coerced to `None` when it is NaN, infinite or negative.
    pub fn from_fields(ticker: Ticker, tier: Tier, fields: QuoteFields) -> Result<Self, FetchError> {
        let price = match fields.price {
            None => {
                return Err(FetchError::validation(format!(
                    "{tier} returned no price for {ticker}"
                )))
            }
            Some(value) if !value.is_finite() => {
                return Err(FetchError::validation(format!(
                    "{tier} returned non-finite price for {ticker}"
                )))
            }
            Some(value) if value <= 0.0 => {
                return Err(FetchError::validation(format!(
                    "{tier} returned non-positive price {value} for {ticker}"
                )))
            }
            Some(value) => value,
        };

        Ok(Self {
            ticker,
            price,
            previous_close: non_negative(fields.previous_close),
            open: non_negative(fields.open),
            day_high: non_negative(fields.day_high),
            day_low: non_negative(fields.day_low),
            volume: non_negative(fields.volume).map(|value| value.round() as u64),
            market_cap: non_negative(fields.market_cap),
            currency: fields.currency.as_deref().and_then(normalize_currency),
            as_of: fields.as_of.unwrap_or_else(UtcDateTime::now),
            tier,
        })
    }
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite() && *value >= 0.0)
}

fn normalize_currency(input: &str) -> Option<String> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());
    is_valid.then_some(normalized)
}
