//! Tiered quote fetching.
//!
//! [`TieredFetchStrategy`] drives an abstract [`TierFetcher`] through the
//! summary, detail and history tiers. [`YahooTierFetcher`] is the bundled
//! upstream implementation; it talks HTTP through the [`HttpClient`] seam so
//! requests can be routed through a leased proxy.

pub mod http;
mod strategy;
mod tier;
mod yahoo;

pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use strategy::{FetchOutcome, TieredFetchStrategy};
pub use tier::{TierFetcher, TierFuture};
pub use yahoo::YahooTierFetcher;
