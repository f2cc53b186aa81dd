//! # Domain Models
//!
//! Value types shared by every scan component.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Trimmed, uppercased symbol |
//! | [`Tier`] | Position in the fetch fallback chain |
//! | [`QuoteFields`] | Raw tier output before validation |
//! | [`QuoteRecord`] | Validated quote with nullable numeric fields |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Records are validated once, when a tier succeeds:
//!
//! ```rust,ignore
//! use ferroscan_core::{QuoteFields, QuoteRecord, Ticker, Tier};
//!
//! let ticker = Ticker::parse("msft")?;
//! let record = QuoteRecord::from_fields(ticker, Tier::Summary, QuoteFields::with_price(411.2))?;
//! assert_eq!(record.tier.index(), 1);
//! ```

mod quote;
mod ticker;
mod timestamp;

pub use quote::{QuoteFields, QuoteRecord, Tier};
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;
