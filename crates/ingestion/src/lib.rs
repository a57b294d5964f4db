//! Quote ingestion for the quoted-spread workspace.
//!
//! This crate handles:
//! - Relative spread derivation from bid/ask quotes
//! - Session clock (UTC timestamps to seconds after open)
//! - Paginated quote collection with a request budget
//! - Market calendar filtering

pub mod calendar;
pub mod pagination;
pub mod session;
pub mod spread;

pub use calendar::{valid_trading_days, CalendarSource, MarketSession};
pub use pagination::{FetchOutcome, PageRequest, QuoteCollector, QuotePageSource, TimedQuote};
pub use session::SessionClock;
pub use spread::{relative_spread, QuoteSeries, SpreadStats, SpreadTransform};
