//! Paginated quote collection.
//!
//! Drives a page-at-a-time quote source across one session window, bounded by
//! a request budget, and classifies the result as complete, incomplete or
//! failed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use spread_core::config::FetchConfig;
use spread_core::{FetchError, RawQuote, Result, TimestampNs};
use tracing::{debug, warn};

use crate::session::SessionClock;

/// A quote stamped with an absolute UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedQuote {
    /// Nanoseconds since Unix epoch (UTC).
    pub ts_ns: TimestampNs,
    /// Best bid price.
    pub bid: f64,
    /// Best ask price.
    pub ask: f64,
}

/// One page request.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub symbol: &'a str,
    pub date: NaiveDate,
    /// Return quotes at or after this instant.
    pub from_ns: TimestampNs,
    /// Maximum quotes in the page.
    pub limit: usize,
}

/// A market-data endpoint that returns quotes one page at a time.
///
/// Implementations report transport problems as [`FetchError::Transient`] and
/// unsuccessful responses as [`FetchError::Rejected`]. An empty page is a
/// normal return value.
pub trait QuotePageSource {
    fn fetch_page(&self, request: &PageRequest<'_>) -> std::result::Result<Vec<TimedQuote>, FetchError>;
}

impl<S: QuotePageSource + ?Sized> QuotePageSource for &S {
    fn fetch_page(&self, request: &PageRequest<'_>) -> std::result::Result<Vec<TimedQuote>, FetchError> {
        (**self).fetch_page(request)
    }
}

/// Result of retrieving one symbol-day of quotes.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Every quote up to the stop time was retrieved.
    Complete(Vec<RawQuote>),
    /// Retrieval stopped early; `quotes` covers only part of the window.
    Incomplete {
        quotes: Vec<RawQuote>,
        error: FetchError,
    },
    /// Nothing usable was retrieved.
    Failed(FetchError),
}

impl FetchOutcome {
    /// Interpret a bare `(success, samples)` pair from an external fetcher.
    ///
    /// Unsuccessful fetches that still returned samples are treated as
    /// incomplete; successful fetches with no samples as empty payloads.
    pub fn from_flag(success: bool, quotes: Vec<RawQuote>) -> Self {
        match (success, quotes.is_empty()) {
            (true, false) => FetchOutcome::Complete(quotes),
            (true, true) => FetchOutcome::Failed(FetchError::EmptyPayload),
            (false, false) => FetchOutcome::Incomplete {
                quotes,
                error: FetchError::Incomplete {
                    requests: 0,
                    reached_ns: 0,
                },
            },
            (false, true) => {
                FetchOutcome::Failed(FetchError::Transient("fetch reported failure".to_string()))
            }
        }
    }

    /// Whether the full window was retrieved.
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchOutcome::Complete(_))
    }

    /// Retrieved quotes, if any.
    pub fn quotes(&self) -> Option<&[RawQuote]> {
        match self {
            FetchOutcome::Complete(quotes) | FetchOutcome::Incomplete { quotes, .. } => Some(quotes),
            FetchOutcome::Failed(_) => None,
        }
    }

    /// The reason retrieval did not complete.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Complete(_) => None,
            FetchOutcome::Incomplete { error, .. } | FetchOutcome::Failed(error) => Some(error),
        }
    }
}

/// Collects a session's quotes from a [`QuotePageSource`].
pub struct QuoteCollector<S> {
    source: S,
    clock: SessionClock,
    page_size: usize,
    max_requests: u32,
}

impl<S: QuotePageSource> QuoteCollector<S> {
    pub fn new(source: S, clock: SessionClock, config: &FetchConfig) -> Self {
        Self {
            source,
            clock,
            page_size: config.page_size.max(1),
            max_requests: config.max_requests.max(1),
        }
    }

    /// Collect quotes for the full session of `date`.
    ///
    /// Only clock errors are returned as `Err`; retrieval problems are
    /// reported through the outcome.
    pub fn collect(&self, symbol: &str, date: NaiveDate) -> Result<FetchOutcome> {
        let (start_ns, stop_ns) = self.clock.window_ns(date)?;
        self.collect_window(symbol, date, start_ns, stop_ns)
    }

    /// Collect quotes in `[start_ns, stop_ns)`, with offsets measured from the
    /// session open of `date`.
    pub fn collect_window(
        &self,
        symbol: &str,
        date: NaiveDate,
        start_ns: TimestampNs,
        stop_ns: TimestampNs,
    ) -> Result<FetchOutcome> {
        let open_ns = self.clock.open_ns(date)?;
        let mut cursor = start_ns;
        let mut requests = 0u32;
        let mut collected: Vec<TimedQuote> = Vec::new();
        let mut exhausted = false;

        while cursor < stop_ns {
            if requests >= self.max_requests {
                exhausted = true;
                break;
            }
            requests += 1;

            let request = PageRequest {
                symbol,
                date,
                from_ns: cursor,
                limit: self.page_size,
            };
            let page = match self.source.fetch_page(&request) {
                Ok(page) => page,
                Err(error) => {
                    warn!(symbol, %date, cursor, %error, "quote page request failed");
                    return Ok(FetchOutcome::Failed(error));
                }
            };
            let Some(last) = page.last() else {
                warn!(symbol, %date, cursor, "quote page was empty");
                return Ok(FetchOutcome::Failed(FetchError::EmptyPayload));
            };

            // The next page starts at the last timestamp seen, so quotes sharing
            // that instant may repeat. Repeats add zero-length steps only.
            cursor = last.ts_ns;
            let full_page = page.len() >= self.page_size;
            collected.extend(page);
            debug!(symbol, %date, requests, samples = collected.len(), "quote page received");

            if !full_page {
                break;
            }
        }

        let quotes: Vec<RawQuote> = collected
            .into_iter()
            .filter(|q| q.ts_ns < stop_ns)
            .map(|q| RawQuote::new(SessionClock::offset_seconds(open_ns, q.ts_ns), q.bid, q.ask))
            .collect();

        if exhausted {
            warn!(
                symbol,
                %date,
                requests,
                samples = quotes.len(),
                "request budget exhausted before stop time"
            );
            let error = FetchError::Incomplete {
                requests,
                reached_ns: cursor,
            };
            return Ok(if quotes.is_empty() {
                FetchOutcome::Failed(error)
            } else {
                FetchOutcome::Incomplete { quotes, error }
            });
        }

        if quotes.is_empty() {
            return Ok(FetchOutcome::Failed(FetchError::EmptyPayload));
        }
        Ok(FetchOutcome::Complete(quotes))
    }
}
