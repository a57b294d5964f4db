//! Daily symbol-day aggregation.
//!
//! Turns one already-fetched quote payload into a bucketed table of bid, ask
//! and relative spread, or records why the symbol-day was skipped.

use spread_core::{Config, FetchError, RawQuote, Result, SymbolDayKey, SymbolDayTable};
use spread_ingestion::{FetchOutcome, SpreadStats, SpreadTransform};
use tracing::{debug, warn};

use crate::averager::TimeAverager;

/// What became of one symbol-day.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolDayOutcome {
    /// All quotes up to the stop time were averaged.
    Built {
        table: SymbolDayTable,
        stats: SpreadStats,
    },
    /// The fetch stopped early; the table covers the partial quotes only.
    Incomplete {
        table: SymbolDayTable,
        stats: SpreadStats,
        error: FetchError,
    },
    /// Nothing was built.
    Skipped { key: SymbolDayKey, error: FetchError },
}

impl SymbolDayOutcome {
    pub fn key(&self) -> &SymbolDayKey {
        match self {
            SymbolDayOutcome::Built { table, .. } | SymbolDayOutcome::Incomplete { table, .. } => {
                table.key()
            }
            SymbolDayOutcome::Skipped { key, .. } => key,
        }
    }

    /// The built table, partial or not.
    pub fn table(&self) -> Option<&SymbolDayTable> {
        match self {
            SymbolDayOutcome::Built { table, .. } | SymbolDayOutcome::Incomplete { table, .. } => {
                Some(table)
            }
            SymbolDayOutcome::Skipped { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            SymbolDayOutcome::Built { .. } => None,
            SymbolDayOutcome::Incomplete { error, .. } | SymbolDayOutcome::Skipped { error, .. } => {
                Some(error)
            }
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, SymbolDayOutcome::Built { .. })
    }
}

/// Builds symbol-day tables on one shared bucket grid.
#[derive(Debug, Clone, Copy)]
pub struct SymbolDayAggregator {
    transform: SpreadTransform,
    averager: TimeAverager,
}

impl SymbolDayAggregator {
    pub fn new(transform: SpreadTransform, averager: TimeAverager) -> Self {
        Self {
            transform,
            averager,
        }
    }

    /// Create an aggregator from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            SpreadTransform::new(config.spread.degenerate),
            TimeAverager::from_config(&config.averaging)?,
        ))
    }

    pub fn averager(&self) -> &TimeAverager {
        &self.averager
    }

    /// Average bid, ask and spread of `quotes` into one table.
    pub fn build_table(
        &self,
        key: SymbolDayKey,
        quotes: &[RawQuote],
    ) -> Result<(SymbolDayTable, SpreadStats)> {
        let series = self.transform.apply(quotes)?;
        let bid = self.averager.average(&series.bid)?;
        let ask = self.averager.average(&series.ask)?;
        let spread = self.averager.average(&series.spread)?;
        let table = SymbolDayTable::from_series(key, &bid, &ask, &spread)?;
        Ok((table, series.stats))
    }

    /// Aggregate one fetch result.
    ///
    /// Fetch problems become [`SymbolDayOutcome::Skipped`] or
    /// [`SymbolDayOutcome::Incomplete`]; only malformed quote data is an `Err`.
    pub fn aggregate(&self, key: SymbolDayKey, fetch: FetchOutcome) -> Result<SymbolDayOutcome> {
        match fetch {
            FetchOutcome::Complete(quotes) if quotes.is_empty() => {
                warn!(%key, "symbol-day skipped: no quotes");
                Ok(SymbolDayOutcome::Skipped {
                    key,
                    error: FetchError::EmptyPayload,
                })
            }
            FetchOutcome::Incomplete { quotes, error } if quotes.is_empty() => {
                warn!(%key, %error, "symbol-day skipped: no quotes before the fetch stopped");
                Ok(SymbolDayOutcome::Skipped { key, error })
            }
            FetchOutcome::Complete(quotes) => {
                let (table, stats) = self.build_table(key, &quotes)?;
                debug!(
                    key = %table.key(),
                    samples = stats.samples,
                    buckets = table.rows().len(),
                    "symbol-day built"
                );
                Ok(SymbolDayOutcome::Built { table, stats })
            }
            FetchOutcome::Incomplete { quotes, error } => {
                let (table, stats) = self.build_table(key, &quotes)?;
                warn!(key = %table.key(), samples = stats.samples, %error, "symbol-day incomplete");
                Ok(SymbolDayOutcome::Incomplete {
                    table,
                    stats,
                    error,
                })
            }
            FetchOutcome::Failed(error) => {
                warn!(%key, %error, "symbol-day skipped");
                Ok(SymbolDayOutcome::Skipped { key, error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use spread_core::config::AveragingConfig;
    use spread_core::{Error, SpreadField};

    fn make_key() -> SymbolDayKey {
        SymbolDayKey::new(NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(), "SPY")
    }

    fn make_aggregator() -> SymbolDayAggregator {
        let config = Config {
            averaging: AveragingConfig {
                bucket_seconds: 1.0,
                start_seconds: 0.0,
                end_seconds: 4.0,
            },
            ..Config::default()
        };
        SymbolDayAggregator::from_config(&config).unwrap()
    }

    fn make_quotes() -> Vec<RawQuote> {
        vec![
            RawQuote::new(0.0, 99.0, 101.0),
            RawQuote::new(2.0, 100.0, 100.0),
        ]
    }

    #[test]
    fn test_complete_fetch_builds_table() {
        let outcome = make_aggregator()
            .aggregate(make_key(), FetchOutcome::Complete(make_quotes()))
            .unwrap();

        assert!(outcome.is_built());
        let table = outcome.table().unwrap();
        assert_eq!(table.rows().len(), 4);
        assert_eq!(table.rows()[0].offset_seconds, 0.5);
        assert_eq!(table.column(SpreadField::Bid), vec![99.0, 99.0, 100.0, 100.0]);
        assert_eq!(table.column(SpreadField::Ask), vec![101.0, 101.0, 100.0, 100.0]);
        let spread = table.column(SpreadField::RelativeSpread);
        assert_relative_eq!(spread[0], 0.02);
        assert_eq!(spread[3], 0.0);
    }

    #[test]
    fn test_incomplete_fetch_keeps_partial_table() {
        let error = FetchError::Incomplete {
            requests: 200,
            reached_ns: 42,
        };
        let outcome = make_aggregator()
            .aggregate(
                make_key(),
                FetchOutcome::Incomplete {
                    quotes: make_quotes(),
                    error: error.clone(),
                },
            )
            .unwrap();

        assert!(!outcome.is_built());
        assert_eq!(outcome.table().unwrap().rows().len(), 4);
        assert_eq!(outcome.error(), Some(&error));
    }

    #[test]
    fn test_failed_fetch_is_skipped() {
        let outcome = make_aggregator()
            .aggregate(make_key(), FetchOutcome::Failed(FetchError::EmptyPayload))
            .unwrap();

        assert_eq!(outcome.key(), &make_key());
        assert!(outcome.table().is_none());
        assert_eq!(outcome.error(), Some(&FetchError::EmptyPayload));
    }

    #[test]
    fn test_empty_complete_payload_is_skipped() {
        let outcome = make_aggregator()
            .aggregate(make_key(), FetchOutcome::Complete(vec![]))
            .unwrap();
        assert!(matches!(outcome, SymbolDayOutcome::Skipped { .. }));
        assert_eq!(outcome.error(), Some(&FetchError::EmptyPayload));
        assert!(outcome.table().is_none());
    }

    #[test]
    fn test_empty_incomplete_payload_is_skipped() {
        let error = FetchError::Incomplete {
            requests: 3,
            reached_ns: 0,
        };
        let outcome = make_aggregator()
            .aggregate(
                make_key(),
                FetchOutcome::Incomplete {
                    quotes: vec![],
                    error: error.clone(),
                },
            )
            .unwrap();
        assert_eq!(outcome.error(), Some(&error));
        assert!(!outcome.is_built());
    }

    #[test]
    fn test_unsorted_quotes_are_an_error() {
        let quotes = vec![RawQuote::new(2.0, 99.0, 101.0), RawQuote::new(1.0, 99.0, 101.0)];
        let err = make_aggregator()
            .aggregate(make_key(), FetchOutcome::Complete(quotes))
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_degenerate_quotes_counted() {
        let quotes = vec![RawQuote::new(0.0, 99.0, 101.0), RawQuote::new(1.0, 0.0, 0.0)];
        let (table, stats) = make_aggregator().build_table(make_key(), &quotes).unwrap();
        assert_eq!(stats.degenerate, 1);
        assert!(table.column(SpreadField::RelativeSpread)[1].is_nan());
    }
}
