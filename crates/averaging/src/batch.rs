//! Parallel symbol-day batch runner.
//!
//! Each symbol-day is fetched and aggregated independently on a rayon pool.
//! A failure in one unit is recorded and never touches the others. Results
//! are merged in `(date, symbol)` order whatever order the units finish in.

use rayon::prelude::*;
use spread_core::config::BatchConfig;
use spread_core::{Error, FetchError, Result, SymbolDayKey, SymbolDayTable};
use spread_ingestion::FetchOutcome;
use tracing::{info, warn};

use crate::aggregator::{SymbolDayAggregator, SymbolDayOutcome};

/// A symbol-day the batch could not build.
#[derive(Debug)]
pub struct BatchFailure {
    pub key: SymbolDayKey,
    pub error: Error,
}

/// Merged results of one batch, each list sorted by date then symbol.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Fully covered symbol-days.
    pub built: Vec<SymbolDayTable>,
    /// Partial tables, with the reason the fetch stopped.
    pub incomplete: Vec<(SymbolDayTable, FetchError)>,
    /// Fetch failures and malformed payloads.
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    /// Total symbol-days processed.
    pub fn len(&self) -> usize {
        self.built.len() + self.incomplete.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys worth fetching again later.
    pub fn retryable(&self) -> Vec<&SymbolDayKey> {
        let incomplete = self.incomplete.iter().map(|(table, _)| table.key());
        let failed = self
            .failed
            .iter()
            .filter(|f| matches!(&f.error, Error::Fetch(e) if e.is_retryable()))
            .map(|f| &f.key);
        let mut keys: Vec<&SymbolDayKey> = incomplete.chain(failed).collect();
        keys.sort();
        keys
    }

    fn push(&mut self, key: SymbolDayKey, result: Result<SymbolDayOutcome>) {
        match result {
            Ok(SymbolDayOutcome::Built { table, .. }) => self.built.push(table),
            Ok(SymbolDayOutcome::Incomplete { table, error, .. }) => {
                self.incomplete.push((table, error))
            }
            Ok(SymbolDayOutcome::Skipped { key, error }) => self.failed.push(BatchFailure {
                key,
                error: Error::Fetch(error),
            }),
            Err(error) => {
                warn!(%key, %error, "symbol-day aggregation failed");
                self.failed.push(BatchFailure { key, error });
            }
        }
    }
}

/// Runs the aggregator over many symbol-days.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    aggregator: SymbolDayAggregator,
    workers: usize,
}

impl BatchRunner {
    pub fn new(aggregator: SymbolDayAggregator, config: &BatchConfig) -> Self {
        Self {
            aggregator,
            workers: config.workers,
        }
    }

    pub fn aggregator(&self) -> &SymbolDayAggregator {
        &self.aggregator
    }

    /// Fetch and aggregate every key.
    ///
    /// `fetch` is called concurrently from the pool's threads. Duplicate keys
    /// are processed once. Only a failure to start the pool is an `Err`.
    pub fn run<F>(&self, keys: &[SymbolDayKey], fetch: F) -> Result<BatchReport>
    where
        F: Fn(&SymbolDayKey) -> FetchOutcome + Sync,
    {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::config(format!("failed to start batch pool: {e}")))?;

        let aggregator = &self.aggregator;
        let results: Vec<(SymbolDayKey, Result<SymbolDayOutcome>)> = pool.install(|| {
            keys.into_par_iter()
                .map(|key| {
                    let fetched = fetch(&key);
                    let result = aggregator.aggregate(key.clone(), fetched);
                    (key, result)
                })
                .collect()
        });

        // `collect` keeps input order, and the input is sorted.
        let mut report = BatchReport::default();
        for (key, result) in results {
            report.push(key, result);
        }

        info!(
            workers = pool.current_num_threads(),
            built = report.built.len(),
            incomplete = report.incomplete.len(),
            failed = report.failed.len(),
            "batch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use spread_core::config::AveragingConfig;
    use spread_core::{Config, RawQuote};

    fn make_runner(workers: usize) -> BatchRunner {
        let config = Config {
            averaging: AveragingConfig {
                bucket_seconds: 1.0,
                start_seconds: 0.0,
                end_seconds: 4.0,
            },
            ..Config::default()
        };
        BatchRunner::new(
            SymbolDayAggregator::from_config(&config).unwrap(),
            &BatchConfig { workers },
        )
    }

    fn make_key(day: u32, symbol: &str) -> SymbolDayKey {
        SymbolDayKey::new(NaiveDate::from_ymd_opt(2020, 3, day).unwrap(), symbol)
    }

    fn make_fetch(key: &SymbolDayKey) -> FetchOutcome {
        let quotes = vec![RawQuote::new(0.0, 99.0, 101.0), RawQuote::new(1.0, 99.5, 100.5)];
        match key.symbol.as_str() {
            "BAD" => FetchOutcome::Failed(FetchError::Transient("HTTP 503".to_string())),
            "NONE" => FetchOutcome::Failed(FetchError::EmptyPayload),
            "PART" => FetchOutcome::Incomplete {
                quotes,
                error: FetchError::Incomplete {
                    requests: 200,
                    reached_ns: 0,
                },
            },
            "EMPTY" => FetchOutcome::Complete(vec![]),
            _ => FetchOutcome::Complete(quotes),
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let keys = vec![
            make_key(3, "BAD"),
            make_key(2, "SPY"),
            make_key(2, "EMPTY"),
            make_key(3, "SPY"),
            make_key(2, "PART"),
            make_key(3, "NONE"),
        ];
        let report = make_runner(2).run(&keys, make_fetch).unwrap();

        assert_eq!(report.len(), 6);
        assert_eq!(report.built.len(), 2);
        assert_eq!(report.incomplete.len(), 1);
        assert_eq!(report.failed.len(), 3);
        assert!(matches!(report.failed[0].error, Error::Precondition(_)));
    }

    #[test]
    fn test_results_sorted_by_date_then_symbol() {
        let keys = vec![
            make_key(4, "AAA"),
            make_key(2, "QQQ"),
            make_key(2, "IWM"),
            make_key(3, "DIA"),
        ];
        let report = make_runner(4).run(&keys, make_fetch).unwrap();

        let built: Vec<String> = report.built.iter().map(|t| t.key().to_string()).collect();
        assert_eq!(
            built,
            vec!["2020-03-02_IWM", "2020-03-02_QQQ", "2020-03-03_DIA", "2020-03-04_AAA"]
        );
    }

    #[test]
    fn test_duplicate_keys_processed_once() {
        let keys = vec![make_key(2, "SPY"), make_key(2, "SPY")];
        let report = make_runner(0).run(&keys, make_fetch).unwrap();
        assert_eq!(report.built.len(), 1);
    }

    #[test]
    fn test_retryable_keys() {
        let keys = vec![make_key(2, "PART"), make_key(2, "BAD"), make_key(2, "NONE")];
        let report = make_runner(1).run(&keys, make_fetch).unwrap();

        let retry: Vec<String> = report.retryable().iter().map(|k| k.to_string()).collect();
        assert_eq!(retry, vec!["2020-03-02_BAD", "2020-03-02_PART"]);
    }
}
