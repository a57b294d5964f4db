//! Fetch, aggregate, persist and consolidate a small batch end to end.

use chrono::{NaiveDate, NaiveTime};
use spread_averaging::{BatchRunner, SymbolDayAggregator};
use spread_consolidation::{read_consolidated, write_consolidated, Consolidator, DataDir};
use spread_core::config::{AveragingConfig, FetchConfig};
use spread_core::{Config, FetchError, MissingPolicy, SpreadField, SymbolDayKey};
use spread_ingestion::{
    valid_trading_days, FetchOutcome, MarketSession, PageRequest, QuoteCollector,
    QuotePageSource, SessionClock, TimedQuote,
};
use tempfile::tempdir;

const SECOND: i64 = 1_000_000_000;

/// Ten quotes 30s apart from the open. SPY keeps a 2% spread; QQQ alternates
/// between 2% and 1%.
struct SyntheticFeed {
    clock: SessionClock,
}

impl QuotePageSource for SyntheticFeed {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<TimedQuote>, FetchError> {
        if request.symbol == "FAIL" {
            return Err(FetchError::Transient("HTTP 503".to_string()));
        }
        let open = self
            .clock
            .open_ns(request.date)
            .map_err(|e| FetchError::Rejected(e.to_string()))?;

        Ok((0..10)
            .map(|k| {
                let (bid, ask) = match (request.symbol, k % 2) {
                    ("QQQ", 1) => (99.5, 100.5),
                    _ => (99.0, 101.0),
                };
                TimedQuote {
                    ts_ns: open + k * 30 * SECOND,
                    bid,
                    ask,
                }
            })
            .filter(|q| q.ts_ns >= request.from_ns)
            .take(request.limit)
            .collect())
    }
}

fn make_config() -> Config {
    let mut config = Config {
        averaging: AveragingConfig {
            bucket_seconds: 60.0,
            start_seconds: 0.0,
            end_seconds: 300.0,
        },
        fetch: FetchConfig {
            page_size: 4,
            max_requests: 10,
        },
        ..Config::default()
    };
    config.consolidation.resample_seconds = None;
    config
}

fn make_calendar() -> Vec<MarketSession> {
    let regular = |day| MarketSession {
        date: NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
        open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    };
    let mut half_day = regular(6);
    half_day.close = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    vec![regular(2), regular(3), half_day]
}

#[test]
fn test_pipeline_end_to_end() {
    let config = make_config();
    config.validate().unwrap();

    let dates = valid_trading_days(
        &make_calendar(),
        &config.session,
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
    )
    .unwrap();
    assert_eq!(dates.len(), 2);

    let symbols = vec!["SPY".to_string(), "QQQ".to_string(), "FAIL".to_string()];
    let keys = SymbolDayKey::product(&dates, &symbols);

    let clock = SessionClock::new(&config.session).unwrap();
    let collector = QuoteCollector::new(SyntheticFeed { clock }, clock, &config.fetch);
    let runner = BatchRunner::new(SymbolDayAggregator::from_config(&config).unwrap(), &config.batch);

    let report = runner
        .run(&keys, |key| {
            collector
                .collect(&key.symbol, key.date)
                .unwrap_or_else(|e| FetchOutcome::Failed(FetchError::Rejected(e.to_string())))
        })
        .unwrap();
    assert_eq!(report.built.len(), 4);
    assert!(report.incomplete.is_empty());
    assert_eq!(report.failed.len(), 2);

    let dir = tempdir().unwrap();
    let data = DataDir::new(dir.path().join("data"));
    data.write_batch(&report).unwrap();
    assert_eq!(data.discover().unwrap().len(), 4);
    assert!(data.pending(&keys).iter().all(|k| k.symbol == "FAIL"));

    // Ask for everything, including the symbol-days that failed.
    let mut consolidation = config.consolidation.clone();
    consolidation.missing = MissingPolicy::SilentSkip;
    let result = Consolidator::new(consolidation.clone())
        .consolidate(&keys, &data)
        .unwrap();

    assert_eq!(result.missing.len(), 2);
    let table = result.table;
    assert_eq!(table.width(), 4);
    assert_eq!(table.len(), 5);
    assert_eq!(
        table.index()[0],
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(9, 30, 30).unwrap()
    );
    let qqq = table.column(&SymbolDayKey::new(dates[0], "QQQ")).unwrap();
    assert!(qqq.iter().all(|v| (v - 0.015).abs() < 1e-10));
    let spy = table.column(&SymbolDayKey::new(dates[1], "SPY")).unwrap();
    assert!(spy.iter().all(|v| (v - 0.02).abs() < 1e-10));

    // Coarser resample of the same files.
    consolidation.resample_seconds = Some(120.0);
    let coarse = Consolidator::new(consolidation)
        .consolidate(&data.discover().unwrap(), &data)
        .unwrap()
        .table;
    assert_eq!(coarse.len(), 3);
    assert_eq!(
        coarse.index()[0],
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(9, 31, 0).unwrap()
    );

    let out = dir.path().join("quoted_spread.csv");
    write_consolidated(&coarse, &out).unwrap();
    let back = read_consolidated(&out).unwrap();
    assert_eq!(back.index(), coarse.index());
    assert_eq!(back.width(), 4);
}

#[test]
fn test_missing_table_raises() {
    let dir = tempdir().unwrap();
    let data = DataDir::new(dir.path());
    let mut config = make_config();
    config.consolidation.missing = MissingPolicy::Raise;

    let key = SymbolDayKey::new(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), "SPY");
    let err = Consolidator::new(config.consolidation)
        .consolidate(&[key], &data)
        .unwrap_err();
    assert_eq!(err.to_string(), "Missing table for SPY on 2020-01-02");
}

#[test]
fn test_persisted_bid_column() {
    let config = make_config();
    let clock = SessionClock::new(&config.session).unwrap();
    let collector = QuoteCollector::new(SyntheticFeed { clock }, clock, &config.fetch);
    let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();

    let fetched = collector.collect("QQQ", date).unwrap();
    assert!(fetched.is_complete());

    let aggregator = SymbolDayAggregator::from_config(&config).unwrap();
    let (table, stats) = aggregator
        .build_table(SymbolDayKey::new(date, "QQQ"), fetched.quotes().unwrap())
        .unwrap();
    assert_eq!(stats.degenerate, 0);

    let dir = tempdir().unwrap();
    let data = DataDir::new(dir.path());
    data.write_table(&table).unwrap();
    let back = data.read_table(table.key()).unwrap().unwrap();
    let bids = back.column(SpreadField::Bid);
    assert!(bids.iter().all(|v| (v - 99.25).abs() < 1e-10));
}

#[test]
fn test_single_bucket_day_consolidates_from_disk() {
    let dir = tempdir().unwrap();
    let mut config = make_config();
    config.averaging.bucket_seconds = 300.0;
    config.storage.data_dir = dir.path().to_path_buf();

    let clock = SessionClock::new(&config.session).unwrap();
    let collector = QuoteCollector::new(SyntheticFeed { clock }, clock, &config.fetch);
    let aggregator = SymbolDayAggregator::from_config(&config).unwrap();
    let data = DataDir::from_config(&config).unwrap();

    let key = SymbolDayKey::new(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), "SPY");
    let fetched = collector.collect(&key.symbol, key.date).unwrap();
    let (table, _) = aggregator.build_table(key.clone(), fetched.quotes().unwrap()).unwrap();
    assert_eq!(table.rows().len(), 1);
    data.write_table(&table).unwrap();

    let table = Consolidator::new(config.consolidation.clone())
        .consolidate(&[key.clone()], &data)
        .unwrap()
        .table;
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.index()[0],
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(9, 32, 30).unwrap()
    );
    assert!((table.column(&key).unwrap()[0] - 0.02).abs() < 1e-10);
}
