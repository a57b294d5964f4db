//! PyO3 bindings for the quoted-spread engine.
//!
//! Exposes the Rust implementation to Python:
//! - Time-weighted bucket averaging
//! - Relative spread
//! - Symbol-day aggregation and persistence
//! - Consolidation of a data directory

use chrono::NaiveDate;
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use tracing_subscriber::EnvFilter;

use spread_averaging::{SymbolDayAggregator, SymbolDayOutcome, TimeAverager};
use spread_consolidation::{
    write_consolidated, ConsolidatedTable as RustConsolidatedTable, Consolidator, DataDir,
};
use spread_core::config::{AveragingConfig, ConsolidationConfig};
use spread_core::{
    BucketGrid, Config, DegenerateSpreadPolicy, Error, MissingPolicy, RawQuote as RustRawQuote,
    SpreadField, StepSeries, SymbolDayKey, SymbolDayTable as RustSymbolDayTable,
};
use spread_ingestion::FetchOutcome;

// ============================================================================
// Error and Argument Conversion
// ============================================================================

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::MissingTable { .. } => PyKeyError::new_err(err.to_string()),
        Error::Io(_) | Error::Csv(_) => PyIOError::new_err(err.to_string()),
        Error::Config(_) | Error::Precondition(_) | Error::Data(_) | Error::GridMismatch(_) => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_date(date: &str) -> PyResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| PyValueError::new_err(format!("invalid date {date:?}: {e}")))
}

fn parse_field(field: &str) -> PyResult<SpreadField> {
    match field {
        "bid" => Ok(SpreadField::Bid),
        "ask" => Ok(SpreadField::Ask),
        "relative_spread" | "relative spread" => Ok(SpreadField::RelativeSpread),
        other => Err(PyValueError::new_err(format!("unknown field {other:?}"))),
    }
}

fn parse_missing(missing: &str) -> PyResult<MissingPolicy> {
    match missing {
        "raise" => Ok(MissingPolicy::Raise),
        "warn_and_skip" => Ok(MissingPolicy::WarnAndSkip),
        "silent_skip" => Ok(MissingPolicy::SilentSkip),
        other => Err(PyValueError::new_err(format!("unknown missing policy {other:?}"))),
    }
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// A quote at an offset in seconds from the session open.
#[pyclass]
#[derive(Clone)]
pub struct Quote {
    #[pyo3(get, set)]
    pub offset_seconds: f64,
    #[pyo3(get, set)]
    pub bid: f64,
    #[pyo3(get, set)]
    pub ask: f64,
}

#[pymethods]
impl Quote {
    #[new]
    fn new(offset_seconds: f64, bid: f64, ask: f64) -> Self {
        Quote {
            offset_seconds,
            bid,
            ask,
        }
    }

    #[getter]
    fn relative_spread(&self) -> f64 {
        spread_ingestion::relative_spread(self.bid, self.ask)
    }

    fn __repr__(&self) -> String {
        format!(
            "Quote(offset_seconds={}, bid={}, ask={})",
            self.offset_seconds, self.bid, self.ask
        )
    }
}

impl From<Quote> for RustRawQuote {
    fn from(q: Quote) -> Self {
        RustRawQuote::new(q.offset_seconds, q.bid, q.ask)
    }
}

/// Bucketed bid, ask and relative spread for one symbol-day.
#[pyclass]
pub struct SymbolDayTable {
    inner: RustSymbolDayTable,
    /// False when the fetch stopped before the end of the session.
    #[pyo3(get)]
    complete: bool,
}

#[pymethods]
impl SymbolDayTable {
    #[getter]
    fn date(&self) -> String {
        self.inner.key().date.format("%Y-%m-%d").to_string()
    }

    #[getter]
    fn symbol(&self) -> String {
        self.inner.key().symbol.clone()
    }

    #[getter]
    fn offset_seconds(&self) -> Vec<f64> {
        self.inner.rows().iter().map(|r| r.offset_seconds).collect()
    }

    #[getter]
    fn bid(&self) -> Vec<f64> {
        self.inner.column(SpreadField::Bid)
    }

    #[getter]
    fn ask(&self) -> Vec<f64> {
        self.inner.column(SpreadField::Ask)
    }

    #[getter]
    fn relative_spread(&self) -> Vec<f64> {
        self.inner.column(SpreadField::RelativeSpread)
    }

    /// Write the table into `data_dir`; returns the file path.
    fn save(&self, data_dir: &str) -> PyResult<String> {
        let path = DataDir::new(data_dir)
            .write_table(&self.inner)
            .map_err(to_py_err)?;
        Ok(path.display().to_string())
    }

    fn __len__(&self) -> usize {
        self.inner.rows().len()
    }

    fn __repr__(&self) -> String {
        format!(
            "SymbolDayTable(key={}, buckets={}, complete={})",
            self.inner.key(),
            self.inner.rows().len(),
            self.complete
        )
    }
}

/// Wide table of many symbol-days on one market-time axis.
#[pyclass]
#[derive(Clone)]
pub struct ConsolidatedTable {
    /// `YYYY-MM-DD HH:MM:SS.fff` timestamps.
    #[pyo3(get)]
    pub timestamps: Vec<String>,
    /// `YYYY-MM-DD_SYMBOL` column names.
    #[pyo3(get)]
    pub columns: Vec<String>,
    /// One list of values per column.
    #[pyo3(get)]
    pub values: Vec<Vec<f64>>,
    /// Requested symbol-days that had no file.
    #[pyo3(get)]
    pub missing: Vec<String>,
}

#[pymethods]
impl ConsolidatedTable {
    fn __repr__(&self) -> String {
        format!(
            "ConsolidatedTable(rows={}, columns={}, missing={})",
            self.timestamps.len(),
            self.columns.len(),
            self.missing.len()
        )
    }
}

impl ConsolidatedTable {
    fn from_rust(table: &RustConsolidatedTable, missing: &[SymbolDayKey]) -> Self {
        ConsolidatedTable {
            timestamps: table
                .index()
                .iter()
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
                .collect(),
            columns: table.keys().map(SymbolDayKey::file_stem).collect(),
            values: table.columns().values().cloned().collect(),
            missing: missing.iter().map(SymbolDayKey::file_stem).collect(),
        }
    }
}

// ============================================================================
// Engine Classes
// ============================================================================

/// Symbol-day aggregator bound to one bucket grid.
#[pyclass]
pub struct PySymbolDayAggregator {
    inner: SymbolDayAggregator,
}

#[pymethods]
impl PySymbolDayAggregator {
    #[new]
    #[pyo3(signature = (bucket_seconds=5.0, start_seconds=0.0, end_seconds=23400.0, hold_previous=false))]
    fn new(
        bucket_seconds: f64,
        start_seconds: f64,
        end_seconds: f64,
        hold_previous: bool,
    ) -> PyResult<Self> {
        let mut config = Config::default();
        config.averaging = AveragingConfig {
            bucket_seconds,
            start_seconds,
            end_seconds,
        };
        if hold_previous {
            config.spread.degenerate = DegenerateSpreadPolicy::HoldPrevious;
        }
        Ok(PySymbolDayAggregator {
            inner: SymbolDayAggregator::from_config(&config).map_err(to_py_err)?,
        })
    }

    /// Aggregate one fetched payload.
    ///
    /// Returns `None` when the fetch failed without quotes. A failed fetch
    /// that still returned quotes gives a table with `complete = False`.
    fn aggregate(
        &self,
        date: &str,
        symbol: &str,
        quotes: Vec<Quote>,
        success: bool,
    ) -> PyResult<Option<SymbolDayTable>> {
        let key = SymbolDayKey::new(parse_date(date)?, symbol);
        let quotes: Vec<RustRawQuote> = quotes.into_iter().map(|q| q.into()).collect();
        let outcome = self
            .inner
            .aggregate(key, FetchOutcome::from_flag(success, quotes))
            .map_err(to_py_err)?;

        Ok(match outcome {
            SymbolDayOutcome::Built { table, .. } => Some(SymbolDayTable {
                inner: table,
                complete: true,
            }),
            SymbolDayOutcome::Incomplete { table, .. } => Some(SymbolDayTable {
                inner: table,
                complete: false,
            }),
            SymbolDayOutcome::Skipped { .. } => None,
        })
    }

    /// Number of buckets per table.
    fn buckets(&self) -> usize {
        self.inner.averager().grid().len()
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Time-weighted average of a step function; returns `(midpoints, averages)`.
#[pyfunction]
#[pyo3(signature = (offsets, values, width=5.0, start=0.0, end=23400.0))]
fn time_average(
    offsets: Vec<f64>,
    values: Vec<f64>,
    width: f64,
    start: f64,
    end: f64,
) -> PyResult<(Vec<f64>, Vec<f64>)> {
    let series = StepSeries::from_parts(&offsets, &values).map_err(to_py_err)?;
    let grid = BucketGrid::new(width, start, end).map_err(to_py_err)?;
    let averaged = TimeAverager::new(grid).average(&series).map_err(to_py_err)?;
    Ok(averaged.iter().unzip())
}

/// `2 * (ask - bid) / (ask + bid)`, NaN when undefined.
#[pyfunction]
fn relative_spread(bid: f64, ask: f64) -> f64 {
    spread_ingestion::relative_spread(bid, ask)
}

/// Build one symbol-day table from parallel offset, bid and ask lists.
#[pyfunction]
#[pyo3(signature = (date, symbol, offsets, bids, asks, success=true, bucket_seconds=5.0, hold_previous=false))]
#[allow(clippy::too_many_arguments)]
fn build_symbol_day(
    date: &str,
    symbol: &str,
    offsets: Vec<f64>,
    bids: Vec<f64>,
    asks: Vec<f64>,
    success: bool,
    bucket_seconds: f64,
    hold_previous: bool,
) -> PyResult<Option<SymbolDayTable>> {
    if offsets.len() != bids.len() || offsets.len() != asks.len() {
        return Err(PyValueError::new_err(format!(
            "length mismatch: {} offsets, {} bids, {} asks",
            offsets.len(),
            bids.len(),
            asks.len()
        )));
    }
    let quotes = offsets
        .into_iter()
        .zip(bids)
        .zip(asks)
        .map(|((offset_seconds, bid), ask)| Quote::new(offset_seconds, bid, ask))
        .collect();

    let defaults = AveragingConfig::default();
    PySymbolDayAggregator::new(
        bucket_seconds,
        defaults.start_seconds,
        defaults.end_seconds,
        hold_previous,
    )?
    .aggregate(date, symbol, quotes, success)
}

/// Consolidate the symbol-day files of `data_dir`.
///
/// `dates` and `symbols` default to everything found on disk. With
/// `bucket_seconds` every file must sit on that grid over the default session;
/// otherwise the grid is inferred from each file. When `output` is given the
/// table is also written there as CSV.
#[pyfunction]
#[pyo3(signature = (
    data_dir,
    dates=None,
    symbols=None,
    field="relative_spread",
    resample_seconds=Some(60.0),
    missing="warn_and_skip",
    output=None,
    bucket_seconds=None
))]
fn consolidate_directory(
    data_dir: &str,
    dates: Option<Vec<String>>,
    symbols: Option<Vec<String>>,
    field: &str,
    resample_seconds: Option<f64>,
    missing: &str,
    output: Option<&str>,
    bucket_seconds: Option<f64>,
) -> PyResult<ConsolidatedTable> {
    let mut data = DataDir::new(data_dir);
    if let Some(width) = bucket_seconds {
        let defaults = AveragingConfig::default();
        let grid = BucketGrid::new(width, defaults.start_seconds, defaults.end_seconds)
            .map_err(to_py_err)?;
        data = data.with_grid(grid);
    }
    let (found_dates, found_symbols) = data.discover_dates_symbols().map_err(to_py_err)?;

    let dates = match dates {
        Some(dates) => dates
            .iter()
            .map(|d| parse_date(d))
            .collect::<PyResult<Vec<_>>>()?,
        None => found_dates,
    };
    let symbols = symbols.unwrap_or(found_symbols);

    let consolidator = Consolidator::new(ConsolidationConfig {
        field: parse_field(field)?,
        resample_seconds,
        missing: parse_missing(missing)?,
        ..ConsolidationConfig::default()
    });
    let report = consolidator
        .consolidate(&SymbolDayKey::product(&dates, &symbols), &data)
        .map_err(to_py_err)?;

    if let Some(path) = output {
        write_consolidated(&report.table, path).map_err(to_py_err)?;
    }
    Ok(ConsolidatedTable::from_rust(&report.table, &report.missing))
}

/// Install a tracing subscriber; `RUST_LOG` wins over `level`.
///
/// Returns False when a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .try_init()
        .is_ok()
}

// ============================================================================
// Module Definition
// ============================================================================

/// Quoted Spread Core - time-weighted spread resampling in Rust.
#[pymodule]
fn quoted_spread_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Types
    m.add_class::<Quote>()?;
    m.add_class::<SymbolDayTable>()?;
    m.add_class::<ConsolidatedTable>()?;

    // Engine classes
    m.add_class::<PySymbolDayAggregator>()?;

    // Functions
    m.add_function(wrap_pyfunction!(time_average, m)?)?;
    m.add_function(wrap_pyfunction!(relative_spread, m)?)?;
    m.add_function(wrap_pyfunction!(build_symbol_day, m)?)?;
    m.add_function(wrap_pyfunction!(consolidate_directory, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
