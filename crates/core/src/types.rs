//! Core data types for the quoted-spread workspace.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Seconds elapsed since a fixed reference instant (usually the session open).
pub type OffsetSeconds = f64;

/// Timestamp in nanoseconds since Unix epoch (UTC).
pub type TimestampNs = i64;

/// Relative tolerance used when snapping bucket counts and comparing grids.
const GRID_TOLERANCE: f64 = 1e-9;

/// Largest bucket count whose averages still fit in one allocation.
pub const MAX_BUCKETS: usize = isize::MAX as usize / std::mem::size_of::<f64>();

/// A single bid/ask observation for one symbol on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    /// Seconds after the session open.
    pub offset_seconds: OffsetSeconds,
    /// Best bid price.
    pub bid: f64,
    /// Best ask price.
    pub ask: f64,
}

impl RawQuote {
    pub fn new(offset_seconds: OffsetSeconds, bid: f64, ask: f64) -> Self {
        Self {
            offset_seconds,
            bid,
            ask,
        }
    }
}

/// Piecewise-constant function sampled at irregular instants.
///
/// Each value holds from its offset until the next sample's offset. Offsets are
/// non-decreasing and the series always has at least one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSeries {
    points: Vec<(OffsetSeconds, f64)>,
}

impl StepSeries {
    /// Build a series from `(offset, value)` pairs already sorted by offset.
    pub fn new(points: Vec<(OffsetSeconds, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::precondition("step series needs at least one sample"));
        }
        if let Some(bad) = points.iter().find(|(t, _)| !t.is_finite()) {
            return Err(Error::precondition(format!(
                "non-finite sample offset {}",
                bad.0
            )));
        }
        if let Some(i) = points.windows(2).position(|w| w[1].0 < w[0].0) {
            return Err(Error::precondition(format!(
                "sample offsets not sorted: {} follows {}",
                points[i + 1].0,
                points[i].0
            )));
        }
        Ok(Self { points })
    }

    /// Build a series from parallel offset and value slices.
    pub fn from_parts(offsets: &[OffsetSeconds], values: &[f64]) -> Result<Self> {
        if offsets.len() != values.len() {
            return Err(Error::precondition(format!(
                "{} offsets but {} values",
                offsets.len(),
                values.len()
            )));
        }
        Self::new(offsets.iter().copied().zip(values.iter().copied()).collect())
    }

    /// Samples in offset order.
    pub fn points(&self) -> &[(OffsetSeconds, f64)] {
        &self.points
    }

    /// First sample.
    pub fn first(&self) -> (OffsetSeconds, f64) {
        self.points[0]
    }

    /// Last sample.
    pub fn last(&self) -> (OffsetSeconds, f64) {
        self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Uniform partition of a time range into fixed-width buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketGrid {
    start: OffsetSeconds,
    width: f64,
    count: usize,
}

impl BucketGrid {
    /// Partition `[start, end]` into `ceil((end - start) / width)` buckets.
    pub fn new(width: f64, start: OffsetSeconds, end: OffsetSeconds) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::precondition(format!(
                "bucket width must be positive, got {width}"
            )));
        }
        if !(start.is_finite() && end.is_finite()) || start >= end {
            return Err(Error::precondition(format!(
                "start ({start}) must be before end ({end})"
            )));
        }

        let ratio = (end - start) / width;
        let nearest = ratio.round();
        let count = if (ratio - nearest).abs() <= GRID_TOLERANCE * nearest.max(1.0) {
            nearest
        } else {
            ratio.ceil()
        };
        if !count.is_finite() || count > MAX_BUCKETS as f64 {
            return Err(Error::precondition(format!(
                "{width}s buckets over [{start}, {end}] give too many buckets ({ratio})"
            )));
        }

        Self::with_count(start, width, count as usize)
    }

    /// Grid of `count` buckets of `width` starting at `start`.
    pub fn with_count(start: OffsetSeconds, width: f64, count: usize) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::precondition(format!(
                "bucket width must be positive, got {width}"
            )));
        }
        if count == 0 {
            return Err(Error::precondition("bucket grid needs at least one bucket"));
        }
        if count > MAX_BUCKETS {
            return Err(Error::precondition(format!(
                "bucket count {count} exceeds the limit of {MAX_BUCKETS}"
            )));
        }
        Ok(Self {
            start,
            width,
            count,
        })
    }

    pub fn start(&self) -> OffsetSeconds {
        self.start
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Left edge of bucket `k` (`k == len()` gives the closing edge).
    #[inline]
    pub fn edge(&self, k: usize) -> OffsetSeconds {
        self.start + k as f64 * self.width
    }

    /// Closing edge of the last bucket.
    pub fn end(&self) -> OffsetSeconds {
        self.edge(self.count)
    }

    /// Midpoint of bucket `k`.
    #[inline]
    pub fn midpoint(&self, k: usize) -> OffsetSeconds {
        self.start + self.width / 2.0 + k as f64 * self.width
    }

    /// Midpoints of all buckets in order.
    pub fn midpoints(&self) -> impl Iterator<Item = OffsetSeconds> + '_ {
        (0..self.count).map(move |k| self.midpoint(k))
    }

    /// Whether two grids describe the same buckets, up to float noise.
    pub fn matches(&self, other: &BucketGrid) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= GRID_TOLERANCE * a.abs().max(b.abs()).max(1.0);
        self.count == other.count && close(self.start, other.start) && close(self.width, other.width)
    }
}

/// Fixed-width bucket averages of a step function.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedSeries {
    grid: BucketGrid,
    values: Vec<f64>,
}

impl BucketedSeries {
    /// Pair a grid with one value per bucket.
    pub fn new(grid: BucketGrid, values: Vec<f64>) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(Error::precondition(format!(
                "grid has {} buckets but {} values were given",
                grid.len(),
                values.len()
            )));
        }
        Ok(Self { grid, values })
    }

    pub fn grid(&self) -> &BucketGrid {
        &self.grid
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(midpoint, average)` pairs in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (OffsetSeconds, f64)> + '_ {
        self.grid.midpoints().zip(self.values.iter().copied())
    }

    /// Sum of `average * width` over all buckets.
    pub fn integral(&self) -> f64 {
        self.values.iter().sum::<f64>() * self.grid.width()
    }
}

/// Identifies one symbol on one trading day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolDayKey {
    /// Trading date.
    pub date: NaiveDate,
    /// Ticker symbol.
    pub symbol: String,
}

impl SymbolDayKey {
    pub fn new(date: NaiveDate, symbol: impl Into<String>) -> Self {
        Self {
            date,
            symbol: symbol.into(),
        }
    }

    /// Every `(date, symbol)` combination, sorted by date then symbol.
    pub fn product(dates: &[NaiveDate], symbols: &[String]) -> Vec<SymbolDayKey> {
        let mut keys: Vec<SymbolDayKey> = dates
            .iter()
            .flat_map(|d| symbols.iter().map(move |s| SymbolDayKey::new(*d, s.clone())))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// File stem in `YYYY-MM-DD_SYMBOL` form.
    pub fn file_stem(&self) -> String {
        self.to_string()
    }

    /// Parse a `YYYY-MM-DD_SYMBOL` stem; the symbol must be 2-6 uppercase letters.
    pub fn parse_file_stem(stem: &str) -> Option<Self> {
        let (date, symbol) = stem.split_once('_')?;
        if date.len() != 10 {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        let valid_symbol = (2..=6).contains(&symbol.len())
            && symbol.chars().all(|c| c.is_ascii_uppercase());
        valid_symbol.then(|| SymbolDayKey::new(date, symbol))
    }
}

impl fmt::Display for SymbolDayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date.format("%Y-%m-%d"), self.symbol)
    }
}

/// Column of a symbol-day table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadField {
    Bid,
    Ask,
    RelativeSpread,
}

impl SpreadField {
    /// Header used in persisted symbol-day files.
    pub fn column_name(self) -> &'static str {
        match self {
            SpreadField::Bid => "bid",
            SpreadField::Ask => "ask",
            SpreadField::RelativeSpread => "relative spread",
        }
    }
}

/// One bucket of a symbol-day table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolDayRow {
    /// Bucket midpoint, seconds after the session open.
    pub offset_seconds: OffsetSeconds,
    /// Time-weighted average bid.
    pub bid: f64,
    /// Time-weighted average ask.
    pub ask: f64,
    /// Time-weighted average of `2 * (ask - bid) / (ask + bid)`.
    #[serde(rename = "relative spread")]
    pub relative_spread: f64,
}

impl SymbolDayRow {
    /// Value of one column.
    #[inline]
    pub fn get(&self, field: SpreadField) -> f64 {
        match field {
            SpreadField::Bid => self.bid,
            SpreadField::Ask => self.ask,
            SpreadField::RelativeSpread => self.relative_spread,
        }
    }
}

/// Bucketed bid, ask and relative spread for one symbol-day.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDayTable {
    key: SymbolDayKey,
    grid: BucketGrid,
    rows: Vec<SymbolDayRow>,
}

impl SymbolDayTable {
    /// Assemble a table from three series averaged on the same grid.
    pub fn from_series(
        key: SymbolDayKey,
        bid: &BucketedSeries,
        ask: &BucketedSeries,
        spread: &BucketedSeries,
    ) -> Result<Self> {
        let grid = *bid.grid();
        if !grid.matches(ask.grid()) || !grid.matches(spread.grid()) {
            return Err(Error::grid_mismatch(format!(
                "bid, ask and spread for {key} were averaged on different grids"
            )));
        }

        let rows = bid
            .iter()
            .zip(ask.values())
            .zip(spread.values())
            .map(|(((offset_seconds, bid), &ask), &relative_spread)| SymbolDayRow {
                offset_seconds,
                bid,
                ask,
                relative_spread,
            })
            .collect();

        Ok(Self { key, grid, rows })
    }

    /// Rebuild a table from persisted rows, inferring the grid from their spacing.
    ///
    /// A single row does not fix the bucket width; use [`SymbolDayTable::on_grid`]
    /// when the grid is known.
    pub fn from_rows(key: SymbolDayKey, rows: Vec<SymbolDayRow>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(Error::data(format!(
                "{key}: need at least two rows to infer the bucket width, found {}",
                rows.len()
            )));
        }

        let width = rows[1].offset_seconds - rows[0].offset_seconds;
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::data(format!("{key}: bucket offsets are not increasing")));
        }
        let grid = BucketGrid::with_count(rows[0].offset_seconds - width / 2.0, width, rows.len())?;
        Self::on_grid(key, grid, rows)
    }

    /// Rebuild a table from persisted rows that must sit on the midpoints of `grid`.
    pub fn on_grid(key: SymbolDayKey, grid: BucketGrid, rows: Vec<SymbolDayRow>) -> Result<Self> {
        if rows.len() != grid.len() {
            return Err(Error::data(format!(
                "{key}: expected {} rows, found {}",
                grid.len(),
                rows.len()
            )));
        }

        let width = grid.width();
        for (k, row) in rows.iter().enumerate() {
            let expected = grid.midpoint(k);
            if (row.offset_seconds - expected).abs() > 1e-6 * width.max(1.0) {
                return Err(Error::data(format!(
                    "{key}: row {k} at {} is off the {width}s grid (expected {expected})",
                    row.offset_seconds
                )));
            }
        }

        Ok(Self { key, grid, rows })
    }

    pub fn key(&self) -> &SymbolDayKey {
        &self.key
    }

    pub fn grid(&self) -> &BucketGrid {
        &self.grid
    }

    pub fn rows(&self) -> &[SymbolDayRow] {
        &self.rows
    }

    /// One column as a vector aligned with the grid.
    pub fn column(&self, field: SpreadField) -> Vec<f64> {
        self.rows.iter().map(|r| r.get(field)).collect()
    }
}
