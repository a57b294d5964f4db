//! CSV persistence.
//!
//! A data directory holds one `YYYY-MM-DD_SYMBOL.csv` file per symbol-day with
//! the columns `offset_seconds,bid,ask,relative spread`. Consolidated tables
//! are written as one wide CSV with a `timestamp` column followed by one
//! column per symbol-day; NaN cells are left empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, WriterBuilder};
use spread_averaging::BatchReport;
use spread_core::{BucketGrid, Config, Error, Result, SymbolDayKey, SymbolDayRow, SymbolDayTable};
use tracing::{debug, info};

use crate::consolidator::TableSource;
use crate::table::ConsolidatedTable;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_COLUMN: &str = "timestamp";

/// Directory of symbol-day files.
///
/// With an expected grid, tables are checked against it on read; without one
/// the grid is inferred from the row spacing.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    grid: Option<BucketGrid>,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            grid: None,
        }
    }

    /// Data directory of `config.storage` expecting the `config.averaging` grid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let grid = BucketGrid::new(
            config.averaging.bucket_seconds,
            config.averaging.start_seconds,
            config.averaging.end_seconds,
        )?;
        Ok(Self::new(config.storage.data_dir.clone()).with_grid(grid))
    }

    pub fn with_grid(mut self, grid: BucketGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn grid(&self) -> Option<&BucketGrid> {
        self.grid.as_ref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds `key`.
    pub fn path_for(&self, key: &SymbolDayKey) -> PathBuf {
        self.root.join(format!("{}.csv", key.file_stem()))
    }

    pub fn contains(&self, key: &SymbolDayKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Keys from `keys` that have no file yet, sorted.
    pub fn pending(&self, keys: &[SymbolDayKey]) -> Vec<SymbolDayKey> {
        let mut pending: Vec<SymbolDayKey> =
            keys.iter().filter(|k| !self.contains(k)).cloned().collect();
        pending.sort();
        pending.dedup();
        pending
    }

    /// Write one symbol-day, replacing any existing file.
    pub fn write_table(&self, table: &SymbolDayTable) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(table.key());

        let mut writer = WriterBuilder::new().has_headers(true).from_path(&path)?;
        for row in table.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = table.rows().len(), "wrote symbol-day");
        Ok(path)
    }

    /// Read one symbol-day; `None` when its file does not exist.
    pub fn read_table(&self, key: &SymbolDayKey) -> Result<Option<SymbolDayTable>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let rows = reader
            .deserialize::<SymbolDayRow>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        match self.grid {
            Some(grid) => SymbolDayTable::on_grid(key.clone(), grid, rows),
            None => SymbolDayTable::from_rows(key.clone(), rows),
        }
        .map(Some)
    }

    /// Write every fully built table of a batch.
    pub fn write_batch(&self, report: &BatchReport) -> Result<Vec<PathBuf>> {
        let paths = report
            .built
            .iter()
            .map(|table| self.write_table(table))
            .collect::<Result<Vec<_>>>()?;
        info!(root = %self.root.display(), written = paths.len(), "saved batch");
        Ok(paths)
    }

    /// Every symbol-day on disk, sorted by date then symbol.
    ///
    /// Files whose names are not `YYYY-MM-DD_SYMBOL.csv` are ignored.
    pub fn discover(&self) -> Result<Vec<SymbolDayKey>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(SymbolDayKey::parse_file_stem)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Distinct dates and symbols on disk, each sorted.
    pub fn discover_dates_symbols(&self) -> Result<(Vec<NaiveDate>, Vec<String>)> {
        let keys = self.discover()?;
        let mut dates: Vec<NaiveDate> = keys.iter().map(|k| k.date).collect();
        let mut symbols: Vec<String> = keys.into_iter().map(|k| k.symbol).collect();
        dates.dedup();
        symbols.sort();
        symbols.dedup();
        Ok((dates, symbols))
    }
}

impl TableSource for DataDir {
    fn load(&self, key: &SymbolDayKey) -> Result<Option<SymbolDayTable>> {
        self.read_table(key)
    }
}

/// Write a consolidated table as one wide CSV.
pub fn write_consolidated(table: &ConsolidatedTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().from_path(path)?;
    let mut header = vec![TIMESTAMP_COLUMN.to_string()];
    header.extend(table.keys().map(SymbolDayKey::file_stem));
    writer.write_record(&header)?;

    for (row, ts) in table.index().iter().enumerate() {
        let mut record = vec![ts.format(TIMESTAMP_FORMAT).to_string()];
        record.extend(table.columns().values().map(|column| {
            let v = column[row];
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = table.len(), columns = table.width(), "wrote consolidated table");
    Ok(())
}

/// Read a table written by [`write_consolidated`].
pub fn read_consolidated(path: impl AsRef<Path>) -> Result<ConsolidatedTable> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path.as_ref())?;

    let headers = reader.headers()?.clone();
    let keys = headers
        .iter()
        .skip(1)
        .map(|h| {
            SymbolDayKey::parse_file_stem(h)
                .ok_or_else(|| Error::data(format!("bad column header {h:?}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut index = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); keys.len()];
    for record in reader.records() {
        let record = record?;
        let ts = record
            .get(0)
            .ok_or_else(|| Error::data("row without timestamp"))?;
        index.push(
            NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
                .map_err(|e| Error::data(format!("bad timestamp {ts:?}: {e}")))?,
        );
        for (column, cell) in values.iter_mut().zip(record.iter().skip(1)) {
            let v = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>()
                    .map_err(|e| Error::data(format!("bad value {cell:?}: {e}")))?
            };
            column.push(v);
        }
    }

    let columns: BTreeMap<SymbolDayKey, Vec<f64>> = keys.into_iter().zip(values).collect();
    ConsolidatedTable::new(index, columns)
}
