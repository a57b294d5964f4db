//! Cross-day, cross-symbol consolidation.
//!
//! Stacks one column of many symbol-day tables onto a shared timestamp axis:
//! each bucket midpoint is added to a fixed reference instant, while the real
//! trading date stays in the column key.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use spread_core::config::ConsolidationConfig;
use spread_core::{
    Error, MissingPolicy, OffsetSeconds, Result, SpreadField, SymbolDayKey, SymbolDayTable,
};
use tracing::{debug, info, warn};

use crate::resample::resample_mean;
use crate::table::ConsolidatedTable;

/// Where the consolidator looks up symbol-day tables.
pub trait TableSource {
    /// The table for `key`, or `None` when it does not exist.
    fn load(&self, key: &SymbolDayKey) -> Result<Option<SymbolDayTable>>;
}

impl<S: TableSource + ?Sized> TableSource for &S {
    fn load(&self, key: &SymbolDayKey) -> Result<Option<SymbolDayTable>> {
        (**self).load(key)
    }
}

impl TableSource for BTreeMap<SymbolDayKey, SymbolDayTable> {
    fn load(&self, key: &SymbolDayKey) -> Result<Option<SymbolDayTable>> {
        Ok(self.get(key).cloned())
    }
}

/// Consolidated table plus the requested keys that had no table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationReport {
    pub table: ConsolidatedTable,
    pub missing: Vec<SymbolDayKey>,
}

/// Builds consolidated tables.
#[derive(Debug, Clone)]
pub struct Consolidator {
    config: ConsolidationConfig,
}

impl Consolidator {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Map a bucket midpoint onto the reference axis.
    fn timestamp(&self, offset: OffsetSeconds) -> NaiveDateTime {
        self.config.reference_time + Duration::nanoseconds((offset * 1e9).round() as i64)
    }

    /// Stack the configured column of `tables` without resampling.
    ///
    /// All tables must share one bucket grid.
    pub fn stack(&self, tables: &[SymbolDayTable]) -> Result<ConsolidatedTable> {
        let Some(first) = tables.first() else {
            return Ok(ConsolidatedTable::default());
        };
        let grid = *first.grid();

        let mut columns: BTreeMap<SymbolDayKey, Vec<f64>> = BTreeMap::new();
        for table in tables {
            if !grid.matches(table.grid()) {
                return Err(Error::grid_mismatch(format!(
                    "{} uses a {}s grid from {}, expected {}s from {}",
                    table.key(),
                    table.grid().width(),
                    table.grid().start(),
                    grid.width(),
                    grid.start()
                )));
            }
            if columns
                .insert(table.key().clone(), table.column(self.config.field))
                .is_some()
            {
                return Err(Error::data(format!("{} given more than once", table.key())));
            }
        }

        let index = grid.midpoints().map(|mid| self.timestamp(mid)).collect();
        ConsolidatedTable::new(index, columns)
    }

    /// Load, stack and optionally resample the requested symbol-days.
    ///
    /// Missing tables are handled by the configured [`MissingPolicy`].
    pub fn consolidate<S: TableSource + ?Sized>(
        &self,
        requested: &[SymbolDayKey],
        source: &S,
    ) -> Result<ConsolidationReport> {
        let mut keys = requested.to_vec();
        keys.sort();
        keys.dedup();

        let mut tables = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match source.load(&key)? {
                Some(table) => tables.push(table),
                None => match self.config.missing {
                    MissingPolicy::Raise => {
                        return Err(Error::missing_table(key.date, key.symbol));
                    }
                    MissingPolicy::WarnAndSkip => {
                        warn!(%key, "missing symbol-day table, skipping");
                        missing.push(key);
                    }
                    MissingPolicy::SilentSkip => missing.push(key),
                },
            }
        }

        let mut table = self.stack(&tables)?;
        debug!(columns = table.width(), rows = table.len(), "stacked symbol-days");
        if let Some(width) = self.config.resample_seconds {
            table = resample_mean(&table, width)?;
        }

        info!(
            columns = table.width(),
            rows = table.len(),
            missing = missing.len(),
            field = self.config.field.column_name(),
            "consolidated"
        );
        Ok(ConsolidationReport { table, missing })
    }
}

/// Stack one column of in-memory tables on the default reference axis,
/// optionally resampling.
pub fn consolidate_tables(
    tables: &[SymbolDayTable],
    field: SpreadField,
    resample_seconds: Option<f64>,
) -> Result<ConsolidatedTable> {
    let consolidator = Consolidator::new(ConsolidationConfig {
        field,
        ..ConsolidationConfig::default()
    });
    let table = consolidator.stack(tables)?;
    match resample_seconds {
        Some(width) => resample_mean(&table, width),
        None => Ok(table),
    }
}
