//! Wide table of many symbol-days on one market-time axis.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use spread_core::{Error, Result, SymbolDayKey};

/// One column per `(date, symbol)`, one row per timestamp.
///
/// Columns are kept sorted by date then symbol, so two tables holding the same
/// columns compare equal whatever order they were assembled in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsolidatedTable {
    index: Vec<NaiveDateTime>,
    columns: BTreeMap<SymbolDayKey, Vec<f64>>,
}

impl ConsolidatedTable {
    /// Create a table; every column must have one value per index entry.
    pub fn new(index: Vec<NaiveDateTime>, columns: BTreeMap<SymbolDayKey, Vec<f64>>) -> Result<Self> {
        if let Some((key, column)) = columns.iter().find(|(_, c)| c.len() != index.len()) {
            return Err(Error::data(format!(
                "column {key} has {} values for {} timestamps",
                column.len(),
                index.len()
            )));
        }
        if index.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::data("timestamps must be strictly increasing"));
        }
        Ok(Self { index, columns })
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &BTreeMap<SymbolDayKey, Vec<f64>> {
        &self.columns
    }

    pub fn column(&self, key: &SymbolDayKey) -> Option<&[f64]> {
        self.columns.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SymbolDayKey> + '_ {
        self.columns.keys()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Combine two tables over disjoint column sets.
    ///
    /// An empty table is the identity. Otherwise both tables must share the
    /// same index.
    pub fn merge(mut self, other: ConsolidatedTable) -> Result<Self> {
        if other.columns.is_empty() {
            return Ok(self);
        }
        if self.columns.is_empty() {
            return Ok(other);
        }
        if self.index != other.index {
            return Err(Error::grid_mismatch(
                "cannot merge tables with different timestamps",
            ));
        }
        for (key, column) in other.columns {
            if self.columns.contains_key(&key) {
                return Err(Error::data(format!("column {key} present in both tables")));
            }
            self.columns.insert(key, column);
        }
        Ok(self)
    }
}
