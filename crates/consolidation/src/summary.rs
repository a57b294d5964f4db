//! Cross-date summaries of a consolidated table.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;

use crate::table::ConsolidatedTable;

/// Per-symbol averages across dates, on the consolidated timestamp axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMeans {
    pub index: Vec<NaiveDateTime>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

/// Time range for window comparisons; both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub after: NaiveDateTime,
    pub before: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(after: NaiveDateTime, before: NaiveDateTime) -> Self {
        Self { after, before }
    }

    #[inline]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts > self.after && ts < self.before
    }
}

fn nan_mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.filter(|v| !v.is_nan()).mean()
}

/// Average, row by row, the columns of each symbol over the selected dates.
///
/// Only columns present in the table take part; symbols with none are left
/// out. NaN cells are skipped.
pub fn symbol_means(
    table: &ConsolidatedTable,
    dates: &[NaiveDate],
    symbols: &[String],
) -> SymbolMeans {
    let mut grouped: BTreeMap<&str, Vec<&[f64]>> = BTreeMap::new();
    for (key, column) in table.columns() {
        if dates.contains(&key.date) && symbols.contains(&key.symbol) {
            grouped.entry(key.symbol.as_str()).or_default().push(column);
        }
    }

    let columns = grouped
        .into_iter()
        .map(|(symbol, group)| {
            let means = (0..table.len())
                .map(|row| nan_mean(group.iter().map(|column| &column[row])))
                .collect();
            (symbol.to_string(), means)
        })
        .collect();

    SymbolMeans {
        index: table.index().to_vec(),
        columns,
    }
}

/// Ratio of each symbol's mean over `new` to its mean over `old`, largest
/// first. Undefined ratios sort last.
pub fn window_change(means: &SymbolMeans, old: TimeWindow, new: TimeWindow) -> Vec<(String, f64)> {
    let window_mean = |column: &[f64], window: TimeWindow| {
        nan_mean(
            means
                .index
                .iter()
                .zip(column)
                .filter(|(ts, _)| window.contains(**ts))
                .map(|(_, v)| v),
        )
    };

    let mut changes: Vec<(String, f64)> = means
        .columns
        .iter()
        .map(|(symbol, column)| {
            let column = column.as_slice();
            let ratio = window_mean(column, new) / window_mean(column, old);
            (symbol.clone(), ratio)
        })
        .collect();
    changes.sort_by_key(|(_, ratio)| (ratio.is_nan(), Reverse(OrderedFloat(*ratio))));
    changes
}
