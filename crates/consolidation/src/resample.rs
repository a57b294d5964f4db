//! Secondary fixed-interval resampling.
//!
//! Rows are grouped into bins of a coarser width anchored at midnight of the
//! first timestamp's day. Each bin takes the plain mean of its rows, since the
//! rows are already evenly spaced, and is labelled at its midpoint.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use spread_core::{Error, Result};
use statrs::statistics::Statistics;

use crate::table::ConsolidatedTable;

/// Mean of the non-NaN values, NaN when there are none.
fn nan_mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.filter(|v| !v.is_nan()).mean()
}

/// Resample `table` into bins of `width_seconds`, labelled at bin midpoints.
///
/// Bins between the first and last occupied one are emitted even when no row
/// falls in them, with NaN in every column.
pub fn resample_mean(table: &ConsolidatedTable, width_seconds: f64) -> Result<ConsolidatedTable> {
    if !(width_seconds.is_finite() && width_seconds > 0.0) {
        return Err(Error::precondition(format!(
            "resample width must be positive, got {width_seconds}"
        )));
    }
    let width_ns = (width_seconds * 1e9).round() as i64;
    if width_ns == 0 {
        return Err(Error::precondition(format!(
            "resample width {width_seconds}s is below one nanosecond"
        )));
    }

    let Some(first) = table.index().first() else {
        return Ok(table.clone());
    };
    let anchor = first
        .date()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::data(format!("no midnight before {first}")))?;

    let bin_of = |ts: &NaiveDateTime| -> Result<i64> {
        let since = (*ts - anchor)
            .num_nanoseconds()
            .ok_or_else(|| Error::data(format!("{ts} is too far from {anchor}")))?;
        Ok(since.div_euclid(width_ns))
    };
    let bins: Vec<i64> = table.index().iter().map(bin_of).collect::<Result<_>>()?;

    // Rows are sorted, so each bin is one contiguous run.
    let (lo, hi) = match (bins.first(), bins.last()) {
        (Some(&lo), Some(&hi)) => (lo, hi),
        _ => return Ok(table.clone()),
    };
    let mut runs: Vec<(usize, usize)> = vec![(0, 0); (hi - lo + 1) as usize];
    let mut row = 0;
    for (slot, bin) in runs.iter_mut().zip(lo..=hi) {
        let begin = row;
        while row < bins.len() && bins[row] == bin {
            row += 1;
        }
        *slot = (begin, row);
    }

    let half = Duration::nanoseconds(width_ns / 2);
    let index: Vec<NaiveDateTime> = (lo..=hi)
        .map(|bin| anchor + Duration::nanoseconds(bin * width_ns) + half)
        .collect();

    let columns: BTreeMap<_, Vec<f64>> = table
        .columns()
        .iter()
        .map(|(key, values)| {
            let means = runs
                .iter()
                .map(|&(begin, end)| nan_mean(values[begin..end].iter()))
                .collect();
            (key.clone(), means)
        })
        .collect();

    ConsolidatedTable::new(index, columns)
}
