//! Quote-to-spread transform.
//!
//! Splits a quote sequence into bid, ask and relative-spread step series that
//! share the quotes' offsets.

use serde::{Deserialize, Serialize};
use spread_core::{DegenerateSpreadPolicy, Error, RawQuote, Result, StepSeries};
use tracing::warn;

/// Relative bid-ask spread: `2 * (ask - bid) / (ask + bid)`.
///
/// Returns NaN when `ask + bid` is zero or the ratio is not finite.
#[inline]
pub fn relative_spread(bid: f64, ask: f64) -> f64 {
    let total = ask + bid;
    if total == 0.0 {
        return f64::NAN;
    }
    let spread = 2.0 * (ask - bid) / total;
    if spread.is_finite() {
        spread
    } else {
        f64::NAN
    }
}

/// Counts gathered while transforming one quote sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadStats {
    /// Quotes seen.
    pub samples: usize,
    /// Quotes whose spread was undefined.
    pub degenerate: usize,
}

impl SpreadStats {
    /// Fraction of quotes with an undefined spread.
    pub fn degenerate_frac(&self) -> f64 {
        if self.samples > 0 {
            self.degenerate as f64 / self.samples as f64
        } else {
            0.0
        }
    }
}

/// Bid, ask and spread series derived from one quote sequence.
#[derive(Debug, Clone)]
pub struct QuoteSeries {
    pub bid: StepSeries,
    pub ask: StepSeries,
    pub spread: StepSeries,
    pub stats: SpreadStats,
}

/// Converts raw quotes into the three series the averager consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadTransform {
    policy: DegenerateSpreadPolicy,
}

impl SpreadTransform {
    pub fn new(policy: DegenerateSpreadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DegenerateSpreadPolicy {
        self.policy
    }

    /// Split `quotes` (sorted by offset) into bid, ask and spread series.
    pub fn apply(&self, quotes: &[RawQuote]) -> Result<QuoteSeries> {
        if quotes.is_empty() {
            return Err(Error::precondition("cannot derive spreads from zero quotes"));
        }

        let spreads: Vec<(f64, f64)> = quotes
            .iter()
            .map(|q| (q.offset_seconds, relative_spread(q.bid, q.ask)))
            .collect();
        let degenerate = spreads.iter().filter(|(_, s)| s.is_nan()).count();
        let stats = SpreadStats {
            samples: quotes.len(),
            degenerate,
        };

        if degenerate > 0 {
            warn!(
                degenerate,
                samples = quotes.len(),
                policy = ?self.policy,
                "quotes with zero bid + ask"
            );
        }

        let spread_points = match self.policy {
            DegenerateSpreadPolicy::HoldPrevious if degenerate < spreads.len() => spreads
                .into_iter()
                .filter(|(_, s)| !s.is_nan())
                .collect(),
            // Nothing valid to hold; fall back to the sentinel.
            _ => spreads,
        };

        Ok(QuoteSeries {
            bid: StepSeries::new(quotes.iter().map(|q| (q.offset_seconds, q.bid)).collect())?,
            ask: StepSeries::new(quotes.iter().map(|q| (q.offset_seconds, q.ask)).collect())?,
            spread: StepSeries::new(spread_points)?,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_quote(offset: f64, bid: f64, ask: f64) -> RawQuote {
        RawQuote::new(offset, bid, ask)
    }

    #[test]
    fn test_relative_spread() {
        // 2 * (101 - 99) / 200 = 0.02
        assert_relative_eq!(relative_spread(99.0, 101.0), 0.02);
        assert_eq!(relative_spread(100.0, 100.0), 0.0);
    }

    #[test]
    fn test_relative_spread_degenerate() {
        assert!(relative_spread(0.0, 0.0).is_nan());
        assert!(relative_spread(-1.0, 1.0).is_nan());
    }

    #[test]
    fn test_apply_shares_offsets() {
        let quotes = vec![
            make_quote(0.0, 99.0, 101.0),
            make_quote(1.5, 100.0, 100.5),
        ];
        let series = SpreadTransform::default().apply(&quotes).unwrap();

        assert_eq!(series.bid.points(), &[(0.0, 99.0), (1.5, 100.0)]);
        assert_eq!(series.ask.points(), &[(0.0, 101.0), (1.5, 100.5)]);
        assert_eq!(series.spread.len(), 2);
        assert_relative_eq!(series.spread.points()[1].1, 2.0 * 0.5 / 200.5);
        assert_eq!(series.stats.degenerate, 0);
    }

    #[test]
    fn test_propagate_keeps_sentinel() {
        let quotes = vec![
            make_quote(0.0, 99.0, 101.0),
            make_quote(1.0, 0.0, 0.0),
            make_quote(2.0, 99.0, 101.0),
        ];
        let series = SpreadTransform::new(DegenerateSpreadPolicy::Propagate)
            .apply(&quotes)
            .unwrap();

        assert_eq!(series.spread.len(), 3);
        assert!(series.spread.points()[1].1.is_nan());
        assert_eq!(series.stats.degenerate, 1);
        assert_relative_eq!(series.stats.degenerate_frac(), 1.0 / 3.0);
    }

    #[test]
    fn test_hold_previous_drops_degenerate() {
        let quotes = vec![
            make_quote(0.0, 99.0, 101.0),
            make_quote(1.0, 0.0, 0.0),
            make_quote(2.0, 99.0, 101.0),
        ];
        let series = SpreadTransform::new(DegenerateSpreadPolicy::HoldPrevious)
            .apply(&quotes)
            .unwrap();

        let offsets: Vec<f64> = series.spread.points().iter().map(|p| p.0).collect();
        assert_eq!(offsets, vec![0.0, 2.0]);
        // bid and ask keep every sample
        assert_eq!(series.bid.len(), 3);
    }

    #[test]
    fn test_hold_previous_all_degenerate_falls_back() {
        let quotes = vec![make_quote(0.0, 0.0, 0.0), make_quote(1.0, 0.0, 0.0)];
        let series = SpreadTransform::new(DegenerateSpreadPolicy::HoldPrevious)
            .apply(&quotes)
            .unwrap();
        assert_eq!(series.spread.len(), 2);
        assert!(series.spread.points().iter().all(|p| p.1.is_nan()));
    }

    #[test]
    fn test_empty_quotes_rejected() {
        assert!(SpreadTransform::default().apply(&[]).is_err());
    }
}
