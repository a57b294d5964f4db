//! Time-weighted bucket averaging of a step function.
//!
//! The step function holds each sample's value until the next sample. Before
//! the first sample it holds the first sample's value, and after the last
//! sample it extends flat to the end of the grid. Each bucket's output is the
//! integral of the function over the bucket divided by the bucket width.
//!
//! Sample changes and bucket closes are merged into one time-ordered edge
//! stream and folded into the bucket averages. When a sample falls exactly on
//! a bucket edge it is applied first, so the time before it belongs to the
//! earlier bucket.

use std::iter::Peekable;

use spread_core::config::AveragingConfig;
use spread_core::{BucketGrid, BucketedSeries, OffsetSeconds, Result, StepSeries};

/// A point in time where the fold has work to do.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Edge {
    /// The held value becomes `value` at `at`.
    Sample { at: OffsetSeconds, value: f64 },
    /// The current bucket closes at `at`.
    Close { at: OffsetSeconds },
}

impl Edge {
    #[inline]
    fn at(&self) -> OffsetSeconds {
        match *self {
            Edge::Sample { at, .. } | Edge::Close { at } => at,
        }
    }
}

/// Merge of two time-ordered edge streams; samples win ties.
struct MergedEdges<S: Iterator<Item = Edge>, C: Iterator<Item = Edge>> {
    samples: Peekable<S>,
    closes: Peekable<C>,
}

impl<S: Iterator<Item = Edge>, C: Iterator<Item = Edge>> MergedEdges<S, C> {
    fn new(samples: S, closes: C) -> Self {
        Self {
            samples: samples.peekable(),
            closes: closes.peekable(),
        }
    }
}

impl<S: Iterator<Item = Edge>, C: Iterator<Item = Edge>> Iterator for MergedEdges<S, C> {
    type Item = Edge;

    fn next(&mut self) -> Option<Edge> {
        match (self.samples.peek(), self.closes.peek()) {
            (Some(s), Some(c)) if s.at() <= c.at() => self.samples.next(),
            (Some(_), Some(_)) => self.closes.next(),
            (Some(_), None) => self.samples.next(),
            (None, _) => self.closes.next(),
        }
    }
}

/// Fold state: the open bucket's running area plus finished averages.
struct Accumulator {
    width: f64,
    cursor: OffsetSeconds,
    held: f64,
    area: f64,
    /// Whether the held value changed since the open bucket started.
    switched: bool,
    averages: Vec<f64>,
}

impl Accumulator {
    fn new(grid: &BucketGrid, held: f64) -> Self {
        Self {
            width: grid.width(),
            cursor: grid.start(),
            held,
            area: 0.0,
            switched: false,
            averages: Vec::with_capacity(grid.len()),
        }
    }

    /// Integrate the held value up to `to`. Zero-length spans add nothing.
    fn advance(&mut self, to: OffsetSeconds) {
        let dt = to - self.cursor;
        if dt > 0.0 {
            self.area += self.held * dt;
            self.cursor = to;
        }
    }

    fn apply(mut self, edge: Edge) -> Self {
        match edge {
            Edge::Sample { at, value } => {
                self.advance(at);
                self.held = value;
                self.switched = true;
            }
            Edge::Close { at } => {
                self.advance(at);
                // A bucket the value never changed in averages to the value itself.
                let average = if self.switched {
                    self.area / self.width
                } else {
                    self.held
                };
                self.averages.push(average);
                self.area = 0.0;
                self.switched = false;
            }
        }
        self
    }
}

/// Average `series` over every bucket of `grid`.
pub fn time_average(series: &StepSeries, grid: &BucketGrid) -> Result<BucketedSeries> {
    let points = series.points();
    let start = grid.start();
    let end = grid.end();

    // Samples at or before the grid start only decide the opening value; with
    // none, the first sample's value is held from the start.
    let first_inside = points.partition_point(|&(t, _)| t <= start);
    let opening = match first_inside {
        0 => points[0].1,
        i => points[i - 1].1,
    };

    let samples = points[first_inside..]
        .iter()
        .take_while(|&&(t, _)| t < end)
        .map(|&(at, value)| Edge::Sample { at, value });
    let closes = (1..=grid.len()).map(|k| Edge::Close { at: grid.edge(k) });

    let acc = MergedEdges::new(samples, closes)
        .fold(Accumulator::new(grid, opening), Accumulator::apply);

    BucketedSeries::new(*grid, acc.averages)
}

/// Average `series` into `ceil((end - start) / width)` buckets.
pub fn average(
    series: &StepSeries,
    width: f64,
    start: OffsetSeconds,
    end: OffsetSeconds,
) -> Result<BucketedSeries> {
    let grid = BucketGrid::new(width, start, end)?;
    time_average(series, &grid)
}

/// Averager bound to one bucket grid, for running several series alike.
#[derive(Debug, Clone, Copy)]
pub struct TimeAverager {
    grid: BucketGrid,
}

impl TimeAverager {
    pub fn new(grid: BucketGrid) -> Self {
        Self { grid }
    }

    /// Build the grid from the averaging configuration.
    pub fn from_config(config: &AveragingConfig) -> Result<Self> {
        Ok(Self::new(BucketGrid::new(
            config.bucket_seconds,
            config.start_seconds,
            config.end_seconds,
        )?))
    }

    pub fn grid(&self) -> &BucketGrid {
        &self.grid
    }

    pub fn average(&self, series: &StepSeries) -> Result<BucketedSeries> {
        time_average(series, &self.grid)
    }
}
