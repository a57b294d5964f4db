//! Bucket averaging for the quoted-spread workspace.
//!
//! This crate provides:
//! - Time-weighted averaging of step functions onto a fixed bucket grid
//! - Daily symbol-day aggregation of bid, ask and relative spread
//! - A parallel batch runner over many symbol-days

pub mod aggregator;
pub mod averager;
pub mod batch;

pub use aggregator::{SymbolDayAggregator, SymbolDayOutcome};
pub use averager::{average, time_average, TimeAverager};
pub use batch::{BatchFailure, BatchReport, BatchRunner};
