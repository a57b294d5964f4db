//! Consolidation of symbol-day tables for the quoted-spread workspace.
//!
//! This crate handles:
//! - CSV persistence of symbol-day files and consolidated tables
//! - Stacking many symbol-days onto one market-time axis
//! - Secondary mean resampling
//! - Cross-date summaries

pub mod consolidator;
pub mod resample;
pub mod storage;
pub mod summary;
pub mod table;

pub use consolidator::{consolidate_tables, ConsolidationReport, Consolidator, TableSource};
pub use resample::resample_mean;
pub use storage::{read_consolidated, write_consolidated, DataDir};
pub use summary::{symbol_means, window_change, SymbolMeans, TimeWindow};
pub use table::ConsolidatedTable;
