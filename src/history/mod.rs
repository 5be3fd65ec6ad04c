//! Run history: a record of every finished workflow run.
//!
//! This module provides:
//! - `entry`: Data structures for entries, filters and statistics
//! - `store`: The `HistoryStore` trait and its JSON file implementation

mod entry;
mod store;

pub use entry::*;
pub use store::*;
