//! Performance statistics.

mod calculator;

pub use calculator::SessionStats;
