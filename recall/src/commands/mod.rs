//! Command implementations for the recall CLI.

pub mod consolidate;
pub mod feedback;
pub mod stats;
