//! recall-core - Tiered anchor memory for a conversational companion
//!
//! This crate provides the memory subsystem behind the `recall` binary:
//!
//! - **memory**: Core, long-term, and temporary tier stores and the manager composing them
//! - **services**: Keyword extraction and text inference collaborators
//! - **config**: Memory configuration and on-disk layout
//! - **feedback**: Producer corrections folded into long-term memory
//! - **clock**: Injectable wall clock

pub mod clock;
pub mod config;
pub mod error;
pub mod feedback;
pub mod memory;
pub mod services;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::MemoryConfig;
pub use error::{Error, Result};
pub use feedback::{FeedbackEntry, load_feedback};
pub use memory::{MaintenanceReport, MemoryManager, MemoryStats, RetrievedMemory};
pub use services::{KeywordExtractor, Services, TextInference};
pub use types::{MemoryRecord, MemoryTier, TemporaryRecord};
