//! Tiered anchor memory for a conversational companion.
//!
//! Three tiers with different lifetimes, all indexed (except temporary) by a
//! handful of extracted keywords called anchors:
//!
//! - **Core**: permanent facts, append-only, merged only by consolidation
//! - **Long-term**: facts that expire after a configured number of days and are
//!   ranked by how often retrieval hits them
//! - **Temporary**: recent conversation turns, pruned by age, never indexed
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        MemoryManager                             │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │ AnchorStore  │  │   AnchorStore    │  │  TemporaryStore    │  │
//! │  │   (core)     │  │   (long-term)    │  │  (recent turns)    │  │
//! │  │ no expiry    │  │ TTL 180d, counts │  │ TTL 3d, no anchors │  │
//! │  └──────┬───────┘  └────────┬─────────┘  └─────────┬──────────┘  │
//! │         │ consolidate       │ consolidate          │ prune       │
//! │         └───────────────────┴──────────────────────┘             │
//! │                             │                                    │
//! │              <character>_<tier>_memory.json                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consolidation runs inline when a store opens and the configured interval has
//! passed since the date in its marker file.
//!
//! ## Usage
//!
//! ```ignore
//! use recall_core::{MemoryConfig, MemoryManager, Services};
//!
//! let services = Services::command("/opt/model/infer")?;
//! let mut manager = MemoryManager::open(MemoryConfig::from_env()?, services)?;
//!
//! manager.learn("The user's birthday is in March", true);
//! manager.update_by_anchor(&["music".into()], "The user plays violin", false);
//!
//! let memory = manager.retrieve("what music do I like?");
//! let topics = manager.topic_material();
//! ```

mod consolidation;
mod manager;
pub mod persistence;
mod store;
mod temporary;
mod traits;

pub use consolidation::*;
pub use manager::*;
pub use store::*;
pub use temporary::*;
pub use traits::*;

use serde::Serialize;

use crate::types::{MemoryRecord, TemporaryRecord};

/// Everything retrieval found for one piece of text.
///
/// Tiers are not deduplicated against each other.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedMemory {
    pub core: Vec<MemoryRecord>,
    pub long_term: Vec<MemoryRecord>,
    pub temporary: Vec<TemporaryRecord>,
    /// Anchors extracted from the query text.
    pub query_anchors: Vec<String>,
}

impl RetrievedMemory {
    pub fn is_empty(&self) -> bool {
        self.core.is_empty() && self.long_term.is_empty() && self.temporary.is_empty()
    }
}

/// Statistics about memory usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Total records across all tiers.
    pub total: usize,
    /// Core records.
    pub core: usize,
    /// Long-term records, expired ones included until consolidation drops them.
    pub long_term: usize,
    /// Temporary records.
    pub temporary: usize,
}

/// Result of a full maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub core: ConsolidationOutcome,
    pub long_term: ConsolidationOutcome,
    /// Temporary records removed by age.
    pub temporary_pruned: usize,
}

impl std::fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, outcome) in [("core", &self.core), ("long_term", &self.long_term)] {
            writeln!(
                f,
                "{}: {} -> {} records, {} merged groups ({} fallback), {} expired",
                name,
                outcome.before,
                outcome.after,
                outcome.merged_groups,
                outcome.fallback_merges,
                outcome.expired_dropped
            )?;
        }
        write!(f, "temporary: {} pruned", self.temporary_pruned)
    }
}
