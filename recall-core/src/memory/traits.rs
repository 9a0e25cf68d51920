//! Shared interface of the tier stores.

use tracing::warn;

use crate::error::Result;
use crate::types::MemoryTier;

/// Common surface of every tier store.
///
/// Each store exclusively owns its records and its backing file.
pub trait TierStore {
    /// Tier held by this store.
    fn tier(&self) -> MemoryTier;

    /// Number of records currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the records to the backing file, replacing its contents.
    fn persist(&self) -> Result<()>;

    /// Persist, logging instead of failing.
    ///
    /// The in-memory state stays authoritative for the rest of the process.
    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            warn!("Failed to persist {} memory: {}", self.tier(), e);
        }
    }
}
