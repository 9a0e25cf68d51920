//! Temporary tier: recent conversation turns, pruned by age.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use super::persistence::{load_temporary, save_temporary};
use super::traits::TierStore;
use crate::clock::Clock;
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::services::Services;
use crate::types::{MemoryTier, TemporaryRecord};

/// Store for the temporary tier of one character.
pub struct TemporaryStore {
    path: PathBuf,
    ttl_days: i64,
    clock: Arc<dyn Clock>,
    records: Vec<TemporaryRecord>,
}

impl TemporaryStore {
    /// Load the tier file and drop whatever has aged out.
    pub fn open(config: &MemoryConfig, services: &Services) -> Self {
        let path = config.paths(MemoryTier::Temporary).records;
        let records = load_temporary(&path);
        debug!("Loaded {} temporary records from {:?}", records.len(), path);

        let mut store = Self {
            path,
            ttl_days: config.temporary_ttl_days,
            clock: services.clock.clone(),
            records,
        };
        store.prune();
        store
    }

    /// Record one conversational turn.
    pub fn add(&mut self, content: impl Into<String>, context: impl Into<String>) -> TemporaryRecord {
        self.prune();
        let record = TemporaryRecord {
            content: content.into(),
            context: context.into(),
            created_at: self.clock.now(),
        };
        self.records.push(record.clone());
        self.persist_or_warn();
        record
    }

    /// Every record still inside the retention window.
    pub fn list_all(&mut self) -> &[TemporaryRecord] {
        self.prune();
        &self.records
    }

    /// Remove records older than the retention window. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let cutoff = TimeDelta::try_days(self.ttl_days)
            .and_then(|ttl| self.clock.now().checked_sub_signed(ttl))
            .unwrap_or(NaiveDateTime::MIN);
        let before = self.records.len();
        self.records.retain(|r| r.created_at > cutoff);

        let removed = before - self.records.len();
        if removed > 0 {
            debug!("Pruned {} temporary records older than {}", removed, cutoff);
            self.persist_or_warn();
        }
        removed
    }
}

impl std::fmt::Debug for TemporaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryStore")
            .field("path", &self.path)
            .field("ttl_days", &self.ttl_days)
            .field("records", &self.records.len())
            .finish()
    }
}

impl TierStore for TemporaryStore {
    fn tier(&self) -> MemoryTier {
        MemoryTier::Temporary
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn persist(&self) -> Result<()> {
        save_temporary(&self.path, &self.records)
    }
}
