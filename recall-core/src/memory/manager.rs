//! Composition of the three tiers behind one entry point.

use std::collections::HashSet;

use tracing::{debug, info};

use super::store::AnchorStore;
use super::temporary::TemporaryStore;
use super::traits::TierStore;
use super::{MaintenanceReport, MemoryStats, RetrievedMemory};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::services::{Services, anchors_or_fallback};
use crate::types::{MemoryRecord, MemoryTier, TemporaryRecord};

/// Memory of one character across the core, long-term, and temporary tiers.
#[derive(Debug)]
pub struct MemoryManager {
    config: MemoryConfig,
    services: Services,
    core: AnchorStore,
    long_term: AnchorStore,
    temporary: TemporaryStore,
}

impl MemoryManager {
    /// Open every tier of the configured character.
    ///
    /// Stores whose consolidation is due are consolidated before this returns.
    pub fn open(config: MemoryConfig, services: Services) -> Result<Self> {
        config.validate()?;
        info!(
            "Opening memory for '{}' in {:?}",
            config.character_id, config.data_dir
        );

        let core = AnchorStore::core(&config, &services);
        let long_term = AnchorStore::long_term(&config, &services);
        let temporary = TemporaryStore::open(&config, &services);

        Ok(Self {
            config,
            services,
            core,
            long_term,
            temporary,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn core(&self) -> &AnchorStore {
        &self.core
    }

    pub fn long_term(&self) -> &AnchorStore {
        &self.long_term
    }

    pub fn temporary(&self) -> &TemporaryStore {
        &self.temporary
    }

    pub(crate) fn extract_anchors(&self, text: &str) -> Vec<String> {
        anchors_or_fallback(self.services.extractor.as_ref(), text, self.config.max_anchors)
    }

    /// Everything relevant to `text`: anchored hits from core and long-term plus
    /// every live temporary turn.
    ///
    /// Long-term hits count as accesses.
    pub fn retrieve(&mut self, text: &str) -> RetrievedMemory {
        let query_anchors = self.extract_anchors(text);
        debug!("Retrieving memory for anchors {:?}", query_anchors);

        RetrievedMemory {
            core: self.core.query_by_anchor(&query_anchors),
            long_term: self.long_term.query_by_anchor(&query_anchors),
            temporary: self.temporary.list_all().to_vec(),
            query_anchors,
        }
    }

    /// A few distinct contents to seed a new conversation topic.
    ///
    /// Core records come first in insertion order, then the most accessed
    /// long-term records.
    pub fn topic_material(&self) -> Vec<String> {
        let limit = self.config.topic_material_limit;
        let mut candidates: Vec<&str> = Vec::new();

        if self.config.topic_tiers.contains(&MemoryTier::Core) {
            candidates.extend(self.core.records().iter().take(limit).map(|r| r.content.as_str()));
        }
        if self.config.topic_tiers.contains(&MemoryTier::LongTerm) {
            candidates.extend(
                self.long_term
                    .top_accessed(limit)
                    .into_iter()
                    .map(|r| r.content.as_str()),
            );
        }

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| seen.insert(*c))
            .take(limit)
            .map(String::from)
            .collect()
    }

    /// Store a new fact, extracting its anchors.
    pub fn learn(&mut self, content: &str, is_core: bool) -> MemoryRecord {
        if is_core {
            self.core.add(content, None)
        } else {
            self.long_term.add(content, None)
        }
    }

    /// Store a fact under known anchors.
    ///
    /// Core is append-only. Long-term folds the fact into whatever already
    /// matches the anchors.
    pub fn update_by_anchor(&mut self, anchors: &[String], content: &str, is_core: bool) -> MemoryRecord {
        if is_core {
            self.core.add(content, Some(anchors.to_vec()))
        } else {
            self.long_term.merge_into_matches(anchors, content)
        }
    }

    /// Record one conversational turn.
    pub fn remember_turn(&mut self, content: &str, context: &str) -> TemporaryRecord {
        self.temporary.add(content, context)
    }

    /// Consolidate core and long-term, and prune temporary.
    pub fn consolidate_all(&mut self) -> MaintenanceReport {
        let report = MaintenanceReport {
            core: self.core.consolidate(),
            long_term: self.long_term.consolidate(),
            temporary_pruned: self.temporary.prune(),
        };
        info!("Maintenance finished for '{}'", self.config.character_id);
        report
    }

    /// Record counts per tier.
    pub fn tier_counts(&self) -> MemoryStats {
        let core = self.core.len();
        let long_term = self.long_term.len();
        let temporary = self.temporary.len();
        MemoryStats {
            total: core + long_term + temporary,
            core,
            long_term,
            temporary,
        }
    }
}
