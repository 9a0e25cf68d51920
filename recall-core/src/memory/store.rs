//! Anchored tier store shared by the core and long-term tiers.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::consolidation::{
    ConsolidationOutcome, dedupe_by_content, fallback_merge, group_by_shared_anchors, merge_group,
};
use super::persistence::{UpgradeContext, load_marker, load_records, save_marker, save_records};
use super::traits::TierStore;
use crate::config::{MemoryConfig, TierPaths};
use crate::error::Result;
use crate::services::{Services, anchors_or_fallback};
use crate::types::{MemoryRecord, MemoryTier, Retention, normalize_anchors};

/// Store for one anchored tier of one character.
///
/// Core records never expire. Long-term records carry a [`Retention`] and count
/// every retrieval that matches them.
#[derive(Debug)]
pub struct AnchorStore {
    tier: MemoryTier,
    config: MemoryConfig,
    services: Services,
    paths: TierPaths,
    records: Vec<MemoryRecord>,
    last_consolidated: Option<NaiveDate>,
}

impl AnchorStore {
    /// Open the core tier, consolidating first if a pass is due.
    pub fn core(config: &MemoryConfig, services: &Services) -> Self {
        Self::open(MemoryTier::Core, config, services)
    }

    /// Open the long-term tier, consolidating first if a pass is due.
    pub fn long_term(config: &MemoryConfig, services: &Services) -> Self {
        Self::open(MemoryTier::LongTerm, config, services)
    }

    fn open(tier: MemoryTier, config: &MemoryConfig, services: &Services) -> Self {
        let paths = config.paths(tier);
        let ctx = UpgradeContext {
            tier,
            today: services.clock.today(),
            max_anchors: config.max_anchors,
            long_term_ttl_days: config.long_term_ttl_days,
        };
        let records = load_records(&paths.records, &ctx);
        let last_consolidated = paths.marker.as_deref().and_then(load_marker);
        debug!(
            "Loaded {} {} records from {:?} (last consolidated: {:?})",
            records.len(),
            tier,
            paths.records,
            last_consolidated
        );

        let mut store = Self {
            tier,
            config: config.clone(),
            services: services.clone(),
            paths,
            records,
            last_consolidated,
        };

        if store.needs_consolidation() {
            store.consolidate();
        }
        store
    }

    fn today(&self) -> NaiveDate {
        self.services.clock.today()
    }

    fn extract(&self, text: &str) -> Vec<String> {
        anchors_or_fallback(self.services.extractor.as_ref(), text, self.config.max_anchors)
    }

    /// Append a record.
    ///
    /// Without usable anchors the extractor is asked for them; extraction failure
    /// degrades to whitespace tokens.
    pub fn add(&mut self, content: impl Into<String>, anchors: Option<Vec<String>>) -> MemoryRecord {
        let content = content.into();
        let anchors = match anchors.map(|a| normalize_anchors(a, self.config.max_anchors)) {
            Some(anchors) if !anchors.is_empty() => anchors,
            _ => self.extract(&content),
        };

        let today = self.today();
        let mut record = MemoryRecord::new(content, anchors, today);
        if self.tier == MemoryTier::LongTerm {
            record = record.with_retention(Retention::starting(today, self.config.long_term_ttl_days));
        }

        debug!("Adding {} record with anchors {:?}", self.tier, record.anchors);
        self.records.push(record.clone());
        self.persist_or_warn();
        record
    }

    /// Records matching any query anchor directly or through a link.
    ///
    /// Expired records are skipped. Every match counts as an access, and results
    /// are unique by content in insertion order.
    pub fn query_by_anchor(&mut self, anchors: &[String]) -> Vec<MemoryRecord> {
        if anchors.is_empty() {
            return Vec::new();
        }

        let today = self.today();
        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for record in self.records.iter_mut() {
            if record.is_expired(today) || !record.matches(anchors) {
                continue;
            }
            record.touch();
            if seen.insert(record.content.clone()) {
                hits.push(record.clone());
            }
        }

        debug!("{} query {:?} matched {} records", self.tier, anchors, hits.len());
        if self.tier == MemoryTier::LongTerm && !hits.is_empty() {
            self.persist_or_warn();
        }
        hits
    }

    /// Current records in insertion order.
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// Up to `n` live records, most accessed first; ties keep insertion order.
    pub fn top_accessed(&self, n: usize) -> Vec<&MemoryRecord> {
        let today = self.today();
        let mut live: Vec<&MemoryRecord> =
            self.records.iter().filter(|r| !r.is_expired(today)).collect();
        live.sort_by(|a, b| b.access_count().cmp(&a.access_count()));
        live.truncate(n);
        live
    }

    /// Fold `content` into the records matching `anchors`.
    ///
    /// With no match this is a plain [`add`](Self::add). Otherwise the first match
    /// absorbs every matched content plus the new one, is re-anchored, and counts one
    /// more access; the other matches are dropped.
    pub fn merge_into_matches(&mut self, anchors: &[String], content: &str) -> MemoryRecord {
        let today = self.today();
        let matched: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| !anchors.is_empty() && !r.is_expired(today) && r.matches(anchors))
            .map(|(idx, _)| idx)
            .collect();

        let Some(&first) = matched.first() else {
            return self.add(content, Some(anchors.to_vec()));
        };

        for &idx in &matched {
            self.records[idx].touch();
        }

        let mut parts: Vec<&str> = matched.iter().map(|&i| self.records[i].content.as_str()).collect();
        parts.push(content);
        let combined = fallback_merge(&parts);
        let new_anchors = self.extract(&combined);

        let survivor = &mut self.records[first];
        survivor.content = combined;
        survivor.set_anchors(new_anchors);
        survivor.updated_at = today;
        survivor.touch();
        let merged = survivor.clone();

        let dropped: HashSet<usize> = matched[1..].iter().copied().collect();
        let mut idx = 0;
        self.records.retain(|_| {
            let keep = !dropped.contains(&idx);
            idx += 1;
            keep
        });
        self.records = dedupe_by_content(std::mem::take(&mut self.records));

        debug!("Merged {} {} records into one", matched.len(), self.tier);
        self.persist_or_warn();
        merged
    }

    /// Whether a consolidation pass is due.
    ///
    /// A marker dated in the future means no pass is due.
    pub fn needs_consolidation(&self) -> bool {
        match self.last_consolidated {
            None => true,
            Some(last) => (self.today() - last).num_days() >= self.config.consolidation_interval_days,
        }
    }

    pub fn last_consolidated(&self) -> Option<NaiveDate> {
        self.last_consolidated
    }

    /// Drop expired records, merge records sharing anchors, and record today's date.
    pub fn consolidate(&mut self) -> ConsolidationOutcome {
        let today = self.today();
        let before = self.records.len();

        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.is_expired(today));
        let live = dedupe_by_content(live);

        let mut outcome = ConsolidationOutcome {
            before,
            expired_dropped: expired.len(),
            ..Default::default()
        };

        let mut consolidated = Vec::with_capacity(live.len());
        for group in group_by_shared_anchors(&live) {
            if let [only] = group.as_slice() {
                consolidated.push(live[*only].clone());
                continue;
            }
            let members: Vec<&MemoryRecord> = group.iter().map(|&i| &live[i]).collect();
            let (merged, fell_back) = merge_group(
                &members,
                self.services.inference.as_ref(),
                self.services.extractor.as_ref(),
                self.config.max_anchors,
                today,
            );
            outcome.merged_groups += 1;
            if fell_back {
                outcome.fallback_merges += 1;
            }
            consolidated.push(merged);
        }

        self.records = dedupe_by_content(consolidated);
        outcome.after = self.records.len();
        self.last_consolidated = Some(today);

        self.persist_or_warn();
        if let Some(marker) = &self.paths.marker {
            if let Err(e) = save_marker(marker, today) {
                warn!("Failed to save {} consolidation marker: {}", self.tier, e);
            }
        }

        info!(
            "Consolidated {} memory: {} -> {} records ({} groups merged, {} expired)",
            self.tier, outcome.before, outcome.after, outcome.merged_groups, outcome.expired_dropped
        );
        outcome
    }
}

impl TierStore for AnchorStore {
    fn tier(&self) -> MemoryTier {
        self.tier
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn persist(&self) -> Result<()> {
        save_records(&self.paths.records, &self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{KeywordExtractor, TextInference};
    use crate::testing::{
        FailingExtractor, FailingInference, date, services_at, services_with, strings, test_config,
    };
    use crate::types::links_consistent;
    use std::sync::Arc;

    // ─────────────────────────────────────────────────────────────────────────────
    // Add / Query Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_add_and_query_long_term() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));

        let record = store.add("loves operas", Some(strings(&["travel", "music"])));
        assert_eq!(record.links.len(), 1);
        assert!(record.links[0].touches("travel") && record.links[0].touches("music"));
        assert_eq!(record.retention.unwrap().expires_at, date(2025, 6, 30));

        let hits = store.query_by_anchor(&strings(&["music"]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "loves operas");
        assert_eq!(hits[0].access_count(), 1);
    }

    #[test]
    fn test_access_count_grows_per_query_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let services = services_at(date(2025, 1, 1));
        let mut store = AnchorStore::long_term(&config, &services);
        store.add("loves operas", Some(strings(&["travel", "music"])));

        for _ in 0..3 {
            store.query_by_anchor(&strings(&["travel"]));
        }
        store.query_by_anchor(&strings(&["weather"]));

        let reopened = AnchorStore::long_term(&config, &services);
        assert_eq!(reopened.records()[0].access_count(), 3);
    }

    #[test]
    fn test_add_extracts_anchors_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));

        let record = store.add("the user adores opera and dessert", None);
        assert_eq!(record.anchors, strings(&["user", "opera", "dessert"]));
        assert!(links_consistent(&record.anchors, &record.links));
        assert!(record.retention.is_none());

        let record = store.add("user birthday", Some(vec![]));
        assert_eq!(record.anchors, strings(&["user", "birthday"]));
    }

    #[test]
    fn test_add_falls_back_to_whitespace_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.max_anchors = 3;
        let services = services_with(
            Arc::new(FailingExtractor) as Arc<dyn KeywordExtractor>,
            Arc::new(FailingInference) as Arc<dyn TextInference>,
            date(2025, 1, 1),
        );
        let mut store = AnchorStore::core(&config, &services);

        let record = store.add("one two three four", None);
        assert_eq!(record.anchors, strings(&["one", "two", "three"]));
        assert_eq!(record.links.len(), 3);
    }

    #[test]
    fn test_query_dedupes_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("likes cake", Some(strings(&["dessert"])));
        store.add("likes cake", Some(strings(&["cake", "dessert"])));
        store.add("likes rain", Some(strings(&["weather"])));

        let hits = store.query_by_anchor(&strings(&["dessert"]));
        assert_eq!(hits.len(), 1);
        assert!(store.query_by_anchor(&[]).is_empty());
    }

    #[test]
    fn test_query_matches_through_link() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));
        let mut record = store.add("legacy", Some(strings(&["user"])));
        record.links = vec![crate::types::Link::new("user", "birthday")];
        store.records[0] = record;

        assert_eq!(store.query_by_anchor(&strings(&["birthday"])).len(), 1);
    }

    #[test]
    fn test_expired_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.long_term_ttl_days = 1;
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("fleeting", Some(strings(&["weather"])));

        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 2)));
        assert!(!store.needs_consolidation());
        assert_eq!(store.len(), 1);
        assert!(store.query_by_anchor(&strings(&["weather"])).is_empty());
        assert!(store.top_accessed(3).is_empty());

        let outcome = store.consolidate();
        assert_eq!(outcome.expired_dropped, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_top_accessed_orders_by_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("first", Some(strings(&["a"])));
        store.add("second", Some(strings(&["b"])));
        store.add("third", Some(strings(&["c"])));
        store.query_by_anchor(&strings(&["c"]));
        store.query_by_anchor(&strings(&["c"]));
        store.query_by_anchor(&strings(&["b"]));

        let top: Vec<&str> = store.top_accessed(3).iter().map(|r| r.content.as_str()).collect();
        assert_eq!(top, vec!["third", "second", "first"]);
        assert_eq!(store.top_accessed(1).len(), 1);
    }

    #[test]
    fn test_top_accessed_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("first", Some(strings(&["a"])));
        store.add("second", Some(strings(&["b"])));

        let top: Vec<&str> = store.top_accessed(2).iter().map(|r| r.content.as_str()).collect();
        assert_eq!(top, vec!["first", "second"]);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Merge Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_merge_into_matches_without_match_adds() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("likes rain", Some(strings(&["weather"])));

        let record = store.merge_into_matches(&strings(&["music"]), "new fact");
        assert_eq!(store.len(), 2);
        assert_eq!(record.content, "new fact");
        assert_eq!(record.anchors, strings(&["music"]));
        assert_eq!(record.access_count(), 0);
    }

    #[test]
    fn test_merge_into_matches_folds_matches() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("likes cake", Some(strings(&["dessert"])));
        store.add("likes rain", Some(strings(&["weather"])));
        store.add("likes mousse", Some(strings(&["dessert", "mousse"])));

        let merged = store.merge_into_matches(&strings(&["dessert"]), "hates cake now");
        assert_eq!(store.len(), 2);
        assert_eq!(merged.content, "likes cake\nlikes mousse\nhates cake now");
        assert_eq!(merged.anchors, strings(&["cake", "mousse"]));
        assert!(links_consistent(&merged.anchors, &merged.links));
        // One access from the lookup, one from the update.
        assert_eq!(merged.access_count(), 2);
        assert_eq!(store.records()[0], merged);
        assert_eq!(store.records()[1].content, "likes rain");
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Consolidation Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_fresh_store_consolidates_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));

        assert_eq!(store.last_consolidated(), Some(date(2025, 1, 1)));
        assert!(config.paths(MemoryTier::Core).marker.unwrap().exists());
    }

    #[test]
    fn test_consolidate_merges_shared_anchor_and_sums_counts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("likes chocolate cake", Some(strings(&["dessert", "cake"])));
        store.add("likes mousse", Some(strings(&["dessert"])));
        store.add("likes rain", Some(strings(&["weather"])));
        store.query_by_anchor(&strings(&["cake"]));
        store.query_by_anchor(&strings(&["dessert"]));
        let untouched = store.records()[2].clone();

        let outcome = store.consolidate();

        assert_eq!(outcome.before, 3);
        assert_eq!(outcome.after, 2);
        assert_eq!(outcome.merged_groups, 1);
        assert_eq!(outcome.fallback_merges, 0);
        assert!(outcome.has_changes());

        let merged = &store.records()[0];
        assert_eq!(merged.content, "likes chocolate cake & likes mousse");
        assert_eq!(merged.access_count(), 3);
        assert!(links_consistent(&merged.anchors, &merged.links));
        assert_eq!(store.records()[1], untouched);
    }

    #[test]
    fn test_consolidate_falls_back_when_inference_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let base = services_at(date(2025, 1, 1));
        let services = services_with(
            base.extractor.clone(),
            Arc::new(FailingInference) as Arc<dyn TextInference>,
            date(2025, 1, 1),
        );
        let mut store = AnchorStore::core(&config, &services);
        store.add("opera fan", Some(strings(&["opera"])));
        store.add("opera singer", Some(strings(&["opera"])));

        let outcome = store.consolidate();
        assert_eq!(outcome.fallback_merges, 1);
        assert_eq!(store.records()[0].content, "opera fan\nopera singer");
    }

    #[test]
    fn test_consolidate_removes_duplicate_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));
        store.add("same", Some(strings(&["a"])));
        store.add("same", Some(strings(&["b"])));

        let outcome = store.consolidate();
        assert_eq!(outcome.after, 1);
        assert_eq!(outcome.merged_groups, 0);
        assert_eq!(store.records()[0].anchors, strings(&["a"]));
    }

    #[test]
    fn test_consolidation_is_scheduled_by_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 1)));
        store.add("likes cake", Some(strings(&["dessert"])));
        store.add("likes mousse", Some(strings(&["dessert"])));

        let store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 3)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.last_consolidated(), Some(date(2025, 1, 1)));

        let store = AnchorStore::long_term(&config, &services_at(date(2025, 1, 4)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_consolidated(), Some(date(2025, 1, 4)));
        assert!(!store.needs_consolidation());
    }

    #[test]
    fn test_future_marker_is_not_due() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let marker = config.paths(MemoryTier::Core).marker.unwrap();
        save_marker(&marker, date(2025, 2, 1)).unwrap();

        let store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));
        assert!(!store.needs_consolidation());
        assert_eq!(store.last_consolidated(), Some(date(2025, 2, 1)));
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = test_config(&blocker.join("memory"));

        let mut store = AnchorStore::core(&config, &services_at(date(2025, 1, 1)));
        store.add("still remembered", Some(strings(&["user"])));
        assert!(store.persist().is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.query_by_anchor(&strings(&["user"])).len(), 1);
    }
}
