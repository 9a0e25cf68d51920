//! Memory consolidation utilities.
//!
//! Handles grouping anchored records that share concepts and merging each group
//! into a single record.
//!
//! Records are grouped by connected components over shared anchors: two records
//! sharing any anchor end up in the same group, transitively. Each record is
//! therefore merged at most once, even when it carries several anchors.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::services::{KeywordExtractor, TextInference, anchors_or_fallback};
use crate::types::{MemoryRecord, Retention};

/// Result of consolidating one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationOutcome {
    /// Records before the pass.
    pub before: usize,
    /// Records after the pass.
    pub after: usize,
    /// Groups of two or more records that were merged.
    pub merged_groups: usize,
    /// Expired long-term records dropped.
    pub expired_dropped: usize,
    /// Merges that fell back to joining content because inference failed.
    pub fallback_merges: usize,
}

impl ConsolidationOutcome {
    /// Check if the pass changed the collection.
    pub fn has_changes(&self) -> bool {
        self.merged_groups > 0 || self.expired_dropped > 0 || self.before != self.after
    }
}

/// Disjoint-set over record indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the smaller index as root so group order follows insertion order.
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Group record indices by shared anchors.
///
/// Groups are ordered by their first member and members keep insertion order.
/// Records without anchors always form their own group.
pub fn group_by_shared_anchors(records: &[MemoryRecord]) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::new(records.len());
    let mut first_holder: HashMap<&str, usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        for anchor in &record.anchors {
            match first_holder.get(anchor.as_str()) {
                Some(&holder) => sets.union(holder, idx),
                None => {
                    first_holder.insert(anchor.as_str(), idx);
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for idx in 0..records.len() {
        let root = sets.find(idx);
        match group_of_root.get(&root) {
            Some(&g) => groups[g].push(idx),
            None => {
                group_of_root.insert(root, groups.len());
                groups.push(vec![idx]);
            }
        }
    }
    groups
}

/// Drop records whose content repeats an earlier one.
///
/// Access counts of dropped duplicates are added to the survivor.
pub fn dedupe_by_content(records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<MemoryRecord> = Vec::with_capacity(records.len());

    for record in records {
        match position.get(&record.content) {
            Some(&idx) => {
                if let (Some(kept), Some(dup)) = (unique[idx].retention.as_mut(), record.retention) {
                    kept.access_count += dup.access_count;
                }
            }
            None => {
                position.insert(record.content.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Prompt asking the model to merge a group of memories.
pub fn merge_prompt(contents: &[&str]) -> String {
    let mut prompt = String::from(
        "Merge the following memories into one. Keep every key fact and drop redundancy.\n\
         Output only the merged memory.\n",
    );
    for content in contents {
        prompt.push_str("- ");
        prompt.push_str(content);
        prompt.push('\n');
    }
    prompt
}

/// Local merge used when inference is unavailable.
pub fn fallback_merge(contents: &[&str]) -> String {
    let mut seen = HashSet::new();
    contents
        .iter()
        .filter(|c| seen.insert(**c))
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merge a group of two or more records into one replacement record.
///
/// Returns the record and whether the local fallback produced its content.
pub fn merge_group(
    group: &[&MemoryRecord],
    inference: &dyn TextInference,
    extractor: &dyn KeywordExtractor,
    max_anchors: usize,
    today: NaiveDate,
) -> (MemoryRecord, bool) {
    let contents: Vec<&str> = group.iter().map(|r| r.content.as_str()).collect();

    let (content, fell_back) = match inference.run(&merge_prompt(&contents)) {
        Ok(merged) if !merged.trim().is_empty() => (merged.trim().to_string(), false),
        Ok(_) => {
            warn!("Inference returned an empty merge, joining {} records", contents.len());
            (fallback_merge(&contents), true)
        }
        Err(e) => {
            warn!("Inference failed, joining {} records: {}", contents.len(), e);
            (fallback_merge(&contents), true)
        }
    };

    let anchors = anchors_or_fallback(extractor, &content, max_anchors);
    let mut merged = MemoryRecord::new(content, anchors, today);
    merged.created_at = group
        .iter()
        .map(|r| r.created_at)
        .min()
        .unwrap_or(today);

    // The merged record keeps the first member's expiry; counts add up.
    if let Some(first) = group.iter().find_map(|r| r.retention) {
        merged.retention = Some(Retention {
            expires_at: first.expires_at,
            access_count: group.iter().map(|r| r.access_count()).sum(),
        });
    }

    (merged, fell_back)
}
