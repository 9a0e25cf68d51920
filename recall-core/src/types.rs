//! Shared types for recall.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

// ─────────────────────────────────────────────────────────────────────────────
// Memory Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// Memory tier of the companion's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Permanent facts; never expire.
    Core,
    /// Expiring facts ranked by access.
    LongTerm,
    /// Recent conversation turns; pruned by age.
    Temporary,
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTier::Core => write!(f, "core"),
            MemoryTier::LongTerm => write!(f, "long_term"),
            MemoryTier::Temporary => write!(f, "temporary"),
        }
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(MemoryTier::Core),
            "long_term" => Ok(MemoryTier::LongTerm),
            "temporary" => Ok(MemoryTier::Temporary),
            _ => Err(format!("Invalid memory tier: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Anchors and Links
// ─────────────────────────────────────────────────────────────────────────────

/// Trim, drop empties and repeats (keeping first occurrence), and cap at `max`.
pub fn normalize_anchors<I>(anchors: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    anchors
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.clone()))
        .take(max)
        .collect()
}

/// Unordered pair of anchors that co-occur in one record.
///
/// Serialized as a two-element array in the order it was built;
/// equality and hashing ignore the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link(pub String, pub String);

impl Link {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self(a.into(), b.into())
    }

    /// Whether `anchor` is either end of the pair.
    pub fn touches(&self, anchor: &str) -> bool {
        self.0 == anchor || self.1 == anchor
    }

    fn ordered(&self) -> (&str, &str) {
        if self.0 <= self.1 {
            (&self.0, &self.1)
        } else {
            (&self.1, &self.0)
        }
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.ordered() == other.ordered()
    }
}

impl Eq for Link {}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordered().hash(state);
    }
}

/// Every 2-combination of `anchors`, in index order.
pub fn compute_links(anchors: &[String]) -> Vec<Link> {
    let mut links = Vec::new();
    for i in 0..anchors.len() {
        for j in (i + 1)..anchors.len() {
            links.push(Link::new(anchors[i].clone(), anchors[j].clone()));
        }
    }
    links
}

/// Whether `links` is exactly the complete graph over `anchors`.
pub fn links_consistent(anchors: &[String], links: &[Link]) -> bool {
    let expected: HashSet<Link> = compute_links(anchors).into_iter().collect();
    let actual: HashSet<Link> = links.iter().cloned().collect();
    links.len() == expected.len() && expected == actual
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Long-term extension of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    pub expires_at: NaiveDate,
    pub access_count: u64,
}

impl Retention {
    /// Retention starting today with no accesses.
    ///
    /// Lifetimes past the calendar's end saturate at `NaiveDate::MAX`.
    pub fn starting(today: NaiveDate, ttl_days: i64) -> Self {
        let expires_at = TimeDelta::try_days(ttl_days)
            .and_then(|ttl| today.checked_add_signed(ttl))
            .unwrap_or(NaiveDate::MAX);
        Self {
            expires_at,
            access_count: 0,
        }
    }

    /// A record stays valid strictly before its expiry date.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today >= self.expires_at
    }
}

/// Anchored record held by the core and long-term tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub content: String,
    pub anchors: Vec<String>,
    pub links: Vec<Link>,
    pub created_at: NaiveDate,
    pub updated_at: NaiveDate,
    /// Present only for long-term records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
}

impl MemoryRecord {
    /// Create a record dated `today` whose links are derived from `anchors`.
    pub fn new(content: impl Into<String>, anchors: Vec<String>, today: NaiveDate) -> Self {
        let links = compute_links(&anchors);
        Self {
            content: content.into(),
            anchors,
            links,
            created_at: today,
            updated_at: today,
            retention: None,
        }
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Replace the anchors and rebuild the link set.
    pub fn set_anchors(&mut self, anchors: Vec<String>) {
        self.links = compute_links(&anchors);
        self.anchors = anchors;
    }

    /// Direct anchor hit, or a query anchor at either end of a stored link.
    pub fn matches(&self, query: &[String]) -> bool {
        query.iter().any(|q| self.anchors.contains(q))
            || self
                .links
                .iter()
                .any(|link| query.iter().any(|q| link.touches(q)))
    }

    pub fn access_count(&self) -> u64 {
        self.retention.map(|r| r.access_count).unwrap_or(0)
    }

    /// Core records never expire.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.retention.is_some_and(|r| r.is_expired(today))
    }

    pub(crate) fn touch(&mut self) {
        if let Some(retention) = self.retention.as_mut() {
            retention.access_count += 1;
        }
    }
}

/// One conversational turn held by the temporary tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryRecord {
    pub content: String,
    pub context: String,
    pub created_at: NaiveDateTime,
}
