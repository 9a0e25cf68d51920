//! JSON persistence for tier files.
//!
//! The on-disk shape keeps the field names of older installations
//! (`anchor_words`, `create_time`, `expire_date`, ...) and every field is optional.
//! Loading runs an explicit upgrade step from [`StoredRecord`] to [`MemoryRecord`]
//! instead of patching missing fields in place.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{
    Link, MemoryRecord, MemoryTier, Retention, TemporaryRecord, compute_links, links_consistent,
    normalize_anchors,
};

/// Calendar date format used in tier files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format used for temporary records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Defaults applied while upgrading stored records.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeContext {
    pub tier: MemoryTier,
    pub today: NaiveDate,
    pub max_anchors: usize,
    pub long_term_ttl_days: i64,
}

/// Anchored record as written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "anchors")]
    pub anchor_words: Option<Vec<String>>,
    #[serde(default)]
    pub links: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_core: Option<bool>,
}

impl From<&MemoryRecord> for StoredRecord {
    fn from(record: &MemoryRecord) -> Self {
        Self {
            content: Some(record.content.clone()),
            anchor_words: Some(record.anchors.clone()),
            links: Some(
                record
                    .links
                    .iter()
                    .map(|l| vec![l.0.clone(), l.1.clone()])
                    .collect(),
            ),
            create_time: Some(record.created_at.format(DATE_FORMAT).to_string()),
            update_time: Some(record.updated_at.format(DATE_FORMAT).to_string()),
            expire_date: record
                .retention
                .map(|r| r.expires_at.format(DATE_FORMAT).to_string()),
            access_count: record.retention.map(|r| r.access_count),
            is_core: record.retention.is_none().then_some(true),
        }
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
}

impl StoredRecord {
    /// Upgrade to the typed record, defaulting whatever an older file lacks.
    ///
    /// Returns `None` only when there is no content to remember.
    pub fn upgrade(self, ctx: &UpgradeContext) -> Option<MemoryRecord> {
        let content = self.content?;

        let anchors = normalize_anchors(self.anchor_words.unwrap_or_default(), ctx.max_anchors);
        let links: Vec<Link> = self
            .links
            .unwrap_or_default()
            .into_iter()
            .filter_map(|pair| match pair.as_slice() {
                [a, b] => Some(Link::new(a.clone(), b.clone())),
                _ => None,
            })
            .collect();
        let links = if links_consistent(&anchors, &links) {
            links
        } else {
            compute_links(&anchors)
        };

        let created_at = parse_date(self.create_time.as_deref()).unwrap_or(ctx.today);
        let updated_at = parse_date(self.update_time.as_deref()).unwrap_or(ctx.today);

        let retention = match ctx.tier {
            MemoryTier::LongTerm => Some(Retention {
                expires_at: parse_date(self.expire_date.as_deref()).unwrap_or_else(|| {
                    Retention::starting(ctx.today, ctx.long_term_ttl_days).expires_at
                }),
                access_count: self.access_count.unwrap_or(0),
            }),
            _ => None,
        };

        Some(MemoryRecord {
            content,
            anchors,
            links,
            created_at,
            updated_at,
            retention,
        })
    }
}

/// Temporary record as written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTemporaryRecord {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub chat_context: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

impl From<&TemporaryRecord> for StoredTemporaryRecord {
    fn from(record: &TemporaryRecord) -> Self {
        Self {
            content: Some(record.content.clone()),
            chat_context: Some(record.context.clone()),
            create_time: Some(record.created_at.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl StoredTemporaryRecord {
    /// Records without content or a parseable timestamp cannot be aged and are dropped.
    pub fn upgrade(self) -> Option<TemporaryRecord> {
        let created_at =
            NaiveDateTime::parse_from_str(self.create_time?.trim(), TIMESTAMP_FORMAT).ok()?;
        Some(TemporaryRecord {
            content: self.content?,
            context: self.chat_context.unwrap_or_default(),
            created_at,
        })
    }
}

/// Consolidation marker file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConsolidationMarker {
    #[serde(default)]
    last_comb_date: Option<String>,
}

/// Load a JSON array of entries.
///
/// A missing, empty, or unparseable file yields an empty list; entries that do not
/// match `T` are skipped individually.
pub fn load_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No tier file at {:?}", path);
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            warn!("Malformed tier file {:?}, treating as empty: {}", path, e);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping malformed entry {} in {:?}: {}", idx, path, e);
                None
            }
        })
        .collect()
}

/// Load and upgrade an anchored tier file.
pub fn load_records(path: &Path, ctx: &UpgradeContext) -> Vec<MemoryRecord> {
    load_entries::<StoredRecord>(path)
        .into_iter()
        .filter_map(|stored| {
            let upgraded = stored.upgrade(ctx);
            if upgraded.is_none() {
                warn!("Dropping {} record without content from {:?}", ctx.tier, path);
            }
            upgraded
        })
        .collect()
}

/// Load and upgrade the temporary tier file.
pub fn load_temporary(path: &Path) -> Vec<TemporaryRecord> {
    load_entries::<StoredTemporaryRecord>(path)
        .into_iter()
        .filter_map(StoredTemporaryRecord::upgrade)
        .collect()
}

/// Write `value` as pretty JSON, creating parent directories. Replaces the file.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn save_records(path: &Path, records: &[MemoryRecord]) -> Result<()> {
    let stored: Vec<StoredRecord> = records.iter().map(StoredRecord::from).collect();
    save_json(path, &stored)
}

pub fn save_temporary(path: &Path, records: &[TemporaryRecord]) -> Result<()> {
    let stored: Vec<StoredTemporaryRecord> =
        records.iter().map(StoredTemporaryRecord::from).collect();
    save_json(path, &stored)
}

/// Read the last consolidation date; absent or unreadable markers yield `None`.
pub fn load_marker(path: &Path) -> Option<NaiveDate> {
    let raw = std::fs::read_to_string(path).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ConsolidationMarker>(&raw) {
        Ok(marker) => parse_date(marker.last_comb_date.as_deref()),
        Err(e) => {
            warn!("Malformed consolidation marker {:?}: {}", path, e);
            None
        }
    }
}

pub fn save_marker(path: &Path, date: NaiveDate) -> Result<()> {
    save_json(
        path,
        &ConsolidationMarker {
            last_comb_date: Some(date.format(DATE_FORMAT).to_string()),
        },
    )
}
