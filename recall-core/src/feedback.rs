//! Corrections supplied by the character's producer.
//!
//! A feedback file is a JSON array of objects:
//!
//! ```json
//! [
//!   {
//!     "user_input": "What's my favourite dessert?",
//!     "character_response": "Ice cream, I think.",
//!     "correct_response": "Chocolate mousse, you told me last week!"
//!   }
//! ]
//! ```
//!
//! Each usable correction is folded into long-term memory under anchors
//! extracted from the question and the corrected reply.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::memory::MemoryManager;

/// One corrected exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_input: String,
    pub character_response: String,
    pub correct_response: String,
}

impl FeedbackEntry {
    /// Memory content recorded for this correction.
    pub fn memory_content(&self) -> String {
        format!(
            "User: {} | Correct reply: {}",
            self.user_input.trim(),
            self.correct_response.trim()
        )
    }

    fn is_usable(&self) -> bool {
        !self.user_input.trim().is_empty() && !self.correct_response.trim().is_empty()
    }
}

/// Load a feedback file.
///
/// The file must exist and hold a JSON array. Entries missing a field are skipped.
pub fn load_feedback(path: &Path) -> Result<Vec<FeedbackEntry>> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidFeedback(format!("{}: {}", path.display(), e)))?;

    let serde_json::Value::Array(items) = value else {
        return Err(Error::InvalidFeedback(format!(
            "{}: expected a JSON array",
            path.display()
        )));
    };

    let total = items.len();
    let entries: Vec<FeedbackEntry> = items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping feedback entry {}: {}", idx, e);
                None
            }
        })
        .collect();

    info!("Loaded {}/{} feedback entries from {:?}", entries.len(), total, path);
    Ok(entries)
}

impl MemoryManager {
    /// Fold corrections into long-term memory. Returns how many were applied.
    pub fn learn_from_feedback(&mut self, entries: &[FeedbackEntry]) -> usize {
        let mut applied = 0;
        for entry in entries {
            if !entry.is_usable() {
                warn!("Skipping feedback without input or correction");
                continue;
            }
            let anchors = self.extract_anchors(&format!(
                "{} {}",
                entry.user_input, entry.correct_response
            ));
            self.update_by_anchor(&anchors, &entry.memory_content(), false);
            applied += 1;
        }
        applied
    }
}
