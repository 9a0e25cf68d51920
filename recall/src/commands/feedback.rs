//! Producer feedback import.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use recall_core::{MemoryManager, load_feedback};

/// Load corrections from `file` and fold them into long-term memory.
pub fn execute(manager: &mut MemoryManager, file: &Path, json: bool) -> Result<()> {
    let entries = load_feedback(file)
        .with_context(|| format!("Failed to load feedback from {}", file.display()))?;
    let applied = manager.learn_from_feedback(&entries);

    if json {
        println!(
            "{}",
            serde_json::json!({ "loaded": entries.len(), "applied": applied })
        );
        return Ok(());
    }

    println!(
        "{} Applied {} of {} corrections to {}",
        "✓".green(),
        applied.to_string().bold(),
        entries.len(),
        manager.config().character_id.bold()
    );
    Ok(())
}
