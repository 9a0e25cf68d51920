//! Explicit maintenance pass over every tier.

use anyhow::Result;
use colored::Colorize;
use recall_core::MemoryManager;

/// Run consolidation on core and long-term and prune temporary.
pub fn execute(manager: &mut MemoryManager, json: bool) -> Result<()> {
    let report = manager.consolidate_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Consolidated memory for {}",
        "✓".green(),
        manager.config().character_id.bold()
    );
    println!();
    for line in report.to_string().lines() {
        println!("  {}", line);
    }
    if report.core.fallback_merges + report.long_term.fallback_merges > 0 {
        println!();
        println!(
            "{} Some groups were joined without the model; check the inference program",
            "⚠".yellow()
        );
    }

    Ok(())
}
