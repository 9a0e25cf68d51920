//! Record counts per tier.

use anyhow::Result;
use colored::Colorize;
use recall_core::MemoryManager;

pub fn execute(manager: &MemoryManager, json: bool) -> Result<()> {
    let stats = manager.tier_counts();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} Memory Statistics", "📊".cyan());
    println!();
    println!("  Total records: {}", stats.total.to_string().bold());
    println!();
    println!("  By tier:");
    println!("    Core:       {}", stats.core.to_string().green());
    println!("    Long-term:  {}", stats.long_term.to_string().cyan());
    println!("    Temporary:  {}", stats.temporary.to_string().yellow());

    if let Some(date) = manager.long_term().last_consolidated() {
        println!();
        println!("  Long-term last consolidated: {}", date);
    }

    Ok(())
}
