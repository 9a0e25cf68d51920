//! recall - Memory maintenance CLI
//!
//! Opens one character's tiered memory, runs the requested maintenance, and
//! exits. Consolidation that is already due runs while the memory opens.

use anyhow::{Context, Result};
use clap::Parser;
use recall_core::{MemoryConfig, MemoryManager, Services};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("recall_core=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    info!(
        "Config resolved: character '{}' in {:?}",
        config.character_id, config.data_dir
    );

    let services = Services::command(&cli.infer)
        .with_context(|| format!("Inference program {} is unavailable", cli.infer.display()))?;
    let mut manager = MemoryManager::open(config, services).context("Failed to open memory")?;

    match &cli.command {
        Commands::Consolidate => commands::consolidate::execute(&mut manager, cli.json),
        Commands::Feedback { file } => commands::feedback::execute(&mut manager, file, cli.json),
        Commands::Stats => commands::stats::execute(&manager, cli.json),
    }
}

/// Load the config named on the command line, or the one under `RECALL_DIR`.
fn resolve_config(cli: &Cli) -> Result<MemoryConfig> {
    let config = match &cli.config {
        Some(path) => MemoryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MemoryConfig::from_env().context("Failed to load config")?,
    };

    let config = match &cli.character {
        Some(character) => config.with_character(character.as_str()),
        None => config,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_from_file_with_character_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "character_id = \"furina\"\nmax_anchors = 4\n").unwrap();

        let cli = Cli::try_parse_from([
            "recall",
            "--config",
            path.to_str().unwrap(),
            "--character",
            "neuvillette",
            "stats",
        ])
        .unwrap();

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.character_id, "neuvillette");
        assert_eq!(config.max_anchors, 4);
    }

    #[test]
    fn test_resolve_config_rejects_blank_character() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let cli = Cli::try_parse_from([
            "recall",
            "--config",
            path.to_str().unwrap(),
            "--character",
            " ",
            "stats",
        ])
        .unwrap();

        assert!(resolve_config(&cli).is_err());
    }
}
