//! Configuration for the memory subsystem.
//!
//! Configuration is loaded with precedence:
//! 1. Environment (`RECALL_DIR` selects the base directory)
//! 2. Config file (`<base>/config.toml`)
//! 3. Default values
//!
//! Standard directory structure:
//! ```text
//! ~/.recall/
//! ├── config.toml                          # Optional overrides
//! └── memory/
//!     ├── <character>_core_memory.json         # Core records
//!     ├── <character>_core_consolidation.json  # Last core consolidation date
//!     ├── <character>_long_memory.json         # Long-term records
//!     ├── <character>_long_consolidation.json  # Last long-term consolidation date
//!     └── <character>_temp_memory.json         # Temporary turn records
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::MemoryTier;

/// Environment variable overriding the base directory.
pub const RECALL_DIR_ENV: &str = "RECALL_DIR";

/// Upper bound for every day count in the configuration (100 years).
pub const MAX_DAYS: i64 = 36_500;

/// Memory system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding the per-tier files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Prefix for every file owned by one character
    #[serde(default = "default_character_id")]
    pub character_id: String,

    /// Maximum anchors extracted per record (default: 5)
    #[serde(default = "default_max_anchors")]
    pub max_anchors: usize,

    /// Days between consolidation passes (default: 3)
    #[serde(default = "default_consolidation_interval_days")]
    pub consolidation_interval_days: i64,

    /// Lifetime of a long-term record in days (default: 180)
    #[serde(default = "default_long_term_ttl_days")]
    pub long_term_ttl_days: i64,

    /// Lifetime of a temporary record in days (default: 3)
    #[serde(default = "default_temporary_ttl_days")]
    pub temporary_ttl_days: i64,

    /// Maximum entries returned as topic material (default: 3)
    #[serde(default = "default_topic_material_limit")]
    pub topic_material_limit: usize,

    /// Tiers that contribute topic material
    #[serde(default = "default_topic_tiers")]
    pub topic_tiers: Vec<MemoryTier>,
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".recall")
}

fn default_data_dir() -> PathBuf {
    default_base_dir().join("memory")
}

fn default_character_id() -> String {
    "companion".to_string()
}

fn default_max_anchors() -> usize {
    5
}

fn default_consolidation_interval_days() -> i64 {
    3
}

fn default_long_term_ttl_days() -> i64 {
    180
}

fn default_temporary_ttl_days() -> i64 {
    3
}

fn default_topic_material_limit() -> usize {
    3
}

fn default_topic_tiers() -> Vec<MemoryTier> {
    vec![MemoryTier::Core, MemoryTier::LongTerm]
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            character_id: default_character_id(),
            max_anchors: default_max_anchors(),
            consolidation_interval_days: default_consolidation_interval_days(),
            long_term_ttl_days: default_long_term_ttl_days(),
            temporary_ttl_days: default_temporary_ttl_days(),
            topic_material_limit: default_topic_material_limit(),
            topic_tiers: default_topic_tiers(),
        }
    }
}

/// File locations for one character's tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPaths {
    pub records: PathBuf,
    pub marker: Option<PathBuf>,
}

impl MemoryConfig {
    /// Load configuration from a TOML file, falling back to defaults if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the base directory from `RECALL_DIR` (or `~/.recall`) and load `config.toml` there.
    ///
    /// When the file does not set `data_dir`, records live in `<base>/memory`.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var(RECALL_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_base_dir());

        let config_path = base.join("config.toml");
        let mut config = Self::load(&config_path)?;

        let data_dir_set = std::fs::read_to_string(&config_path)
            .ok()
            .and_then(|raw| raw.parse::<toml::Table>().ok())
            .is_some_and(|table| table.contains_key("data_dir"));
        if !data_dir_set {
            config.data_dir = base.join("memory");
        }

        Ok(config)
    }

    /// Set the character whose files are used
    pub fn with_character(mut self, character_id: impl Into<String>) -> Self {
        self.character_id = character_id.into();
        self
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.character_id.trim().is_empty() {
            return Err(ConfigValidationError::MissingCharacterId);
        }

        let positive = [
            ("max_anchors", self.max_anchors as i64),
            ("long_term_ttl_days", self.long_term_ttl_days),
            ("temporary_ttl_days", self.temporary_ttl_days),
            ("topic_material_limit", self.topic_material_limit as i64),
        ];
        for (field, value) in positive {
            if value <= 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        if self.consolidation_interval_days < 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "consolidation_interval_days".into(),
                message: "must not be negative".into(),
            });
        }

        let day_counts = [
            ("consolidation_interval_days", self.consolidation_interval_days),
            ("long_term_ttl_days", self.long_term_ttl_days),
            ("temporary_ttl_days", self.temporary_ttl_days),
        ];
        for (field, value) in day_counts {
            if value > MAX_DAYS {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: format!("must be at most {} days", MAX_DAYS),
                });
            }
        }

        Ok(())
    }

    /// Paths for a tier's record file and consolidation marker.
    ///
    /// The temporary tier is never consolidated and has no marker.
    pub fn paths(&self, tier: MemoryTier) -> TierPaths {
        let prefix = match tier {
            MemoryTier::Core => "core",
            MemoryTier::LongTerm => "long",
            MemoryTier::Temporary => "temp",
        };
        let file = |suffix: &str| {
            self.data_dir
                .join(format!("{}_{}_{}.json", self.character_id, prefix, suffix))
        };

        TierPaths {
            records: file("memory"),
            marker: match tier {
                MemoryTier::Temporary => None,
                _ => Some(file("consolidation")),
            },
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("character_id is required")]
    MissingCharacterId,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
