//! Application configuration for BrandGraph.
//!
//! User config lives at `~/.brandgraph/brandgraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BrandGraphError, Result};
use crate::status::{PageCategory, parse_vocabulary};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "brandgraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".brandgraph";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "brandgraph.db";

// ---------------------------------------------------------------------------
// Config structs (matching brandgraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Bulk ingestion defaults.
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Generation status tracking.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. Defaults to `~/.brandgraph/brandgraph.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[ingestion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Category stored for newly inserted pages that arrive without one.
    #[serde(default = "default_page_category")]
    pub default_page_category: String,

    /// `should_scrape` stored for newly inserted pages that arrive without one.
    #[serde(default = "default_true")]
    pub default_should_scrape: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_page_category: default_page_category(),
            default_should_scrape: true,
        }
    }
}

fn default_page_category() -> String {
    "other".into()
}
fn default_true() -> bool {
    true
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// In-progress markers older than this are reported as stale.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

fn default_stale_after_minutes() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Ingest defaults (runtime, resolved from config)
// ---------------------------------------------------------------------------

/// Resolved defaults applied to first-time page inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDefaults {
    pub page_category: PageCategory,
    pub should_scrape: bool,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self {
            page_category: PageCategory::Other,
            should_scrape: true,
        }
    }
}

impl TryFrom<&AppConfig> for PageDefaults {
    type Error = BrandGraphError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let page_category = parse_vocabulary(&config.ingestion.default_page_category)
            .map_err(|e| BrandGraphError::config(format!("[ingestion] {e}")))?;
        Ok(Self {
            page_category,
            should_scrape: config.ingestion.default_should_scrape,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.brandgraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BrandGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.brandgraph/brandgraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: explicit override, then config, then default.
pub fn database_path(config: &AppConfig, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    match &config.database.path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BrandGraphError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BrandGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BrandGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BrandGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BrandGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("default_page_category"));
        assert!(toml_str.contains("stale_after_minutes"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[database]
path = "/tmp/brandgraph-test.db"

[generation]
stale_after_minutes = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.database.path.as_deref(), Some("/tmp/brandgraph-test.db"));
        assert_eq!(config.generation.stale_after_minutes, 5);
        assert_eq!(config.ingestion.default_page_category, "other");
        assert!(config.ingestion.default_should_scrape);
    }

    #[test]
    fn page_defaults_from_config() {
        let mut config = AppConfig::default();
        config.ingestion.default_page_category = "blog".into();
        config.ingestion.default_should_scrape = false;
        let defaults = PageDefaults::try_from(&config).expect("resolve");
        assert_eq!(defaults.page_category, PageCategory::Blog);
        assert!(!defaults.should_scrape);
    }

    #[test]
    fn page_defaults_reject_unknown_category() {
        let mut config = AppConfig::default();
        config.ingestion.default_page_category = "misc".into();
        let err = PageDefaults::try_from(&config).unwrap_err();
        assert!(err.to_string().contains("[ingestion]"));
    }

    #[test]
    fn database_path_prefers_override() {
        let mut config = AppConfig::default();
        config.database.path = Some("/var/lib/brandgraph.db".into());
        let path = database_path(&config, Some(Path::new("/tmp/x.db"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.db"));
        let path = database_path(&config, None).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/brandgraph.db"));
    }
}
