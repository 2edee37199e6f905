//! Runtime configuration, loaded from a TOML file and overridable by env vars.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{PageError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Enable the scheduled shadowing-migration scan (C7).
    pub shadowing_scan: bool,
    /// Cron expression for the shadowing scan, standard five fields.
    pub shadowing_scan_expr: String,
    /// Enable the scheduled inventory full sweep (C8).
    pub inventory_sweep: bool,
    /// Cron expression for the inventory sweep, standard five fields.
    pub inventory_sweep_expr: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            shadowing_scan: true,
            shadowing_scan_expr: "0 */15 * * * *".to_string(),
            inventory_sweep: true,
            inventory_sweep_expr: "0 0 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// HTTP document-size limit referenced in spec §6/§8, in runes (chars).
    pub max_document_runes: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { max_document_runes: 2_000_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub fulltext_index_dir: PathBuf,
    pub cron: CronConfig,
    pub import: ImportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            fulltext_index_dir: PathBuf::from("data/_fulltext_index"),
            cron: CronConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// key the file omits. `NEXUS_DATA_DIR` and `NEXUS_LOG_LEVEL`, if set,
    /// override the corresponding fields after the file is parsed.
    ///
    /// # Errors
    /// Returns [`PageError::Config`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text).map_err(|e| PageError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        if let Ok(dir) = std::env::var("NEXUS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("NEXUS_LOG_LEVEL") {
            config.log_level = level;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/nexus.toml")).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert!(cfg.cron.shadowing_scan);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexus.toml");
        std::fs::write(&path, "data_dir = \"/tmp/pages\"\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/pages"));
        assert_eq!(cfg.import.max_document_runes, 2_000_000);
    }
}
