/// Configuration for the lanesync CLI.
/// Reads config.json from ~/.config/lanesync/config.json (or platform equivalent).

use lanesync_core::SyncSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Boards `watch` tracks when no files are given on the command line.
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
    #[serde(flatten)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub file: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Default config path: ~/.config/lanesync/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lanesync")
        .join("config.json")
}

/// Load config from path. Returns default if the file doesn't exist or
/// doesn't parse.
pub fn load_config(path: &Path) -> CliConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[lanesync.config] Failed to parse config {}: {}", path.display(), e);
            CliConfig::default()
        }),
        Err(_) => {
            log::info!("[lanesync.config] No config at {}, using defaults", path.display());
            CliConfig::default()
        }
    }
}

/// Expand `~/` and resolve relative entries against the config's directory.
pub fn resolve_document_path(file: &str, config_path: &Path) -> PathBuf {
    if let Some(rest) = file.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(file);
    if path.is_absolute() {
        return path;
    }
    config_path
        .parent()
        .map(|dir| dir.join(&path))
        .unwrap_or(path)
}
