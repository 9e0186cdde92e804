use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::importer::{RangeSpec, SourceKind, SourceSpec};

/// Where the monthly ledger grid comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// `csv`, `xlsx` or `sheets`. Empty means detect from `location`.
    #[serde(default)]
    pub kind: String,
    /// File path, or spreadsheet id for Google Sheets.
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_range")]
    pub range: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_range() -> String {
    "Monthly!AF:AR".to_string()
}

fn default_api_key_env() -> String {
    "SHEETS_API_KEY".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: String::new(),
            location: String::new(),
            range: default_range(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            source: SourceSettings::default(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Settings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Resolve the configured source, with command-line overrides applied on
    /// top. The API key is read from the environment only for Sheets.
    pub fn source_spec(
        &self,
        location: Option<&str>,
        kind: Option<&str>,
        range: Option<&str>,
    ) -> Result<SourceSpec> {
        let location = location.unwrap_or(&self.source.location).trim().to_string();
        if location.is_empty() {
            return Err(LedgerError::Settings(
                "no source configured; pass --source or set source.location in settings.json".into(),
            ));
        }
        let kind = match kind.unwrap_or(&self.source.kind).trim() {
            "" => SourceKind::detect(&location),
            key => SourceKind::from_key(key)?,
        };
        let range = range.unwrap_or(&self.source.range).trim();
        let range = if range.is_empty() { None } else { Some(RangeSpec::parse(range)?) };
        let api_key = if kind.needs_api_key() {
            std::env::var(&self.source.api_key_env).ok()
        } else {
            None
        };
        Ok(SourceSpec {
            kind,
            location,
            range,
            api_key,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        })
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("churchbooks")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("churchbooks")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LedgerError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
