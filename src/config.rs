use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/145.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unable to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub allow_insecure_tls: bool,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            allow_insecure_tls: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Anything else on the entry, e.g. `kind` for the community plaza.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    pub fn new(source_type: &str, label: &str) -> Self {
        Self {
            source_type: source_type.to_string(),
            label: Some(label.to_string()),
            enabled: true,
            params: Map::new(),
        }
    }

    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(&self.source_type)
    }

    /// Integer parameter, accepting both `2` and `"2"`.
    pub fn param_u32(&self, key: &str) -> Option<u32> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpSettings,
    pub sources: Vec<SourceConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.http.timeout_secs == 0 {
            return Err("http.timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .filter(|source| source.enabled)
            .cloned()
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<AppConfig, serde_json::Error> {
    serde_json::from_str(contents)
}
