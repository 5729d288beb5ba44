use anyhow::Context;
use mend_core::RiskLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Typed view of `.mend/config.json`. Unknown keys are ignored, missing keys
/// fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MendConfig {
    /// Maximum number of cycle logs kept in history.
    pub history_capacity: usize,
    /// Push target. `None` means plain `git push`.
    pub remote: Option<String>,
    /// Extra protected paths (exact or directory prefix).
    pub protected_paths: Vec<String>,
    /// Extra protected globs.
    pub protected_globs: Vec<String>,
    /// Patches above this risk are withheld for human review.
    pub max_auto_apply_risk: RiskLevel,
    pub commit_prefix: String,
    pub event_log: bool,
    /// Seconds before a hung `git push` is abandoned.
    pub push_timeout_secs: u64,
}

impl Default for MendConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            remote: None,
            protected_paths: Vec::new(),
            protected_globs: Vec::new(),
            max_auto_apply_risk: RiskLevel::Medium,
            commit_prefix: "mend".into(),
            event_log: true,
            push_timeout_secs: 120,
        }
    }
}

impl MendConfig {
    /// Load from a config file. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: MendConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        if config.history_capacity == 0 {
            anyhow::bail!("history_capacity must be at least 1");
        }
        Ok(config)
    }
}

/// Read the raw config map. Returns an empty map if the file doesn't exist.
pub fn read_config_map(path: &Path) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    if !path.exists() {
        return Ok(serde_json::Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    let val: serde_json::Value = serde_json::from_str(&content)?;
    match val {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(serde_json::Map::new()),
    }
}

pub fn write_config_map(
    path: &Path,
    config: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&config)?;
    crate::write_atomic(path, json.as_bytes())
}

/// Parse a CLI string into a JSON value (bool/number/list/string).
/// Comma-separated values become a list for the list-typed keys.
pub fn parse_value(key: &str, s: &str) -> serde_json::Value {
    if key == "max_auto_apply_risk" {
        if let Some(level) = RiskLevel::parse(s) {
            return serde_json::Value::String(level.as_str().to_string());
        }
    }
    if matches!(key, "protected_paths" | "protected_globs") {
        return serde_json::Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| serde_json::Value::String(v.to_string()))
                .collect(),
        );
    }
    match s {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                serde_json::Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                serde_json::Value::String(s.to_string())
            }
        }
    }
}
