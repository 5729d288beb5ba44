use serde::{Deserialize, Serialize};
use std::fmt;

/// How much review a patch deserves before it is applied unattended.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed change to one file, produced upstream and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patch {
    pub id: String,
    pub task_id: String,
    /// Repo-relative target path.
    pub file_path: String,
    /// Unified-diff text.
    #[serde(alias = "patch")]
    pub patch_text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub estimated_impact: String,
}

impl Patch {
    /// Load a JSON array of patches.
    pub fn list_from_json(json: &str) -> serde_json::Result<Vec<Patch>> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::parse("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("urgent"), None);
    }

    #[test]
    fn patch_accepts_short_field_name() {
        let json = r#"[{"id":"p1","task_id":"t1","file_path":"src/a.rs","patch":"@@ -1 +1 @@\n-a\n+b\n","risk_level":"medium"}]"#;
        let patches = Patch::list_from_json(json).unwrap();
        assert_eq!(patches[0].risk_level, RiskLevel::Medium);
        assert!(patches[0].patch_text.starts_with("@@"));
        assert!(patches[0].description.is_empty());
    }
}
