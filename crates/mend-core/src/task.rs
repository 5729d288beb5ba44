use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskCategory {
    UiUx,
    Reasoning,
    Voice,
    Device,
    Security,
    Other,
}

impl TaskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::UiUx => "ui-ux",
            TaskCategory::Reasoning => "reasoning",
            TaskCategory::Voice => "voice",
            TaskCategory::Device => "device",
            TaskCategory::Security => "security",
            TaskCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSource {
    /// `feedback`, `log`, or `issue`.
    #[serde(rename = "type")]
    pub source_type: String,
    pub reference: String,
}

/// An improvement task derived from diagnostic findings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImprovementTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub source: TaskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    pub created_at: String,
}

impl ImprovementTask {
    /// Lowercased title and description, for keyword rules.
    pub fn search_text(&self) -> (String, String) {
        (self.title.to_lowercase(), self.description.to_lowercase())
    }
}
