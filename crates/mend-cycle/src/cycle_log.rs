use crate::autofix::AutoFixSummary;
use mend_core::{now_rfc3339, ImprovementTask, RiskLevel};
use mend_pipeline::PipelineResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStatus::Running => "running",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSummary {
    pub total_tasks: usize,
    pub auto_fixable_count: usize,
    /// Patches that reached the working tree.
    pub applied_count: usize,
    /// Generated patches that did not: previewed, withheld, or failed.
    pub pending_count: usize,
}

/// A patch held back for human review because of its risk level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithheldPatch {
    pub patch_id: String,
    pub file_path: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

/// The durable record of one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleLog {
    pub id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub status: CycleStatus,
    #[serde(default)]
    pub authorize_apply: bool,
    #[serde(default)]
    pub tasks: Vec<ImprovementTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix_summary: Option<AutoFixSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_result: Option<PipelineResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub withheld: Vec<WithheldPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub summary: CycleSummary,
}

impl CycleLog {
    pub fn start(authorize_apply: bool) -> Self {
        Self {
            id: format!("cycle_{}", ulid::Ulid::new().to_string().to_lowercase()),
            started_at: now_rfc3339(),
            completed_at: None,
            status: CycleStatus::Running,
            authorize_apply,
            tasks: Vec::new(),
            auto_fix_summary: None,
            apply_result: None,
            withheld: Vec::new(),
            error: None,
            summary: CycleSummary::default(),
        }
    }

    pub fn complete(&mut self) {
        self.status = CycleStatus::Completed;
        self.completed_at = Some(now_rfc3339());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = CycleStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now_rfc3339());
    }

    pub fn is_finished(&self) -> bool {
        self.status != CycleStatus::Running
    }
}
