use crate::patch::Patch;
use serde::{Deserialize, Serialize};

/// Why a patch or publish step did not succeed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unsafe target path. Never retried automatically.
    SafetyViolation,
    /// Malformed patch text.
    ValidationFailure,
    /// Patch is stale relative to the live file; regenerate and resubmit.
    ConflictDetected,
    /// I/O or reconstruction error while mutating a file.
    ApplyFailure,
    /// Commit or push failed; application is preserved.
    PublishFailure,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::SafetyViolation => "safety_violation",
            FailureKind::ValidationFailure => "validation_failure",
            FailureKind::ConflictDetected => "conflict_detected",
            FailureKind::ApplyFailure => "apply_failure",
            FailureKind::PublishFailure => "publish_failure",
        }
    }
}

/// Per-patch outcome, one per input patch in the order processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResult {
    pub success: bool,
    pub patch_id: String,
    pub file_path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Digest of the file before this patch (absent for new files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_digest: Option<String>,
}

impl ApplyResult {
    pub fn ok(patch: &Patch, message: impl Into<String>) -> Self {
        Self {
            success: true,
            patch_id: patch.id.clone(),
            file_path: patch.file_path.clone(),
            message: message.into(),
            error: None,
            kind: None,
            before_digest: None,
            after_digest: None,
        }
    }

    pub fn failed(
        patch: &Patch,
        kind: FailureKind,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            patch_id: patch.id.clone(),
            file_path: patch.file_path.clone(),
            message: message.into(),
            error: Some(error.into()),
            kind: Some(kind),
            before_digest: None,
            after_digest: None,
        }
    }

    /// A patch skipped because another patch in its batch failed.
    pub fn not_applied(patch: &Patch, message: impl Into<String>) -> Self {
        Self {
            success: false,
            patch_id: patch.id.clone(),
            file_path: patch.file_path.clone(),
            message: message.into(),
            error: None,
            kind: None,
            before_digest: None,
            after_digest: None,
        }
    }

    pub fn with_digests(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before_digest = before;
        self.after_digest = after;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    /// Paths recorded in the commit.
    #[serde(default)]
    pub files: Vec<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `publish_failure` whenever `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl CommitResult {
    pub fn ok(commit_id: String, files: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            commit_id: Some(commit_id),
            files,
            message: message.into(),
            error: None,
            kind: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            commit_id: None,
            files: Vec::new(),
            message: message.into(),
            error: Some(error.into()),
            kind: Some(FailureKind::PublishFailure),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl PushResult {
    pub fn ok(remote: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            remote,
            message: message.into(),
            error: None,
            kind: None,
        }
    }

    pub fn failed(
        remote: Option<String>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            remote,
            message: message.into(),
            error: Some(error.into()),
            kind: Some(FailureKind::PublishFailure),
        }
    }
}

/// A hunk whose expected lines no longer match the live file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub file_path: String,
    pub reason: String,
}
