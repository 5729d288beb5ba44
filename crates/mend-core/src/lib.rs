pub mod diff;
pub mod patch;
pub mod report;
pub mod result;
pub mod task;

pub use patch::{Patch, RiskLevel};
pub use result::{ApplyResult, CommitResult, Conflict, FailureKind, PushResult};
pub use task::{ImprovementTask, TaskCategory, TaskPriority, TaskSource};

use sha2::{Digest, Sha256};

/// Content digest recorded in apply results: `sha256:<lowercase hex>`.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Current UTC time as RFC3339.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
