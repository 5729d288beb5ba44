//! Dry-run engine. Reads the target for comparison, never writes.

use crate::apply::reconstruct;
use crate::conflict::{find_conflict, load_current, resolve_target};
use mend_core::diff::parse_hunks;
use mend_core::{Conflict, FailureKind, Patch};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunVerdict {
    pub valid: bool,
    pub error: Option<String>,
    pub kind: Option<FailureKind>,
    pub conflicts: Vec<Conflict>,
}

impl DryRunVerdict {
    fn valid() -> Self {
        Self {
            valid: true,
            error: None,
            kind: None,
            conflicts: Vec::new(),
        }
    }

    fn invalid(kind: FailureKind, error: String) -> Self {
        Self {
            valid: false,
            error: Some(error),
            kind: Some(kind),
            conflicts: Vec::new(),
        }
    }

    fn conflict(patch: &Patch, reason: String) -> Self {
        Self {
            valid: false,
            error: Some(format!("conflict: {reason}")),
            kind: Some(FailureKind::ConflictDetected),
            conflicts: vec![Conflict {
                file_path: patch.file_path.clone(),
                reason,
            }],
        }
    }
}

/// Would `patch` apply cleanly to the tree under `root` right now?
pub fn dry_run(patch: &Patch, root: &Path) -> DryRunVerdict {
    let hunks = match parse_hunks(&patch.patch_text) {
        Ok(h) => h,
        Err(e) => return DryRunVerdict::invalid(FailureKind::ValidationFailure, e.to_string()),
    };
    let path = match resolve_target(root, &patch.file_path) {
        Ok(p) => p,
        Err(e) => return DryRunVerdict::invalid(FailureKind::SafetyViolation, e),
    };
    let current = match load_current(&path) {
        Ok(c) => c,
        Err(e) => return DryRunVerdict::invalid(FailureKind::ApplyFailure, e),
    };
    if let Some(reason) = find_conflict(&hunks, current.as_ref()) {
        return DryRunVerdict::conflict(patch, reason);
    }
    let base = current.unwrap_or_default();
    match reconstruct(&base, &hunks) {
        Ok(_) => DryRunVerdict::valid(),
        Err(e) => DryRunVerdict::conflict(patch, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_core::RiskLevel;

    fn patch(path: &str, text: &str) -> Patch {
        Patch {
            id: "p".into(),
            task_id: "t".into(),
            file_path: path.into(),
            patch_text: text.into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            estimated_impact: String::new(),
        }
    }

    #[test]
    fn clean_patch_is_valid_and_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.css");
        std::fs::write(&file, "body {\n  color: red;\n}\n").unwrap();
        let p = patch("a.css", "@@ -1,3 +1,3 @@\n body {\n-  color: red;\n+  color: blue;\n }\n");
        let v = dry_run(&p, dir.path());
        assert!(v.valid, "{:?}", v.error);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "body {\n  color: red;\n}\n"
        );
    }

    #[test]
    fn no_hunks_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let v = dry_run(&patch("a.txt", "--- a/a.txt\n+++ b/a.txt\n"), dir.path());
        assert!(!v.valid);
        assert_eq!(v.kind, Some(FailureKind::ValidationFailure));
        assert!(v.conflicts.is_empty());
    }

    #[test]
    fn stale_context_populates_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\n").unwrap();
        let p = patch("a.txt", "@@ -1,2 +1,2 @@\n ALPHA\n-beta\n+gamma\n");
        let v = dry_run(&p, dir.path());
        assert!(!v.valid);
        assert_eq!(v.kind, Some(FailureKind::ConflictDetected));
        assert_eq!(v.conflicts.len(), 1);
        assert_eq!(v.conflicts[0].file_path, "a.txt");
    }

    #[test]
    fn new_file_creation_is_valid_and_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let p = patch("docs/new.md", "--- /dev/null\n+++ b/docs/new.md\n@@ -0,0 +1,1 @@\n+hello\n");
        assert!(dry_run(&p, dir.path()).valid);
        assert!(!dir.path().join("docs").exists());
    }

    #[test]
    fn dry_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        for text in ["@@ -1 +1 @@\n-x\n+y\n", "@@ -1 +1 @@\n-q\n+y\n", "garbage"] {
            let p = patch("a.txt", text);
            assert_eq!(dry_run(&p, dir.path()), dry_run(&p, dir.path()));
        }
    }
}
