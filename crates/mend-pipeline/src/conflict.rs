//! Stale-patch detection: compare each hunk's expected old lines with the
//! live file.

use mend_core::diff::{parse_hunks, Hunk, SourceText};
use mend_core::Patch;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub reason: Option<String>,
}

impl ConflictCheck {
    fn clean() -> Self {
        Self {
            has_conflict: false,
            reason: None,
        }
    }

    fn conflict(reason: String) -> Self {
        Self {
            has_conflict: true,
            reason: Some(reason),
        }
    }
}

/// Resolve a repo-relative target under `root`.
///
/// If the target (or its nearest existing ancestor) resolves through a symlink
/// to somewhere outside `root`, the target is refused.
pub fn resolve_target(root: &Path, rel: &str) -> Result<PathBuf, String> {
    let joined = root.join(crate::safety::normalize(rel));
    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve repo root {}: {e}", root.display()))?;
    let mut cursor = joined.as_path();
    loop {
        if cursor.exists() {
            let resolved = cursor
                .canonicalize()
                .map_err(|e| format!("cannot resolve {}: {e}", cursor.display()))?;
            if !resolved.starts_with(&canonical_root) {
                return Err(format!("{rel} resolves outside the repository"));
            }
            break;
        }
        match cursor.parent() {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    Ok(joined)
}

/// Read the current content of a target. `Ok(None)` when it doesn't exist.
pub fn load_current(path: &Path) -> Result<Option<SourceText>, String> {
    if path.is_dir() {
        return Err(format!("{} is a directory", path.display()));
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(SourceText::parse(&content))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            Err(format!("{} is not valid UTF-8 text", path.display()))
        }
        Err(e) => Err(format!("reading {}: {e}", path.display())),
    }
}

/// First mismatch between `hunks` and `current`, if any. `current = None`
/// means the file does not exist yet.
pub fn find_conflict(hunks: &[Hunk], current: Option<&SourceText>) -> Option<String> {
    let Some(src) = current else {
        return hunks
            .iter()
            .find(|h| !(h.old_start == 0 && h.touches_no_existing_lines()))
            .map(|h| {
                format!(
                    "file does not exist but hunk at old line {} expects existing content",
                    h.old_start
                )
            });
    };

    let len = src.lines.len();
    for hunk in hunks {
        if hunk.is_pure_insertion() {
            if hunk.old_start > len {
                return Some(format!(
                    "insertion point {} is out of bounds (file has {len} lines)",
                    hunk.old_start
                ));
            }
            continue;
        }
        if hunk.old_start > len {
            return Some(format!(
                "hunk start {} is out of bounds (file has {len} lines)",
                hunk.old_start
            ));
        }
        for (offset, expected) in hunk.expected_old_lines().enumerate() {
            let at = hunk.old_index() + offset;
            match src.lines.get(at) {
                None => {
                    return Some(format!(
                        "hunk at line {} runs past end of file (file has {len} lines)",
                        hunk.old_start
                    ))
                }
                Some(actual) if actual != expected => {
                    return Some(format!(
                        "context mismatch at line {}: expected {expected:?}, found {actual:?}",
                        at + 1
                    ))
                }
                Some(_) => {}
            }
        }
    }
    None
}

/// Check a patch against the file under `root` it targets.
pub fn detect_conflicts(patch: &Patch, root: &Path) -> ConflictCheck {
    let hunks = match parse_hunks(&patch.patch_text) {
        Ok(h) => h,
        Err(e) => return ConflictCheck::conflict(format!("unparseable patch: {e}")),
    };
    let path = match resolve_target(root, &patch.file_path) {
        Ok(p) => p,
        Err(e) => return ConflictCheck::conflict(e),
    };
    let current = match load_current(&path) {
        Ok(c) => c,
        Err(e) => return ConflictCheck::conflict(e),
    };
    match find_conflict(&hunks, current.as_ref()) {
        Some(reason) => ConflictCheck::conflict(reason),
        None => ConflictCheck::clean(),
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

    const FILE: &str = "one\ntwo\nthree\nfour\n";

    #[test]
    fn matching_context_has_no_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -2,2 +2,2 @@\n two\n-three\n+THREE\n");
        assert_eq!(detect_conflicts(&p, dir.path()), ConflictCheck::clean());
    }

    #[test]
    fn stale_context_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -2,2 +2,2 @@\n deux\n-three\n+THREE\n");
        let c = detect_conflicts(&p, dir.path());
        assert!(c.has_conflict);
        assert!(c.reason.unwrap().contains("line 2"));
    }

    #[test]
    fn stale_remove_line_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -3 +3 @@\n-tres\n+THREE\n");
        assert!(detect_conflicts(&p, dir.path()).has_conflict);
    }

    #[test]
    fn out_of_bounds_start_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -9,1 +9,1 @@\n-x\n+y\n");
        let c = detect_conflicts(&p, dir.path());
        assert!(c.reason.unwrap().contains("out of bounds"));
    }

    #[test]
    fn hunk_running_past_eof_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -4,2 +4,2 @@\n four\n-five\n+5\n");
        assert!(detect_conflicts(&p, dir.path()).has_conflict);
    }

    #[test]
    fn append_after_last_line_is_in_bounds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -4,0 +5,1 @@\n+five\n");
        assert!(!detect_conflicts(&p, dir.path()).has_conflict);
    }

    #[test]
    fn missing_file_accepts_only_pure_insertion_at_top() {
        let dir = tempfile::tempdir().unwrap();
        let create = patch("new/f.txt", "@@ -0,0 +1,2 @@\n+a\n+b\n");
        assert!(!detect_conflicts(&create, dir.path()).has_conflict);

        let edit = patch("new/f.txt", "@@ -1 +1 @@\n-a\n+b\n");
        let c = detect_conflicts(&edit, dir.path());
        assert!(c.reason.unwrap().contains("does not exist"));
    }

    #[test]
    fn directory_target_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let p = patch("sub", "@@ -0,0 +1 @@\n+a\n");
        assert!(detect_conflicts(&p, dir.path()).has_conflict);
    }

    #[test]
    fn detection_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), FILE).unwrap();
        let p = patch("f.txt", "@@ -1 +1 @@\n-uno\n+ONE\n");
        assert_eq!(
            detect_conflicts(&p, dir.path()),
            detect_conflicts(&p, dir.path())
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_refused() {
        let outside = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), repo.path().join("link")).unwrap();
        assert!(resolve_target(repo.path(), "link/f.txt").is_err());
        assert!(resolve_target(repo.path(), "src/f.txt").is_ok());
    }
}
