//! Structural safety gate. Runs before any file is read.

use anyhow::Context;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use mend_core::diff::header_paths;
use mend_core::Patch;

/// Paths that may never be patched, matched exactly or as a directory prefix.
const PROTECTED_PATHS: &[&str] = &[
    // workspace manifests and lockfiles
    "Cargo.toml",
    "Cargo.lock",
    "rust-toolchain",
    "rust-toolchain.toml",
    "build.rs",
    ".cargo",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.mod",
    "go.sum",
    "pyproject.toml",
    "poetry.lock",
    // environment and secrets
    ".env",
    ".env.local",
    ".env.production",
    // version control metadata
    ".git",
    ".gitignore",
    ".gitmodules",
    ".github",
    // pipeline state and the pipeline itself
    ".mend",
    "crates/mend-core",
    "crates/mend-store",
    "crates/mend-pipeline",
    "crates/mend-cycle",
    "crates/mend-cli",
];

/// Secret-bearing file patterns, anywhere in the tree.
const PROTECTED_GLOBS: &[&str] = &[
    "**/.env",
    "**/.env.*",
    "**/*.env",
    "**/*.pem",
    "**/*.key",
    "**/id_rsa*",
    "**/secrets.*",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(reason: String) -> Self {
        Self {
            safe: false,
            reason: Some(reason),
        }
    }
}

/// Pure path checker: traversal, absolute paths, protected locations.
#[derive(Debug, Clone)]
pub struct SafetyChecker {
    protected: Vec<String>,
    globs: GlobSet,
}

impl SafetyChecker {
    /// Built-in deny-list extended with `extra_paths` and `extra_globs`.
    pub fn new(extra_paths: &[String], extra_globs: &[String]) -> anyhow::Result<Self> {
        let mut protected: Vec<String> = PROTECTED_PATHS
            .iter()
            .map(|p| p.to_ascii_lowercase())
            .collect();
        for p in extra_paths {
            let norm = normalize(p).to_ascii_lowercase();
            if !norm.is_empty() {
                protected.push(norm);
            }
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in PROTECTED_GLOBS
            .iter()
            .copied()
            .chain(extra_globs.iter().map(String::as_str))
        {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid protected glob: {pattern}"))?;
            builder.add(glob);
        }
        let globs = builder.build().context("building protected glob set")?;

        Ok(Self { protected, globs })
    }

    pub fn check(&self, patch: &Patch) -> SafetyVerdict {
        let raw = patch.file_path.as_str();
        if raw.trim().is_empty() {
            return SafetyVerdict::unsafe_because("empty target path".into());
        }
        if has_traversal(raw) {
            return SafetyVerdict::unsafe_because(format!(
                "path traversal detected in target: {raw}"
            ));
        }
        if is_absolute(raw) {
            return SafetyVerdict::unsafe_because(format!(
                "absolute path not allowed: {raw}"
            ));
        }

        let norm = normalize(raw);
        if norm.is_empty() {
            return SafetyVerdict::unsafe_because(format!("target resolves to repo root: {raw}"));
        }
        let lower = norm.to_ascii_lowercase();
        for protected in &self.protected {
            if lower == *protected || lower.starts_with(&format!("{protected}/")) {
                return SafetyVerdict::unsafe_because(format!(
                    "protected path: {protected} may not be patched"
                ));
            }
        }
        if self.globs.is_match(&norm) {
            return SafetyVerdict::unsafe_because(format!(
                "protected file pattern matches {norm}"
            ));
        }

        for header in header_paths(&patch.patch_text) {
            if header == "/dev/null" {
                continue;
            }
            if has_traversal(header) {
                return SafetyVerdict::unsafe_because(format!(
                    "path traversal detected in patch header: {header}"
                ));
            }
        }

        SafetyVerdict::safe()
    }
}

impl Default for SafetyChecker {
    fn default() -> Self {
        match Self::new(&[], &[]) {
            Ok(checker) => checker,
            // built-in globs are static and known-valid
            Err(_) => Self {
                protected: PROTECTED_PATHS.iter().map(|p| p.to_ascii_lowercase()).collect(),
                globs: GlobSet::empty(),
            },
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
}

fn has_traversal(path: &str) -> bool {
    segments(path).any(|s| s == "..")
}

fn is_absolute(path: &str) -> bool {
    let b = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || path.starts_with('~')
        || (b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':')
}

/// Forward slashes, no empty or `.` segments.
pub fn normalize(path: &str) -> String {
    segments(path)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
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

    fn check(path: &str) -> SafetyVerdict {
        SafetyChecker::default().check(&patch(path, "@@ -1 +1 @@\n-a\n+b\n"))
    }

    #[test]
    fn ordinary_source_file_is_safe() {
        assert!(check("src/styles/chat.css").safe);
        assert!(check("./src/main.rs").safe);
        assert!(check("docs/..notes.md").safe);
    }

    #[test]
    fn traversal_rejected() {
        for p in ["../etc/passwd", "src/../../x", "src\\..\\x", "src/.."] {
            let v = check(p);
            assert!(!v.safe, "{p} should be unsafe");
            assert!(v.reason.unwrap().contains("traversal"));
        }
    }

    #[test]
    fn absolute_paths_rejected() {
        for p in ["/etc/hosts", "\\server\\share", "C:\\Windows\\x", "~/.ssh/config"] {
            assert!(!check(p).safe, "{p} should be unsafe");
        }
    }

    #[test]
    fn protected_exact_and_nested() {
        assert!(!check("Cargo.toml").safe);
        assert!(!check(".git/config").safe);
        assert!(!check(".github/workflows/ci.yml").safe);
        assert!(!check("crates/mend-pipeline/src/lib.rs").safe);
        assert!(!check("./CARGO.LOCK").safe);
        // a sibling with a shared prefix is not nested
        assert!(check(".github-notes.md").safe);
    }

    #[test]
    fn cycle_runner_and_cli_sources_are_protected() {
        assert!(!check("crates/mend-cycle/src/runner.rs").safe);
        assert!(!check("crates/mend-cli/src/main.rs").safe);
        assert!(!check("crates/mend-cli").safe);
        assert!(check("crates/mend-client/src/lib.rs").safe);
    }

    #[test]
    fn secret_files_rejected_anywhere() {
        assert!(!check("config/secret.env").safe);
        assert!(!check("deploy/.env.staging").safe);
        assert!(!check("certs/server.pem").safe);
    }

    #[test]
    fn header_traversal_rejected_even_with_safe_target() {
        let p = patch(
            "src/lib.rs",
            "--- a/../../outside.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-a\n+b\n",
        );
        let v = SafetyChecker::default().check(&p);
        assert!(!v.safe);
        assert!(v.reason.unwrap().contains("header"));
    }

    #[test]
    fn dev_null_header_allowed_for_new_files() {
        let p = patch("src/new.rs", "--- /dev/null\n+++ b/src/new.rs\n@@ -0,0 +1 @@\n+x\n");
        assert!(SafetyChecker::default().check(&p).safe);
    }

    #[test]
    fn extra_paths_and_globs_from_config() {
        let checker =
            SafetyChecker::new(&["./deploy/".into()], &["**/*.sql".into()]).unwrap();
        assert!(!checker.check(&patch("deploy/run.sh", "")).safe);
        assert!(!checker.check(&patch("db/migrations/001.sql", "")).safe);
        assert!(checker.check(&patch("src/db.rs", "")).safe);
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        assert!(SafetyChecker::new(&[], &["[".into()]).is_err());
    }
}
