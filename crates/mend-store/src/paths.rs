use std::path::{Path, PathBuf};

/// Well-known paths under `.mend/`.
#[derive(Debug, Clone)]
pub struct MendPaths {
    pub root: PathBuf,
    pub mend_dir: PathBuf,
    pub config_json: PathBuf,
    pub history_json: PathBuf,
    pub events_jsonl: PathBuf,
    pub lock_file: PathBuf,
}

impl MendPaths {
    /// Derive all paths from a repo root. Pure computation, no I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let mend_dir = root.join(".mend");
        Self {
            config_json: mend_dir.join("config.json"),
            history_json: mend_dir.join("history.json"),
            events_jsonl: mend_dir.join("events.jsonl"),
            lock_file: mend_dir.join("LOCK"),
            mend_dir,
            root,
        }
    }

    /// Create `.mend/`. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.mend_dir)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.mend_dir.is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_is_pure() {
        let p = MendPaths::discover("/does/not/exist");
        assert!(p.history_json.ends_with(".mend/history.json"));
        assert!(p.lock_file.ends_with(".mend/LOCK"));
        assert!(!p.is_initialized());
    }

    #[test]
    fn ensure_layout_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let p = MendPaths::discover(tmp.path());
        p.ensure_layout().unwrap();
        p.ensure_layout().unwrap();
        assert!(p.is_initialized());
    }
}
