use mend_pipeline::{ApplyPipeline, GitPublisher, SafetyChecker};
use mend_store::{MendConfig, MendPaths};
use std::path::Path;
use std::time::Duration;

/// Paths and typed config of an initialized workspace.
pub fn open(repo_root: &Path) -> anyhow::Result<(MendPaths, MendConfig)> {
    let paths = MendPaths::discover(repo_root);
    if !paths.is_initialized() {
        anyhow::bail!("No .mend/ workspace found. Run `mend init` first.");
    }
    let config = MendConfig::load(&paths.config_json)?;
    Ok((paths, config))
}

/// A git-backed pipeline for the repo, configured from `config`.
pub fn pipeline(paths: &MendPaths, config: &MendConfig) -> anyhow::Result<ApplyPipeline> {
    let safety = SafetyChecker::new(&config.protected_paths, &config.protected_globs)?;
    let publisher = GitPublisher::new(paths.root())
        .with_remote(config.remote.clone())
        .with_push_timeout(Duration::from_secs(config.push_timeout_secs));
    let mut pipeline = ApplyPipeline::new(paths.root(), Box::new(publisher)).with_safety(safety);
    if config.event_log {
        pipeline = pipeline.with_event_log(&paths.events_jsonl);
    }
    Ok(pipeline)
}
