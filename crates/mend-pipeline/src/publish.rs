//! Version-control publishing: one commit for the whole batch, then push.

use async_trait::async_trait;
use mend_core::{CommitResult, PushResult};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::process::Command;

/// Commit and push for the working tree the pipeline owns.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stage the whole working tree and record one commit.
    async fn commit(&self, message: &str) -> CommitResult;
    /// Publish the current branch.
    async fn push(&self) -> PushResult;
}

/// [`Publisher`] that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo: PathBuf,
    remote: Option<String>,
    git_bin: String,
    push_timeout: Duration,
}

impl GitPublisher {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: None,
            git_bin: "git".into(),
            push_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_remote(mut self, remote: Option<String>) -> Self {
        self.remote = remote.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_git_bin(mut self, bin: impl Into<String>) -> Self {
        self.git_bin = bin.into();
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.git_bin);
        cmd.args(args)
            .current_dir(&self.repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        cmd
    }

    /// Run git, returning trimmed stdout or a masked error.
    async fn git(&self, args: &[&str]) -> Result<String, String> {
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| format!("git not available: {e}"))?;
        check_output(args, output)
    }
}

fn check_output(args: &[&str], output: std::process::Output) -> Result<String, String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    Err(mask_secrets(&format!(
        "git {} failed: {detail}",
        args.first().copied().unwrap_or_default()
    )))
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn commit(&self, message: &str) -> CommitResult {
        if message.trim().is_empty() {
            return CommitResult::failed("commit skipped", "empty commit message");
        }
        if let Err(e) = self.git(&["add", "-A", "--", ".", ":(exclude).mend"]).await {
            return CommitResult::failed("staging failed", e);
        }
        let files: Vec<String> = match self.git(&["diff", "--cached", "--name-only"]).await {
            Ok(out) => out.lines().map(str::to_string).collect(),
            Err(e) => return CommitResult::failed("staging failed", e),
        };
        if files.is_empty() {
            return CommitResult::failed("nothing to commit", "no changes in working tree");
        }
        if let Err(e) = self
            .git(&["-c", "commit.gpgsign=false", "commit", "-q", "-m", message])
            .await
        {
            return CommitResult::failed("commit failed", e);
        }
        let commit_id = match self.git(&["rev-parse", "HEAD"]).await {
            Ok(id) => id,
            Err(e) => return CommitResult::failed("commit created but id unreadable", e),
        };
        tracing::info!(commit = %commit_id, files = files.len(), "committed");
        let message = format!("committed {} file(s)", files.len());
        CommitResult::ok(commit_id, files, message)
    }

    async fn push(&self) -> PushResult {
        let mut args = vec!["push"];
        if let Some(remote) = &self.remote {
            args.push(remote.as_str());
            args.push("HEAD");
        }
        let target = self.remote.clone();
        let run = self.command(&args).output();
        let output = match tokio::time::timeout(self.push_timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return PushResult::failed(target, "push failed", format!("git not available: {e}"))
            }
            Err(_) => {
                return PushResult::failed(
                    target,
                    "push failed",
                    format!("git push timed out after {:?}", self.push_timeout),
                )
            }
        };
        match check_output(&args, output) {
            Ok(_) => {
                let dest = target.as_deref().unwrap_or("upstream");
                tracing::info!(remote = dest, "pushed");
                PushResult::ok(target.clone(), format!("pushed to {dest}"))
            }
            Err(e) => PushResult::failed(target, "push failed", e),
        }
    }
}

/// Secret patterns masked in git output, compiled once.
static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // credentials embedded in remote URLs
        (
            Regex::new(r"(?i)([a-z][a-z0-9+.\-]*://)[^/\s@]+@").unwrap(),
            "$1[MASKED]@",
        ),
        // API keys
        (Regex::new(r"sk-[a-zA-Z0-9]{20,}").unwrap(), "[MASKED]"),
        (Regex::new(r"pk-[a-zA-Z0-9]{20,}").unwrap(), "[MASKED]"),
        (Regex::new(r"gh[pousr]_[a-zA-Z0-9]{20,}").unwrap(), "[MASKED]"),
        // Bearer tokens
        (
            Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]+").unwrap(),
            "Bearer [MASKED]",
        ),
        // key=value patterns
        (
            Regex::new(r"(?i)(password|secret|token|key|api_key|apikey)=[^\s&]+").unwrap(),
            "$1=[MASKED]",
        ),
    ]
});

/// Mask secrets in git output before it is stored.
pub fn mask_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in SECRET_PATTERNS.iter() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// In-memory [`Publisher`] that records calls. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    calls: Arc<Mutex<Vec<String>>>,
    fail_commit: bool,
    fail_push: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::default()
        }
    }

    pub fn failing_push() -> Self {
        Self {
            fail_push: true,
            ..Self::default()
        }
    }

    /// `commit:<message>` and `push` entries, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn note(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn commit(&self, message: &str) -> CommitResult {
        self.note(format!("commit:{message}"));
        if self.fail_commit {
            return CommitResult::failed("commit failed", "simulated commit failure");
        }
        CommitResult::ok("0".repeat(40), Vec::new(), "recorded")
    }

    async fn push(&self) -> PushResult {
        self.note("push".into());
        if self.fail_push {
            return PushResult::failed(None, "push failed", "simulated push failure");
        }
        PushResult::ok(None, "recorded")
    }
}
