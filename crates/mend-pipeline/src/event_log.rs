//! Append-only JSONL audit trail at `.mend/events.jsonl`.
//!
//! Each line is one [`FullEvent`]. Writes are best-effort: a failing disk never
//! fails a pipeline run.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A pipeline or cycle event. Serialized as tagged JSON (`"type": "batch_start"`, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BatchStart {
        patch_count: usize,
        dry_run: bool,
    },
    SafetyRejected {
        patch_id: String,
        file_path: String,
        reason: String,
    },
    DryRunFailed {
        patch_id: String,
        file_path: String,
        error: String,
    },
    BatchPreviewed {
        patch_count: usize,
    },
    PatchApplied {
        patch_id: String,
        file_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_digest: Option<String>,
    },
    ApplyFailed {
        patch_id: String,
        file_path: String,
        error: String,
    },
    RolledBack {
        files: Vec<String>,
    },
    Committed {
        commit_id: String,
        files: Vec<String>,
    },
    CommitFailed {
        error: String,
    },
    Pushed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote: Option<String>,
    },
    PushFailed {
        error: String,
    },
    CycleStarted {
        cycle_id: String,
        authorize_apply: bool,
    },
    CycleFinished {
        cycle_id: String,
        status: String,
        applied_count: usize,
        pending_count: usize,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullEvent {
    pub seq: u64,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug)]
struct LogState {
    path: PathBuf,
    seq: u64,
}

/// Append-only JSONL event writer. Clones share one sequence counter, so
/// every component writing the same log hands out unique sequence numbers.
#[derive(Debug, Clone, Default)]
pub struct EventLogger {
    state: Option<Arc<Mutex<LogState>>>,
}

impl EventLogger {
    /// Open (or start) a log. Sequence numbers continue after existing lines.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seq = fs::read_to_string(&path)
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count() as u64)
            .unwrap_or(0);
        Self {
            state: Some(Arc::new(Mutex::new(LogState { path, seq }))),
        }
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Record an event. Best-effort: write failures are logged and dropped.
    pub fn record(&self, event: Event) {
        let Some(state) = &self.state else {
            return;
        };
        let Ok(mut state) = state.lock() else {
            return;
        };
        let full = FullEvent {
            seq: state.seq,
            ts: mend_core::now_rfc3339(),
            event,
        };
        state.seq += 1;

        if let Ok(line) = serde_json::to_string(&full) {
            if let Err(e) = append_line(&state.path, &line) {
                tracing::debug!(path = %state.path.display(), error = %e, "event log write failed");
            }
        }
    }
}

/// Read every parseable event from a log. Missing file → empty.
pub fn read_events(path: &Path) -> Vec<FullEvent> {
    fs::read_to_string(path)
        .map(|s| {
            s.lines()
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
