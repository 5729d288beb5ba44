//! Batch orchestration: safety → dry-run → apply → commit → push.

use crate::apply::Overlay;
use crate::event_log::{Event, EventLogger};
use crate::publish::Publisher;
use crate::safety::{normalize, SafetyChecker};
use crate::validate::dry_run;
use anyhow::bail;
use mend_core::{ApplyResult, CommitResult, Conflict, FailureKind, Patch, PushResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

// ── Stages ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    CheckingSafety,
    CheckingConflicts,
    Applying,
    Committing,
    Pushing,
    Done,
    Aborted,
}

const VALID_TRANSITIONS: &[(PipelineStage, &[PipelineStage])] = &[
    (
        PipelineStage::CheckingSafety,
        &[PipelineStage::CheckingConflicts, PipelineStage::Aborted],
    ),
    (
        PipelineStage::CheckingConflicts,
        &[
            PipelineStage::Applying,
            PipelineStage::Done, // dry run
            PipelineStage::Aborted,
        ],
    ),
    (
        PipelineStage::Applying,
        &[PipelineStage::Committing, PipelineStage::Aborted],
    ),
    (
        PipelineStage::Committing,
        &[PipelineStage::Pushing, PipelineStage::Done],
    ),
    (PipelineStage::Pushing, &[PipelineStage::Done]),
    // Done and Aborted are terminal
];

fn is_valid_transition(from: PipelineStage, to: PipelineStage) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

struct StageTrail {
    stages: Vec<PipelineStage>,
}

impl StageTrail {
    fn start() -> Self {
        Self {
            stages: vec![PipelineStage::CheckingSafety],
        }
    }

    fn current(&self) -> PipelineStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(PipelineStage::CheckingSafety)
    }

    fn transition(&mut self, to: PipelineStage) -> anyhow::Result<()> {
        let from = self.current();
        if !is_valid_transition(from, to) {
            bail!("invalid pipeline transition: {from:?} -> {to:?}");
        }
        debug!(?from, ?to, "pipeline stage");
        self.stages.push(to);
        Ok(())
    }
}

// ── Result ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Validate only, touch nothing.
    DryRun,
    Apply,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineResult {
    /// One entry per input patch, in input order.
    pub applied: Vec<ApplyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushResult>,
    pub success: bool,
    pub message: String,
    pub dry_run: bool,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    pub stages: Vec<PipelineStage>,
}

impl PipelineResult {
    /// Patches that reached disk (or would, for a dry run).
    pub fn applied_count(&self) -> usize {
        self.applied.iter().filter(|r| r.success).count()
    }

    pub fn final_stage(&self) -> Option<PipelineStage> {
        self.stages.last().copied()
    }
}

// ── Pipeline ──

/// Runs one batch of patches against a working tree it owns for the duration.
pub struct ApplyPipeline {
    root: PathBuf,
    safety: SafetyChecker,
    publisher: Box<dyn Publisher>,
    events: EventLogger,
}

impl ApplyPipeline {
    pub fn new(root: impl Into<PathBuf>, publisher: Box<dyn Publisher>) -> Self {
        Self {
            root: root.into(),
            safety: SafetyChecker::default(),
            publisher,
            events: EventLogger::disabled(),
        }
    }

    pub fn with_safety(mut self, safety: SafetyChecker) -> Self {
        self.safety = safety;
        self
    }

    /// Append events for each run to this JSONL file.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.events = EventLogger::open(path);
        self
    }

    /// The logger this pipeline writes to, for callers that log around a run.
    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    /// Run one batch. Every failure is reported in the result, never as `Err`.
    pub async fn run(&self, patches: &[Patch], commit_message: &str, mode: ApplyMode) -> PipelineResult {
        let log = &self.events;
        let dry = mode == ApplyMode::DryRun;
        log.record(Event::BatchStart {
            patch_count: patches.len(),
            dry_run: dry,
        });

        let mut trail = StageTrail::start();
        match self
            .run_stages(patches, commit_message, mode, &mut trail, log)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "pipeline aborted on internal error");
                let mut stages = trail.stages;
                stages.push(PipelineStage::Aborted);
                PipelineResult {
                    applied: patches
                        .iter()
                        .map(|p| ApplyResult::not_applied(p, "pipeline aborted"))
                        .collect(),
                    commit: None,
                    push: None,
                    success: false,
                    message: format!("internal error: {e:#}"),
                    dry_run: dry,
                    conflicts: Vec::new(),
                    stages,
                }
            }
        }
    }

    async fn run_stages(
        &self,
        patches: &[Patch],
        commit_message: &str,
        mode: ApplyMode,
        trail: &mut StageTrail,
        log: &EventLogger,
    ) -> anyhow::Result<PipelineResult> {
        let dry = mode == ApplyMode::DryRun;
        let aborted = |trail: &mut StageTrail,
                       applied: Vec<ApplyResult>,
                       conflicts: Vec<Conflict>,
                       message: String|
         -> anyhow::Result<PipelineResult> {
            trail.transition(PipelineStage::Aborted)?;
            warn!(%message, "batch aborted");
            Ok(PipelineResult {
                applied,
                commit: None,
                push: None,
                success: false,
                message,
                dry_run: dry,
                conflicts,
                stages: trail.stages.clone(),
            })
        };

        if patches.is_empty() {
            return aborted(trail, Vec::new(), Vec::new(), "empty batch: nothing to apply".into());
        }

        // 1. safety, over the whole batch
        let verdicts: Vec<_> = patches.iter().map(|p| self.safety.check(p)).collect();
        let unsafe_count = verdicts.iter().filter(|v| !v.safe).count();
        if unsafe_count > 0 {
            let applied = patches
                .iter()
                .zip(&verdicts)
                .map(|(patch, verdict)| match &verdict.reason {
                    Some(reason) if !verdict.safe => {
                        log.record(Event::SafetyRejected {
                            patch_id: patch.id.clone(),
                            file_path: patch.file_path.clone(),
                            reason: reason.clone(),
                        });
                        ApplyResult::failed(
                            patch,
                            FailureKind::SafetyViolation,
                            "unsafe patch rejected",
                            reason.clone(),
                        )
                    }
                    _ => ApplyResult::not_applied(
                        patch,
                        "batch aborted: another patch failed the safety check",
                    ),
                })
                .collect();
            return aborted(
                trail,
                applied,
                Vec::new(),
                format!("safety check failed for {unsafe_count} patch(es); no files touched"),
            );
        }

        // 2. dry run, staged in memory so patches to the same file stack
        trail.transition(PipelineStage::CheckingConflicts)?;
        let mut overlay = Overlay::new(&self.root);
        let mut staged: Vec<Option<ApplyResult>> = Vec::with_capacity(patches.len());
        let mut failures: Vec<Option<ApplyResult>> = Vec::with_capacity(patches.len());
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut touched: HashSet<String> = HashSet::new();
        let mut poisoned: HashSet<String> = HashSet::new();

        for patch in patches {
            let key = normalize(&patch.file_path);
            if poisoned.contains(&key) {
                staged.push(None);
                failures.push(None);
                continue;
            }
            let first_touch = touched.insert(key.clone());
            if first_touch {
                let verdict = dry_run(patch, &self.root);
                if !verdict.valid {
                    let error = verdict.error.unwrap_or_default();
                    log.record(Event::DryRunFailed {
                        patch_id: patch.id.clone(),
                        file_path: patch.file_path.clone(),
                        error: error.clone(),
                    });
                    conflicts.extend(verdict.conflicts);
                    failures.push(Some(ApplyResult::failed(
                        patch,
                        verdict.kind.unwrap_or(FailureKind::ValidationFailure),
                        "dry run failed",
                        error,
                    )));
                    staged.push(None);
                    poisoned.insert(key);
                    continue;
                }
            }
            let result = overlay.stage(patch);
            if result.success {
                failures.push(None);
                staged.push(Some(result));
            } else {
                let error = result.error.clone().unwrap_or_default();
                log.record(Event::DryRunFailed {
                    patch_id: patch.id.clone(),
                    file_path: patch.file_path.clone(),
                    error: error.clone(),
                });
                if result.kind == Some(FailureKind::ConflictDetected) {
                    conflicts.push(Conflict {
                        file_path: patch.file_path.clone(),
                        reason: error,
                    });
                }
                failures.push(Some(result));
                staged.push(None);
                poisoned.insert(key);
            }
        }

        let failed_count = failures.iter().filter(|f| f.is_some()).count();
        if failed_count > 0 {
            let applied = patches
                .iter()
                .zip(failures)
                .map(|(patch, failure)| {
                    failure.unwrap_or_else(|| {
                        ApplyResult::not_applied(
                            patch,
                            "batch aborted: another patch failed dry run",
                        )
                    })
                })
                .collect();
            return aborted(
                trail,
                applied,
                conflicts,
                format!("dry run failed for {failed_count} patch(es); no files touched"),
            );
        }
        let staged: Vec<ApplyResult> = staged.into_iter().flatten().collect();

        if dry {
            trail.transition(PipelineStage::Done)?;
            log.record(Event::BatchPreviewed {
                patch_count: patches.len(),
            });
            info!(patches = patches.len(), "dry run passed");
            return Ok(PipelineResult {
                applied: staged
                    .into_iter()
                    .map(|mut r| {
                        r.message = "would apply cleanly".into();
                        r
                    })
                    .collect(),
                commit: None,
                push: None,
                success: true,
                message: format!("dry run: {} patch(es) would apply cleanly", patches.len()),
                dry_run: true,
                conflicts: Vec::new(),
                stages: trail.stages.clone(),
            });
        }

        // 3. write the overlay
        trail.transition(PipelineStage::Applying)?;
        if let Err(failure) = overlay.write() {
            log.record(Event::ApplyFailed {
                patch_id: patches
                    .iter()
                    .find(|p| p.file_path == failure.file_path)
                    .map(|p| p.id.clone())
                    .unwrap_or_default(),
                file_path: failure.file_path.clone(),
                error: failure.error.clone(),
            });
            log.record(Event::RolledBack {
                files: failure.rolled_back.clone(),
            });
            let applied = patches
                .iter()
                .map(|patch| {
                    if patch.file_path == failure.file_path {
                        ApplyResult::failed(
                            patch,
                            FailureKind::ApplyFailure,
                            "write failed",
                            failure.error.clone(),
                        )
                    } else {
                        ApplyResult::not_applied(
                            patch,
                            format!("rolled back after write failure on {}", failure.file_path),
                        )
                    }
                })
                .collect();
            let mut message = format!(
                "write failed for {}; {} file(s) rolled back",
                failure.file_path,
                failure.rolled_back.len()
            );
            if !failure.rollback_errors.is_empty() {
                message.push_str(&format!(
                    "; rollback errors: {}",
                    failure.rollback_errors.join(", ")
                ));
            }
            return aborted(trail, applied, Vec::new(), message);
        }
        for r in &staged {
            log.record(Event::PatchApplied {
                patch_id: r.patch_id.clone(),
                file_path: r.file_path.clone(),
                after_digest: r.after_digest.clone(),
            });
        }
        info!(patches = staged.len(), "batch applied");

        // 4. commit
        trail.transition(PipelineStage::Committing)?;
        let commit = self.publisher.commit(commit_message).await;
        if !commit.success {
            let error = commit.error.clone().unwrap_or_else(|| commit.message.clone());
            log.record(Event::CommitFailed {
                error: error.clone(),
            });
            trail.transition(PipelineStage::Done)?;
            warn!(%error, "commit failed; push skipped");
            return Ok(PipelineResult {
                applied: staged,
                commit: Some(commit),
                push: None,
                success: false,
                message: format!("applied {} patch(es); commit failed: {error}", patches.len()),
                dry_run: false,
                conflicts: Vec::new(),
                stages: trail.stages.clone(),
            });
        }
        log.record(Event::Committed {
            commit_id: commit.commit_id.clone().unwrap_or_default(),
            files: commit.files.clone(),
        });

        // 5. push
        trail.transition(PipelineStage::Pushing)?;
        let push = self.publisher.push().await;
        trail.transition(PipelineStage::Done)?;
        let message = if push.success {
            log.record(Event::Pushed {
                remote: push.remote.clone(),
            });
            format!("applied, committed and pushed {} patch(es)", patches.len())
        } else {
            let error = push.error.clone().unwrap_or_else(|| push.message.clone());
            log.record(Event::PushFailed {
                error: error.clone(),
            });
            warn!(%error, "push failed; commit kept");
            format!("applied and committed {} patch(es); push failed: {error}", patches.len())
        };

        Ok(PipelineResult {
            applied: staged,
            success: push.success,
            commit: Some(commit),
            push: Some(push),
            message,
            dry_run: false,
            conflicts: Vec::new(),
            stages: trail.stages.clone(),
        })
    }
}
