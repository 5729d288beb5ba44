//! Evolution cycle: findings → tasks → auto-fix patches → apply pipeline.
//!
//! Every cycle is written to history twice: once as `running` before any
//! stage executes, and again once it is `completed` or `failed`.

use crate::autofix;
use crate::catalog::{CatalogPatchGenerator, PatchGenerator};
use crate::cycle_log::{CycleLog, CycleStatus, WithheldPatch};
use crate::genesis::{KeywordTaskPlanner, TaskPlanner};
use crate::history::CycleHistory;
use crate::source::FindingsSource;
use anyhow::Context;
use mend_core::Patch;
use mend_pipeline::event_log::Event;
use mend_pipeline::{ApplyMode, ApplyPipeline};
use mend_store::{MendConfig, MendPaths};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    /// Apply and publish. Without it the batch is only previewed.
    pub authorize_apply: bool,
}

pub struct CycleRunner {
    config: MendConfig,
    history: CycleHistory,
    history_path: Option<PathBuf>,
    source: Box<dyn FindingsSource>,
    planner: Box<dyn TaskPlanner>,
    generator: Box<dyn PatchGenerator>,
    pipeline: ApplyPipeline,
}

impl CycleRunner {
    /// Runner with in-memory history only.
    pub fn new(config: MendConfig, source: Box<dyn FindingsSource>, pipeline: ApplyPipeline) -> Self {
        Self {
            history: CycleHistory::new(config.history_capacity),
            config,
            history_path: None,
            source,
            planner: Box::new(KeywordTaskPlanner),
            generator: Box::new(CatalogPatchGenerator::empty()),
            pipeline,
        }
    }

    /// Runner backed by `.mend/history.json`. Cycle events go to the
    /// pipeline's event log.
    pub fn open(
        paths: &MendPaths,
        config: MendConfig,
        source: Box<dyn FindingsSource>,
        pipeline: ApplyPipeline,
    ) -> anyhow::Result<Self> {
        let history = CycleHistory::load(&paths.history_json, config.history_capacity)?;
        Ok(Self {
            history,
            history_path: Some(paths.history_json.clone()),
            ..Self::new(config, source, pipeline)
        })
    }

    pub fn with_planner(mut self, planner: Box<dyn TaskPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn PatchGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Most recent `limit` cycles (all if `None`), newest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<CycleLog> {
        self.history.recent(limit.unwrap_or(usize::MAX))
    }

    pub fn latest(&self) -> Option<CycleLog> {
        self.history.latest()
    }

    /// Run one cycle. Stage failures end up in the returned log as `failed`;
    /// `Err` means the log could not be persisted.
    pub async fn run_cycle(&mut self, opts: CycleOptions) -> anyhow::Result<CycleLog> {
        let events = self.pipeline.events().clone();
        let mut log = CycleLog::start(opts.authorize_apply);
        info!(cycle = %log.id, authorize_apply = opts.authorize_apply, "cycle started");
        events.record(Event::CycleStarted {
            cycle_id: log.id.clone(),
            authorize_apply: opts.authorize_apply,
        });
        self.history.record(log.clone());
        self.persist()?;

        match self.execute(&mut log, opts).await {
            Ok(()) if log.status == CycleStatus::Running => log.complete(),
            Ok(()) => {}
            Err(e) => {
                warn!(cycle = %log.id, error = %format!("{e:#}"), "cycle failed");
                log.fail(format!("{e:#}"));
            }
        }

        info!(
            cycle = %log.id,
            status = log.status.as_str(),
            applied = log.summary.applied_count,
            pending = log.summary.pending_count,
            "cycle finished"
        );
        events.record(Event::CycleFinished {
            cycle_id: log.id.clone(),
            status: log.status.as_str().into(),
            applied_count: log.summary.applied_count,
            pending_count: log.summary.pending_count,
        });
        self.history.record(log.clone());
        self.persist()?;
        Ok(log)
    }

    async fn execute(&self, log: &mut CycleLog, opts: CycleOptions) -> anyhow::Result<()> {
        let report = self.source.fetch().await.context("fetching findings")?;

        log.tasks = self.planner.plan(&report);
        log.summary.total_tasks = log.tasks.len();

        let summary = autofix::summarize(autofix::identify(&log.tasks, self.generator.as_ref()));
        log.summary.auto_fixable_count = summary.auto_fixable_count;

        let max_risk = self.config.max_auto_apply_risk;
        let (allowed, held): (Vec<Patch>, Vec<Patch>) = summary
            .patches
            .iter()
            .cloned()
            .partition(|p| p.risk_level <= max_risk);
        log.withheld = held
            .iter()
            .map(|p| WithheldPatch {
                patch_id: p.id.clone(),
                file_path: p.file_path.clone(),
                risk_level: p.risk_level,
                reason: format!("risk {} exceeds auto-apply limit {max_risk}", p.risk_level),
            })
            .collect();
        let patch_count = summary.patches.len();
        log.auto_fix_summary = Some(summary);

        if allowed.is_empty() {
            log.summary.pending_count = patch_count;
            info!(cycle = %log.id, withheld = held.len(), "no patches eligible for the apply pipeline");
            return Ok(());
        }

        let mode = if opts.authorize_apply {
            ApplyMode::Apply
        } else {
            ApplyMode::DryRun
        };
        let message = commit_message(&self.config.commit_prefix, &log.id, &allowed);
        let result = self.pipeline.run(&allowed, &message, mode).await;

        let applied = if mode == ApplyMode::Apply {
            result.applied_count()
        } else {
            0
        };
        log.summary.applied_count = applied;
        log.summary.pending_count = patch_count.saturating_sub(applied);

        let failure = (!result.success).then(|| result.message.clone());
        log.apply_result = Some(result);
        if let Some(message) = failure {
            log.fail(format!("apply pipeline failed: {message}"));
        }
        Ok(())
    }

    fn persist(&self) -> anyhow::Result<()> {
        match &self.history_path {
            Some(path) => self.history.save(path),
            None => Ok(()),
        }
    }
}

fn commit_message(prefix: &str, cycle_id: &str, patches: &[Patch]) -> String {
    let mut msg = format!(
        "{prefix}: apply {} auto-fix patch(es)\n\nCycle: {cycle_id}\n",
        patches.len()
    );
    for p in patches {
        msg.push_str(&format!("- {} ({})\n", p.id, p.file_path));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PatchTemplate;
    use crate::source::StaticReportSource;
    use mend_core::report::{CommonIssue, FindingsReport, Severity};
    use mend_core::{RiskLevel, TaskCategory};
    use mend_pipeline::RecordingPublisher;
    use std::path::Path;

    const CSS: &str = "a { color: gray; }\n";

    fn report() -> FindingsReport {
        FindingsReport {
            generated_at: "2026-03-01T00:00:00Z".into(),
            common_issues: vec![
                CommonIssue {
                    keyword: "ui color".into(),
                    frequency: 3,
                    related_feedbacks: vec![],
                    severity: Severity::Medium,
                },
                CommonIssue {
                    keyword: "pricing".into(),
                    frequency: 1,
                    related_feedbacks: vec![],
                    severity: Severity::Low,
                },
            ],
            ..FindingsReport::default()
        }
    }

    fn template(key: &str, patch: &str, risk: RiskLevel) -> PatchTemplate {
        PatchTemplate {
            key: key.into(),
            category: TaskCategory::UiUx,
            keywords: vec!["color".into()],
            file_path: "styles/app.css".into(),
            patch: patch.into(),
            description: "darker text".into(),
            risk_level: risk,
            estimated_impact: "readability".into(),
        }
    }

    const GOOD: &str = "@@ -1 +1 @@\n-a { color: gray; }\n+a { color: black; }\n";

    fn runner(dir: &Path, publisher: &RecordingPublisher, templates: Vec<PatchTemplate>) -> CycleRunner {
        std::fs::create_dir_all(dir.join("styles")).unwrap();
        if !dir.join("styles/app.css").exists() {
            std::fs::write(dir.join("styles/app.css"), CSS).unwrap();
        }
        let paths = MendPaths::discover(dir);
        let pipeline = ApplyPipeline::new(dir, Box::new(publisher.clone()))
            .with_event_log(&paths.events_jsonl);
        CycleRunner::open(
            &paths,
            MendConfig::default(),
            Box::new(StaticReportSource(report())),
            pipeline,
        )
        .unwrap()
        .with_generator(Box::new(CatalogPatchGenerator::new(templates)))
    }

    fn read(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("styles/app.css")).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_cycle_only_previews() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![template("ui_color", GOOD, RiskLevel::Low)]);

        let log = r.run_cycle(CycleOptions::default()).await.unwrap();

        assert_eq!(log.status, CycleStatus::Completed, "{:?}", log.error);
        assert_eq!(log.summary.total_tasks, 2);
        assert_eq!(log.summary.auto_fixable_count, 1);
        assert_eq!(log.summary.applied_count, 0);
        assert_eq!(log.summary.pending_count, 1);
        assert!(log.apply_result.as_ref().unwrap().dry_run);
        assert_eq!(read(dir.path()), CSS);
        assert!(publisher.calls().is_empty());
    }

    #[tokio::test]
    async fn authorized_cycle_applies_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![template("ui_color", GOOD, RiskLevel::Low)]);

        let log = r
            .run_cycle(CycleOptions {
                authorize_apply: true,
            })
            .await
            .unwrap();

        assert_eq!(log.status, CycleStatus::Completed, "{:?}", log.error);
        assert_eq!(log.summary.applied_count, 1);
        assert_eq!(log.summary.pending_count, 0);
        assert_eq!(read(dir.path()), "a { color: black; }\n");
        let calls = publisher.calls();
        assert!(calls[0].starts_with("commit:mend: apply 1 auto-fix patch(es)"));
        assert!(calls[0].contains(&log.id));
        assert_eq!(calls[1], "push");
    }

    #[tokio::test]
    async fn high_risk_patches_are_withheld() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![template("risky", GOOD, RiskLevel::High)]);

        let log = r
            .run_cycle(CycleOptions {
                authorize_apply: true,
            })
            .await
            .unwrap();

        assert_eq!(log.status, CycleStatus::Completed);
        assert_eq!(log.withheld.len(), 1);
        assert_eq!(log.withheld[0].risk_level, RiskLevel::High);
        assert!(log.apply_result.is_none());
        assert_eq!(log.summary.pending_count, 1);
        assert_eq!(read(dir.path()), CSS);
    }

    #[tokio::test]
    async fn stale_patch_fails_cycle_but_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let stale = "@@ -1 +1 @@\n-a { color: red; }\n+a { color: black; }\n";
        let mut r = runner(dir.path(), &publisher, vec![template("ui_color", stale, RiskLevel::Low)]);

        let log = r
            .run_cycle(CycleOptions {
                authorize_apply: true,
            })
            .await
            .unwrap();

        assert_eq!(log.status, CycleStatus::Failed);
        assert!(log.error.as_deref().unwrap().contains("apply pipeline failed"));
        assert_eq!(log.apply_result.as_ref().unwrap().conflicts.len(), 1);
        assert_eq!(r.latest().unwrap().id, log.id);
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl FindingsSource for BrokenSource {
        async fn fetch(&self) -> anyhow::Result<FindingsReport> {
            anyhow::bail!("diagnostics offline")
        }
    }

    #[tokio::test]
    async fn source_failure_is_persisted_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MendPaths::discover(dir.path());
        let pipeline = ApplyPipeline::new(dir.path(), Box::new(RecordingPublisher::new()));
        let mut r =
            CycleRunner::open(&paths, MendConfig::default(), Box::new(BrokenSource), pipeline).unwrap();

        let log = r.run_cycle(CycleOptions::default()).await.unwrap();
        assert_eq!(log.status, CycleStatus::Failed);
        assert!(log.error.as_deref().unwrap().contains("diagnostics offline"));
        assert!(log.completed_at.is_some());

        let stored = CycleHistory::load(&paths.history_json, 10).unwrap();
        assert_eq!(stored.latest().unwrap().status, CycleStatus::Failed);
    }

    #[tokio::test]
    async fn history_is_monotonic_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![]);

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(r.run_cycle(CycleOptions::default()).await.unwrap().id);
        }
        let recent: Vec<String> = r.history(Some(2)).into_iter().map(|l| l.id).collect();
        assert_eq!(recent, vec![ids[2].clone(), ids[1].clone()]);
        assert_eq!(r.history(Some(10)).len(), 3);
        assert_eq!(r.latest().unwrap(), r.history(Some(1))[0]);

        let reopened = runner(dir.path(), &publisher, vec![]);
        assert_eq!(reopened.latest().unwrap().id, ids[2]);
        assert!(reopened.history(None).iter().all(|l| l.status != CycleStatus::Running));
    }

    #[tokio::test]
    async fn events_bracket_each_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![]);
        r.run_cycle(CycleOptions::default()).await.unwrap();

        let events =
            mend_pipeline::event_log::read_events(&MendPaths::discover(dir.path()).events_jsonl);
        assert!(matches!(events.first().map(|e| &e.event), Some(Event::CycleStarted { .. })));
        assert!(matches!(events.last().map(|e| &e.event), Some(Event::CycleFinished { .. })));
    }

    #[tokio::test]
    async fn cycle_and_pipeline_events_share_one_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = RecordingPublisher::new();
        let mut r = runner(dir.path(), &publisher, vec![template("ui_color", GOOD, RiskLevel::Low)]);
        r.run_cycle(CycleOptions {
            authorize_apply: true,
        })
        .await
        .unwrap();
        r.run_cycle(CycleOptions::default()).await.unwrap();

        let events =
            mend_pipeline::event_log::read_events(&MendPaths::discover(dir.path()).events_jsonl);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert!(seqs.len() > 6, "{seqs:?}");
        assert_eq!(seqs, (0..seqs.len() as u64).collect::<Vec<_>>());
    }
}
