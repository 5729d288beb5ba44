use crate::workspace;
use clap::Subcommand;
use mend_cycle::{
    CatalogPatchGenerator, CycleHistory, CycleLog, CycleOptions, CycleRunner, CycleStatus,
    JsonReportSource,
};
use mend_store::RunLock;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum CycleCmd {
    /// Run one evolution cycle from a findings report
    Run {
        /// Findings report (JSON)
        #[arg(long)]
        report: PathBuf,
        /// Patch template catalog (JSON or YAML)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Apply, commit, and push. Without this the batch is only previewed.
        #[arg(long)]
        apply: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recorded cycles, newest first
    History {
        /// Maximum number of cycles to show (default: all)
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent cycle
    Latest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one cycle by id
    Show {
        /// Cycle id (cycle_...)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: CycleCmd, repo_root: &Path) -> anyhow::Result<()> {
    match cmd {
        CycleCmd::Run {
            report,
            catalog,
            apply,
            json,
        } => execute(repo_root, report, catalog.as_deref(), apply, json),
        CycleCmd::History { limit, json } => history(repo_root, limit, json),
        CycleCmd::Latest { json } => latest(repo_root, json),
        CycleCmd::Show { id, json } => show(repo_root, &id, json),
    }
}

/// `mend cycle run`
fn execute(
    repo_root: &Path,
    report: PathBuf,
    catalog: Option<&Path>,
    apply: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (paths, config) = workspace::open(repo_root)?;
    let generator = match catalog {
        Some(path) => CatalogPatchGenerator::load(path)?,
        None => CatalogPatchGenerator::empty(),
    };
    let _lock = RunLock::acquire(&paths)?;
    let pipeline = workspace::pipeline(&paths, &config)?;

    let mut runner = CycleRunner::open(&paths, config, Box::new(JsonReportSource::new(report)), pipeline)?
        .with_generator(Box::new(generator));
    let rt = tokio::runtime::Runtime::new()?;
    let log = rt.block_on(runner.run_cycle(CycleOptions {
        authorize_apply: apply,
    }))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        print_log(&log);
        if let Some(result) = &log.apply_result {
            crate::cmd_patch::print_result(result);
        }
    }
    if log.status == CycleStatus::Failed {
        anyhow::bail!(
            "cycle {} failed: {}",
            log.id,
            log.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn load_history(repo_root: &Path) -> anyhow::Result<CycleHistory> {
    let (paths, config) = workspace::open(repo_root)?;
    CycleHistory::load(&paths.history_json, config.history_capacity)
}

/// `mend cycle history`
fn history(repo_root: &Path, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let logs = load_history(repo_root)?.recent(limit.unwrap_or(usize::MAX));
    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }
    if logs.is_empty() {
        println!("(no cycles recorded)");
    }
    for log in &logs {
        println!(
            "{}  {:<9}  {}  tasks={} applied={} pending={}",
            log.id,
            log.status.as_str(),
            log.started_at,
            log.summary.total_tasks,
            log.summary.applied_count,
            log.summary.pending_count,
        );
    }
    Ok(())
}

/// `mend cycle latest`
fn latest(repo_root: &Path, json: bool) -> anyhow::Result<()> {
    let latest = load_history(repo_root)?.latest();
    match (latest, json) {
        (Some(log), true) => println!("{}", serde_json::to_string_pretty(&log)?),
        (None, true) => println!("null"),
        (Some(log), false) => print_log(&log),
        (None, false) => println!("(no cycles recorded)"),
    }
    Ok(())
}

/// `mend cycle show <id>`
fn show(repo_root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let history = load_history(repo_root)?;
    let Some(log) = history.get(id) else {
        anyhow::bail!("no cycle with id {id} in history");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(log)?);
    } else {
        print_log(log);
        if let Some(result) = &log.apply_result {
            crate::cmd_patch::print_result(result);
        }
    }
    Ok(())
}

fn print_log(log: &CycleLog) {
    println!("Cycle {} [{}]", log.id, log.status.as_str());
    println!("  started:   {}", log.started_at);
    if let Some(done) = &log.completed_at {
        println!("  completed: {done}");
    } else if !log.is_finished() {
        println!("  (never finished: still running or interrupted)");
    }
    println!(
        "  tasks: {} (auto-fixable {}), applied: {}, pending: {}",
        log.summary.total_tasks,
        log.summary.auto_fixable_count,
        log.summary.applied_count,
        log.summary.pending_count,
    );
    for w in &log.withheld {
        println!("  withheld {} {}: {}", w.patch_id, w.file_path, w.reason);
    }
    if let Some(err) = &log.error {
        println!("  error: {err}");
    }
}
