use crate::workspace;
use anyhow::Context;
use clap::Subcommand;
use mend_core::Patch;
use mend_pipeline::{ApplyMode, PipelineResult};
use mend_store::RunLock;
use std::path::Path;

#[derive(Subcommand)]
pub enum PatchCmd {
    /// Dry-run a batch: safety, syntax, and conflict checks only
    Check {
        /// JSON array of patches
        file: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a batch, then commit and push
    Apply {
        /// JSON array of patches
        file: String,
        /// Commit message
        #[arg(short = 'm', long = "message")]
        message: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: PatchCmd, repo_root: &Path) -> anyhow::Result<()> {
    match cmd {
        PatchCmd::Check { file, json } => execute(repo_root, Path::new(&file), "", ApplyMode::DryRun, json),
        PatchCmd::Apply {
            file,
            message,
            json,
        } => execute(repo_root, Path::new(&file), &message, ApplyMode::Apply, json),
    }
}

fn load_patches(path: &Path) -> anyhow::Result<Vec<Patch>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading patches: {}", path.display()))?;
    Patch::list_from_json(&content).with_context(|| format!("parsing patches: {}", path.display()))
}

fn execute(
    repo_root: &Path,
    file: &Path,
    message: &str,
    mode: ApplyMode,
    json: bool,
) -> anyhow::Result<()> {
    let (paths, config) = workspace::open(repo_root)?;
    let patches = load_patches(file)?;
    let _lock = RunLock::acquire(&paths)?;
    let pipeline = workspace::pipeline(&paths, &config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(pipeline.run(&patches, message, mode));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    if !result.success {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}

pub(crate) fn print_result(result: &PipelineResult) {
    for r in &result.applied {
        let status = if r.success {
            "ok"
        } else if r.kind.is_some() {
            "FAIL"
        } else {
            "skip"
        };
        match r.kind {
            Some(kind) => println!(
                "  {status:<4} {} {}: {} [{}]",
                r.patch_id,
                r.file_path,
                r.message,
                kind.as_str()
            ),
            None => println!("  {status:<4} {} {}: {}", r.patch_id, r.file_path, r.message),
        }
        if let Some(err) = &r.error {
            println!("       {err}");
        }
    }
    if let Some(commit) = &result.commit {
        match &commit.commit_id {
            Some(id) => println!("  commit {id} ({} file(s))", commit.files.len()),
            None => println!("  commit: {}", commit.message),
        }
        if let Some(err) = &commit.error {
            println!("       {err}");
        }
    }
    if let Some(push) = &result.push {
        println!("  push: {}", push.message);
        if let Some(err) = &push.error {
            println!("       {err}");
        }
    }
    println!("{}", result.message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_patch_list() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("patches.json");
        std::fs::write(
            &file,
            r#"[{"id":"p1","task_id":"t1","file_path":"a.txt","patch":"@@ -0,0 +1 @@\n+hi\n"}]"#,
        )
        .unwrap();
        let patches = load_patches(&file).unwrap();
        assert_eq!(patches[0].id, "p1");

        std::fs::write(&file, "{not json").unwrap();
        let err = load_patches(&file).unwrap_err();
        assert!(format!("{err:#}").contains("parsing patches"));
    }

    #[test]
    fn check_previews_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        crate::cmd_init::execute(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("a.txt"), "old\n").unwrap();
        let file = tmp.path().join("patches.json");
        std::fs::write(
            &file,
            r#"[{"id":"p1","task_id":"t1","file_path":"a.txt","patch":"@@ -1 +1 @@\n-old\n+new\n"}]"#,
        )
        .unwrap();

        run(
            PatchCmd::Check {
                file: file.display().to_string(),
                json: true,
            },
            tmp.path(),
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "old\n");
    }

    #[test]
    fn failed_check_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        crate::cmd_init::execute(tmp.path()).unwrap();
        let file = tmp.path().join("patches.json");
        std::fs::write(
            &file,
            r#"[{"id":"p1","task_id":"t1","file_path":".env","patch":"@@ -0,0 +1 @@\n+X=1\n"}]"#,
        )
        .unwrap();

        let err = run(
            PatchCmd::Check {
                file: file.display().to_string(),
                json: false,
            },
            tmp.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("safety check failed"));
        assert!(!tmp.path().join(".env").exists());
    }
}
