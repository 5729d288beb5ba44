//! Patch application.
//!
//! A batch is applied in two phases. [`Overlay::stage`] reconstructs each
//! patched file in memory, on top of whatever earlier patches in the batch
//! already staged for it. [`Overlay::write`] then replaces the files on disk
//! one by one; if any write fails, the files already written are put back to
//! their pre-run bytes (or removed if the run created them).

use crate::conflict::{find_conflict, load_current, resolve_target};
use mend_core::diff::{parse_hunks, Eol, Hunk, LineKind, SourceText};
use mend_core::{content_digest, ApplyResult, FailureKind, Patch};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Build the post-patch text by walking `src` and each hunk in lockstep.
///
/// Every context and remove line is verified against `src`; any mismatch is
/// an error, never a best-effort skip. Untouched lines keep their own line
/// endings. An added line takes the ending of the line it replaces, else of
/// its neighbours.
pub fn reconstruct(src: &SourceText, hunks: &[Hunk]) -> Result<SourceText, String> {
    let fill = src.default_eol();
    let mut out = SourceText {
        lines: Vec::with_capacity(src.lines.len()),
        endings: Vec::with_capacity(src.lines.len()),
    };
    let copy = |out: &mut SourceText, from: usize, to: usize| {
        out.lines.extend_from_slice(&src.lines[from..to]);
        out.endings.extend_from_slice(&src.endings[from..to]);
    };
    let mut cursor = 0usize;

    for hunk in hunks {
        let start = hunk.old_index();
        if start < cursor {
            return Err(format!("hunk at old line {} overlaps the previous hunk", hunk.old_start));
        }
        if start > src.lines.len() {
            return Err(format!(
                "hunk at old line {} starts past end of file ({} lines)",
                hunk.old_start,
                src.lines.len()
            ));
        }
        copy(&mut out, cursor, start);
        cursor = start;
        let mut removed: Option<Eol> = None;

        for line in &hunk.lines {
            match line.kind {
                LineKind::Add => {
                    let real = |e: &Eol| !e.is_missing();
                    let eol = removed
                        .filter(real)
                        .or_else(|| src.ending(cursor).filter(real))
                        .or_else(|| out.endings.last().copied().filter(real))
                        .unwrap_or(fill);
                    out.lines.push(line.text.clone());
                    out.endings.push(eol);
                }
                LineKind::Context | LineKind::Remove => {
                    match src.lines.get(cursor) {
                        Some(actual) if *actual == line.text => {}
                        Some(actual) => {
                            return Err(format!(
                                "line {}: expected {:?}, found {actual:?}",
                                cursor + 1,
                                line.text
                            ))
                        }
                        None => {
                            return Err(format!(
                                "line {}: expected {:?}, found end of file",
                                cursor + 1,
                                line.text
                            ))
                        }
                    }
                    if line.kind == LineKind::Context {
                        out.lines.push(line.text.clone());
                        out.endings.push(src.endings[cursor]);
                        removed = None;
                    } else {
                        removed = Some(src.endings[cursor]);
                    }
                    cursor += 1;
                }
            }
        }
    }
    copy(&mut out, cursor, src.lines.len());

    // only the last line may lack an ending, and only if the file already did
    let last = out.endings.len().saturating_sub(1);
    for (i, eol) in out.endings.iter_mut().enumerate() {
        if i < last && eol.is_missing() {
            *eol = fill;
        }
    }
    if let Some(eol) = out.endings.last_mut() {
        *eol = if src.lines.is_empty() || src.has_trailing_newline() {
            if eol.is_missing() {
                fill
            } else {
                *eol
            }
        } else {
            Eol::Missing
        };
    }
    Ok(out)
}

#[derive(Debug)]
struct StagedFile {
    rel: String,
    path: PathBuf,
    /// On-disk bytes before the run; `None` if the file did not exist.
    original: Option<Vec<u8>>,
    content: SourceText,
}

/// A write that could not complete, and what rolling back the batch hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub file_path: String,
    pub error: String,
    /// Files restored to their pre-run state.
    pub rolled_back: Vec<String>,
    pub rollback_errors: Vec<String>,
}

/// In-memory staging area for one batch.
#[derive(Debug)]
pub struct Overlay {
    root: PathBuf,
    staged: Vec<StagedFile>,
}

impl Overlay {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: Vec::new(),
        }
    }

    /// Reconstruct `patch` on top of the overlay. Nothing is written.
    pub fn stage(&mut self, patch: &Patch) -> ApplyResult {
        let hunks = match parse_hunks(&patch.patch_text) {
            Ok(h) => h,
            Err(e) => {
                return ApplyResult::failed(
                    patch,
                    FailureKind::ValidationFailure,
                    "patch could not be parsed",
                    e.to_string(),
                )
            }
        };
        let path = match resolve_target(&self.root, &patch.file_path) {
            Ok(p) => p,
            Err(e) => {
                return ApplyResult::failed(patch, FailureKind::SafetyViolation, "unsafe target", e)
            }
        };

        let existing = self.staged.iter().position(|f| f.path == path);
        let (base, original) = match existing {
            Some(i) => (Some(self.staged[i].content.clone()), None),
            None => match read_original(&path) {
                Ok(pair) => pair,
                Err(e) => {
                    return ApplyResult::failed(
                        patch,
                        FailureKind::ApplyFailure,
                        "could not read target",
                        e,
                    )
                }
            },
        };

        if let Some(reason) = find_conflict(&hunks, base.as_ref()) {
            return ApplyResult::failed(
                patch,
                FailureKind::ConflictDetected,
                "patch does not match current file",
                reason,
            );
        }
        let before = base.as_ref().map(|b| content_digest(b.render().as_bytes()));
        let next = match reconstruct(&base.unwrap_or_default(), &hunks) {
            Ok(n) => n,
            Err(e) => {
                return ApplyResult::failed(
                    patch,
                    FailureKind::ApplyFailure,
                    "reconstruction failed",
                    e,
                )
            }
        };
        let after = Some(content_digest(next.render().as_bytes()));

        match existing {
            Some(i) => self.staged[i].content = next,
            None => self.staged.push(StagedFile {
                rel: patch.file_path.clone(),
                path,
                original,
                content: next,
            }),
        }

        ApplyResult::ok(
            patch,
            format!("applied {} hunk(s) to {}", hunks.len(), patch.file_path),
        )
        .with_digests(before, after)
    }

    /// Write every staged file. On failure, restore what was already written.
    pub fn write(self) -> Result<Vec<String>, WriteFailure> {
        let mut written: Vec<(&StagedFile, Vec<PathBuf>)> = Vec::new();
        for file in &self.staged {
            let created_dirs = missing_ancestors(&file.path, &self.root);
            let data = file.content.render();
            if let Err(e) = mend_store::write_atomic(&file.path, data.as_bytes()) {
                remove_empty_dirs(&created_dirs);
                let mut rolled_back = Vec::new();
                let mut rollback_errors = Vec::new();
                for (done, dirs) in written.iter().rev() {
                    match restore(done) {
                        Ok(()) => rolled_back.push(done.rel.clone()),
                        Err(err) => rollback_errors.push(format!("{}: {err}", done.rel)),
                    }
                    remove_empty_dirs(dirs);
                }
                return Err(WriteFailure {
                    file_path: file.rel.clone(),
                    error: format!("{e:#}"),
                    rolled_back,
                    rollback_errors,
                });
            }
            written.push((file, created_dirs));
        }
        Ok(self.staged.iter().map(|f| f.rel.clone()).collect())
    }
}

/// Apply one patch directly to the tree under `root`.
pub fn apply(patch: &Patch, root: &Path) -> ApplyResult {
    let mut overlay = Overlay::new(root);
    let result = overlay.stage(patch);
    if !result.success {
        return result;
    }
    match overlay.write() {
        Ok(_) => result,
        Err(f) => ApplyResult::failed(patch, FailureKind::ApplyFailure, "write failed", f.error),
    }
}

fn read_original(path: &Path) -> Result<(Option<SourceText>, Option<Vec<u8>>), String> {
    let text = load_current(path)?;
    let bytes = match std::fs::read(path) {
        Ok(b) => Some(b),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(format!("reading {}: {e}", path.display())),
    };
    Ok((text, bytes))
}

fn restore(file: &StagedFile) -> Result<(), String> {
    match &file.original {
        Some(bytes) => mend_store::write_atomic(&file.path, bytes).map_err(|e| format!("{e:#}")),
        None => match std::fs::remove_file(&file.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.to_string()),
        },
    }
}

/// Ancestors of `path` below `root` that don't exist yet, deepest first.
fn missing_ancestors(path: &Path, root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut cur = path.parent();
    while let Some(dir) = cur {
        if dir == root || dir.exists() || !dir.starts_with(root) {
            break;
        }
        dirs.push(dir.to_path_buf());
        cur = dir.parent();
    }
    dirs
}

fn remove_empty_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        // only succeeds on empty directories
        let _ = std::fs::remove_dir(dir);
    }
}
