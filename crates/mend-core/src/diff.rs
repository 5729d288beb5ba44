//! Strict parser for the unified-diff subset accepted by the pipeline.
//!
//! `--- path` / `+++ path` header lines are informational. Every hunk begins with
//! `@@ -old_start[,old_count] +new_start[,new_count] @@` and its body must contain
//! exactly the number of old (context + remove) and new (context + add) lines the
//! header declares. A missing count means 1. Anything before the first header or
//! hunk is treated as free-form preamble.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// A hunk that only adds lines. `old_start` then names the line the
    /// insertion follows (0 = top of file).
    pub fn is_pure_insertion(&self) -> bool {
        self.old_count == 0
    }

    /// 0-based index into the old file where this hunk begins.
    pub fn old_index(&self) -> usize {
        if self.is_pure_insertion() {
            self.old_start
        } else {
            self.old_start - 1
        }
    }

    /// 0-based index one past the last old line this hunk consumes.
    pub fn old_end(&self) -> usize {
        self.old_index() + self.old_count
    }

    /// Old-file lines (context and remove) in order, as the file must contain them.
    pub fn expected_old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| l.kind != LineKind::Add)
            .map(|l| l.text.as_str())
    }

    /// True when the hunk has neither context nor remove lines.
    pub fn touches_no_existing_lines(&self) -> bool {
        self.lines.iter().all(|l| l.kind == LineKind::Add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("no hunk header found in patch")]
    NoHunks,
    #[error("line {line}: malformed hunk header: {header}")]
    BadHeader { line: usize, header: String },
    #[error("line {line}: hunk declares no lines")]
    EmptyHunk { line: usize },
    #[error("line {line}: old start 0 is only valid for pure insertions")]
    ZeroStart { line: usize },
    #[error(
        "line {line}: hunk ended early (header declares {expected_old} old / {expected_new} new lines, body has {old} / {new})"
    )]
    Truncated {
        line: usize,
        expected_old: usize,
        expected_new: usize,
        old: usize,
        new: usize,
    },
    #[error("line {line}: hunk body is longer than its header declares")]
    Overflow { line: usize },
    #[error("line {line}: invalid hunk body line: {text:?}")]
    BadBodyLine { line: usize, text: String },
    #[error("line {line}: unexpected line outside a hunk: {text:?}")]
    Stray { line: usize, text: String },
    #[error("hunk at old line {start} overlaps or precedes the previous hunk")]
    Overlap { start: usize },
}

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

/// Lines outside a hunk that carry no content and are skipped.
const IGNORED_PREFIXES: &[&str] = &[
    "---",
    "+++",
    "diff ",
    "index ",
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "\\",
];

struct OpenHunk {
    hunk: Hunk,
    header_line: usize,
    old_seen: usize,
    new_seen: usize,
}

impl OpenHunk {
    fn is_complete(&self) -> bool {
        self.old_seen == self.hunk.old_count && self.new_seen == self.hunk.new_count
    }
}

/// Parse every hunk in `patch_text`. Hunks must be ordered by ascending,
/// non-overlapping old ranges.
pub fn parse_hunks(patch_text: &str) -> Result<Vec<Hunk>, DiffError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut open: Option<OpenHunk> = None;
    let mut in_structure = false;
    let mut just_closed = false;

    for (idx, raw) in patch_text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(cur) = open.as_mut() {
            if raw.is_empty() {
                return Err(DiffError::Truncated {
                    line: line_no,
                    expected_old: cur.hunk.old_count,
                    expected_new: cur.hunk.new_count,
                    old: cur.old_seen,
                    new: cur.new_seen,
                });
            }
            if raw.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            }
            let kind = match raw.as_bytes()[0] {
                b' ' => LineKind::Context,
                b'+' => LineKind::Add,
                b'-' => LineKind::Remove,
                _ => {
                    return Err(DiffError::BadBodyLine {
                        line: line_no,
                        text: raw.to_string(),
                    })
                }
            };
            match kind {
                LineKind::Context => {
                    cur.old_seen += 1;
                    cur.new_seen += 1;
                }
                LineKind::Remove => cur.old_seen += 1,
                LineKind::Add => cur.new_seen += 1,
            }
            if cur.old_seen > cur.hunk.old_count || cur.new_seen > cur.hunk.new_count {
                return Err(DiffError::Overflow { line: line_no });
            }
            cur.hunk.lines.push(HunkLine {
                kind,
                text: raw[1..].to_string(),
            });
            if cur.is_complete() {
                if let Some(done) = open.take() {
                    push_ordered(&mut hunks, done.hunk)?;
                }
                just_closed = true;
            }
            continue;
        }

        if raw.starts_with("@@") {
            in_structure = true;
            just_closed = false;
            let next = parse_header(raw, line_no)?;
            if next.hunk.old_count == 0 && next.hunk.new_count == 0 {
                return Err(DiffError::EmptyHunk { line: line_no });
            }
            open = Some(next);
            continue;
        }

        if raw.starts_with("---") || raw.starts_with("+++") {
            in_structure = true;
        }
        if !in_structure
            || raw.trim().is_empty()
            || IGNORED_PREFIXES.iter().any(|p| raw.starts_with(p))
        {
            if raw.trim().is_empty() {
                just_closed = false;
            }
            continue;
        }

        if just_closed && matches!(raw.as_bytes()[0], b' ' | b'+' | b'-') {
            return Err(DiffError::Overflow { line: line_no });
        }
        return Err(DiffError::Stray {
            line: line_no,
            text: raw.to_string(),
        });
    }

    if let Some(cur) = open {
        return Err(DiffError::Truncated {
            line: cur.header_line,
            expected_old: cur.hunk.old_count,
            expected_new: cur.hunk.new_count,
            old: cur.old_seen,
            new: cur.new_seen,
        });
    }
    if hunks.is_empty() {
        return Err(DiffError::NoHunks);
    }
    Ok(hunks)
}

fn parse_header(raw: &str, line_no: usize) -> Result<OpenHunk, DiffError> {
    let bad = || DiffError::BadHeader {
        line: line_no,
        header: raw.to_string(),
    };
    let caps = HEADER_RE.captures(raw).ok_or_else(bad)?;
    let num = |i: usize, default: usize| -> Result<usize, DiffError> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().map_err(|_| bad()),
            None => Ok(default),
        }
    };
    let old_start = num(1, 0)?;
    let old_count = num(2, 1)?;
    let new_start = num(3, 0)?;
    let new_count = num(4, 1)?;
    if old_start == 0 && old_count != 0 {
        return Err(DiffError::ZeroStart { line: line_no });
    }
    Ok(OpenHunk {
        hunk: Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: Vec::new(),
        },
        header_line: line_no,
        old_seen: 0,
        new_seen: 0,
    })
}

fn push_ordered(hunks: &mut Vec<Hunk>, hunk: Hunk) -> Result<(), DiffError> {
    if let Some(prev) = hunks.last() {
        if hunk.old_index() < prev.old_end() {
            return Err(DiffError::Overlap {
                start: hunk.old_start,
            });
        }
    }
    hunks.push(hunk);
    Ok(())
}

/// Paths named by `---` / `+++` header lines, with `a/` `b/` prefixes kept.
pub fn header_paths(patch_text: &str) -> Vec<&str> {
    patch_text
        .lines()
        .filter(|l| l.starts_with("---") || l.starts_with("+++"))
        .map(|l| {
            let rest = l.get(3..).unwrap_or("").trim();
            // drop a trailing tab-separated timestamp
            rest.split('\t').next().unwrap_or(rest).trim()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

/// How one line of a file ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eol {
    #[default]
    Lf,
    CrLf,
    /// Last line of a file without a trailing newline.
    Missing,
}

impl Eol {
    pub fn as_str(self) -> &'static str {
        match self {
            Eol::Lf => "\n",
            Eol::CrLf => "\r\n",
            Eol::Missing => "",
        }
    }

    pub fn is_missing(self) -> bool {
        self == Eol::Missing
    }
}

/// A file split into lines, each remembering its own line ending, so that
/// `render(parse(s)) == s` for any text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceText {
    pub lines: Vec<String>,
    /// Parallel to `lines`.
    pub endings: Vec<Eol>,
}

impl SourceText {
    pub fn parse(content: &str) -> Self {
        let mut text = Self::default();
        for chunk in content.split_inclusive('\n') {
            let (line, eol) = if let Some(l) = chunk.strip_suffix("\r\n") {
                (l, Eol::CrLf)
            } else if let Some(l) = chunk.strip_suffix('\n') {
                (l, Eol::Lf)
            } else {
                (chunk, Eol::Missing)
            };
            text.lines.push(line.to_string());
            text.endings.push(eol);
        }
        text
    }

    /// Ending of line `idx` (0-based), if that line exists.
    pub fn ending(&self, idx: usize) -> Option<Eol> {
        self.endings.get(idx).copied()
    }

    /// The first real line ending in the file, `\n` if there is none.
    pub fn default_eol(&self) -> Eol {
        self.endings
            .iter()
            .copied()
            .find(|e| !e.is_missing())
            .unwrap_or_default()
    }

    pub fn has_trailing_newline(&self) -> bool {
        self.endings.last().is_some_and(|e| !e.is_missing())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (line, eol) in self.lines.iter().zip(&self.endings) {
            out.push_str(line);
            out.push_str(eol.as_str());
        }
        out
    }
}
