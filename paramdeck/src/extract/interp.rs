//! Pipeline interpreter: runs an [`ExtractionRule`] against a working
//! directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::pipeline::{ExtractionRule, Operation};
use super::Outputs;
use crate::pattern::{MatchMode, Pattern, PatternError};
use crate::value::Value;

/// Value flowing between stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Lines(Vec<String>),
    Text(String),
    Number(f64),
}

impl Stage {
    pub fn shape(&self) -> &'static str {
        match self {
            Stage::Lines(_) => "lines",
            Stage::Text(_) => "text",
            Stage::Number(_) => "number",
        }
    }
}

/// Why one rule produced no value.  Never fatal to a batch.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("{op}: no input lines")]
    EmptyInput { op: &'static str },

    #[error("{op}: index {index} out of range for {len} item(s)")]
    IndexOutOfRange {
        op: &'static str,
        index: i64,
        len: usize,
    },

    #[error("substring: marker {marker:?} not found")]
    MarkerNotFound { marker: String },

    #[error("asNumeric: {text:?} is not a number")]
    NotNumeric { text: String },

    #[error("{op}: expected {expected}, got {found}")]
    ShapeMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Run one rule.  The result is `Value::Str` for a pipeline ending in text
/// and `Value::Float` for one ending in a number.
pub fn extract(rule: &ExtractionRule, workdir: impl AsRef<Path>) -> Result<Value, StageFailure> {
    let workdir = workdir.as_ref();
    let mut stage = Stage::Lines(Vec::new());
    for op in rule.pipeline() {
        stage = apply(op, stage, workdir)?;
    }
    match stage {
        Stage::Text(s) => Ok(Value::Str(s)),
        Stage::Number(x) => Ok(Value::Float(x)),
        Stage::Lines(_) => Err(StageFailure::ShapeMismatch {
            op: "result",
            expected: "text or number",
            found: "lines",
        }),
    }
}

/// Run every rule independently.  A failed rule maps to `None`; siblings
/// are unaffected.
pub fn extract_all(rules: &[ExtractionRule], workdir: impl AsRef<Path>) -> Outputs {
    let workdir = workdir.as_ref();
    rules
        .iter()
        .map(|rule| {
            let value = match extract(rule, workdir) {
                Ok(v) => Some(v),
                Err(failure) => {
                    debug!(output = rule.output(), %failure, "output absent");
                    None
                }
            };
            (rule.output().to_owned(), value)
        })
        .collect()
}

// ── Stages ────────────────────────────────────────────────────────────────────

fn apply(op: &Operation, input: Stage, workdir: &Path) -> Result<Stage, StageFailure> {
    let name = op.name();
    match op {
        Operation::Grep { pattern, files } => grep(workdir, pattern, files).map(Stage::Lines),

        Operation::Get(index) => {
            let lines = expect_lines(name, input)?;
            if lines.is_empty() {
                return Err(StageFailure::EmptyInput { op: name });
            }
            let len = lines.len();
            checked_index(*index, len)
                .and_then(|i| lines.into_iter().nth(i))
                .map(Stage::Text)
                .ok_or(StageFailure::IndexOutOfRange { op: name, index: *index, len })
        }

        Operation::Cut { delimiter, index } => {
            let text = expect_text(name, input)?;
            let len = text.split(delimiter.as_str()).count();
            checked_index(*index, len)
                .and_then(|i| text.split(delimiter.as_str()).nth(i))
                .map(|field| Stage::Text(field.to_owned()))
                .ok_or(StageFailure::IndexOutOfRange { op: name, index: *index, len })
        }

        Operation::Replace { old, new } => {
            let text = expect_text(name, input)?;
            Ok(Stage::Text(text.replace(old.as_str(), new)))
        }

        Operation::Substring { start, end } => {
            let text = expect_text(name, input)?;
            let from = text
                .find(start.as_str())
                .map(|i| i + start.len())
                .ok_or_else(|| StageFailure::MarkerNotFound { marker: start.clone() })?;
            let rest = &text[from..];
            let to = rest
                .find(end.as_str())
                .ok_or_else(|| StageFailure::MarkerNotFound { marker: end.clone() })?;
            Ok(Stage::Text(rest[..to].to_owned()))
        }

        Operation::AsNumeric => {
            let text = expect_text(name, input)?;
            parse_number(&text)
                .map(Stage::Number)
                .ok_or(StageFailure::NotNumeric { text })
        }
    }
}

fn expect_lines(op: &'static str, input: Stage) -> Result<Vec<String>, StageFailure> {
    match input {
        Stage::Lines(lines) => Ok(lines),
        other => Err(StageFailure::ShapeMismatch {
            op,
            expected: "lines",
            found: other.shape(),
        }),
    }
}

fn expect_text(op: &'static str, input: Stage) -> Result<String, StageFailure> {
    match input {
        Stage::Text(text) => Ok(text),
        other => Err(StageFailure::ShapeMismatch {
            op,
            expected: "text",
            found: other.shape(),
        }),
    }
}

fn checked_index(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < len)
}

/// Parse trimmed text as a finite float.  Fortran `D` exponents are
/// accepted (`1.0D-03`).
pub fn parse_number(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() || !t.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let x = match t.parse::<f64>() {
        Ok(x) => x,
        Err(_) => t.replacen(&['D', 'd'][..], "E", 1).parse::<f64>().ok()?,
    };
    x.is_finite().then_some(x)
}

// ── Grep ──────────────────────────────────────────────────────────────────────

/// Matching lines from every regular file in `workdir` (not recursive)
/// whose name matches `files`, in file-name then line order.  A missing
/// directory yields no lines.
fn grep(workdir: &Path, pattern: &str, files: &str) -> Result<Vec<String>, StageFailure> {
    let line_pat = Pattern::new(pattern, MatchMode::Grep)?;
    let name_pat = Pattern::new(files, MatchMode::Glob)?;

    let entries = match fs::read_dir(workdir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StageFailure::Io {
                path: workdir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let path = entry.path();
            (name_pat.matches(&name) && path.is_file()).then_some((name, path))
        })
        .collect();
    paths.sort();

    let mut out = Vec::new();
    for (_, path) in paths {
        let bytes = fs::read(&path).map_err(|source| StageFailure::Io {
            path: path.clone(),
            source,
        })?;
        // Listings are often Latin-1; keep the ASCII we match on.
        let text = String::from_utf8_lossy(&bytes);
        out.extend(
            text.lines()
                .filter(|line| line_pat.matches(line))
                .map(str::to_owned),
        );
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
