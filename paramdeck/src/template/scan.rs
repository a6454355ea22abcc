//! Marker scanner.
//!
//! Splits template text into variable and formula occurrences.  The scan is
//! line oriented: comment lines are skipped whole, and a marker must close
//! on the line it opens.
//!
//! | Marker                   | Result                                  |
//! |--------------------------|-----------------------------------------|
//! | `${x}`                   | `x`, unconstrained                      |
//! | `${x~4.49988E-02}`       | `x`, default literal                    |
//! | `${x~[8.0,9.0]}`         | `x`, range, policy default              |
//! | `${x~[8.0,9.0,8.5]}`     | `x`, range with explicit default        |
//! | `${x~{300,600,900}}`     | `x`, discrete set                       |
//! | `@{2*x}`                 | formula `2*x`                           |
//! | `@{2*${x~[8.0,9.0]}}`    | formula plus a nested variable          |

use tracing::trace;

use super::domain::DomainSpec;
use super::TemplateError;
use crate::syntax::Syntax;
use crate::value::Value;

// ── Public types ──────────────────────────────────────────────────────────────

/// Byte range `[start, end)` in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `true` if `other` lies entirely within `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn shift(self, by: usize) -> Span {
        Span {
            start: self.start + by,
            end: self.end + by,
        }
    }
}

/// One textual variable marker.  `span` covers prefix through closing
/// delimiter.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableOccurrence {
    pub name: String,
    pub span: Span,
    pub domain: DomainSpec,
    /// 1-based line number.
    pub line: usize,
    /// 1-based character column of the prefix.
    pub column: usize,
}

/// One formula marker.  `body` is the span of the text between the
/// delimiters; `expression` is that text trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOccurrence {
    pub expression: String,
    pub span: Span,
    pub body: Span,
    pub line: usize,
    pub column: usize,
}

/// Everything one scan found, in text order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub variables: Vec<VariableOccurrence>,
    pub formulas: Vec<FormulaOccurrence>,
}

// ── Scanning ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Variable,
    Formula,
}

/// A marker located on one line; spans are line-relative.
#[derive(Debug, Clone, Copy)]
struct RawMarker {
    kind: MarkerKind,
    span: Span,
    body: Span,
}

/// Scan `text` for markers.
pub fn scan(text: &str, syntax: &Syntax) -> Result<ScanResult, TemplateError> {
    let mut result = ScanResult::default();
    let mut offset = 0;
    for (idx, raw_line) in text.split_inclusive('\n').enumerate() {
        let line = raw_line.trim_end_matches(&['\n', '\r'][..]);
        if !syntax.is_comment_line(line) {
            scan_line(line, offset, idx + 1, syntax, &mut result)?;
        }
        offset += raw_line.len();
    }
    Ok(result)
}

fn scan_line(
    line: &str,
    offset: usize,
    line_no: usize,
    syntax: &Syntax,
    out: &mut ScanResult,
) -> Result<(), TemplateError> {
    let malformed = |at: usize, reason: String| TemplateError::MalformedMarker {
        line: line_no,
        column: column_of(line, at),
        reason,
    };

    let mut cursor = 0;
    // End of the formula body the cursor is currently inside, if any.
    let mut in_formula: Option<usize> = None;

    while let Some((marker, next)) =
        next_marker(line, cursor, syntax).map_err(|(at, reason)| malformed(at, reason))?
    {
        if in_formula.is_some_and(|end| marker.span.start >= end) {
            in_formula = None;
        }
        let body = &line[marker.body.start..marker.body.end];

        match marker.kind {
            MarkerKind::Variable => {
                let (name, domain) = parse_variable_body(body, syntax)
                    .map_err(|reason| malformed(marker.span.start, reason))?;
                trace!(line = line_no, name = %name, ?domain, "variable marker");
                out.variables.push(VariableOccurrence {
                    name,
                    span: marker.span.shift(offset),
                    domain,
                    line: line_no,
                    column: column_of(line, marker.span.start),
                });
            }
            MarkerKind::Formula => {
                if in_formula.is_some() {
                    return Err(malformed(
                        marker.span.start,
                        "formula nested inside another formula".into(),
                    ));
                }
                let expression = body.trim();
                if expression.is_empty() {
                    return Err(malformed(marker.span.start, "empty formula".into()));
                }
                trace!(line = line_no, expression, "formula marker");
                out.formulas.push(FormulaOccurrence {
                    expression: expression.to_owned(),
                    span: marker.span.shift(offset),
                    body: marker.body.shift(offset),
                    line: line_no,
                    column: column_of(line, marker.span.start),
                });
                in_formula = Some(marker.body.end);
            }
        }
        cursor = next;
    }
    Ok(())
}

/// Find the first marker at or after `cursor`.
///
/// Returns the marker and the cursor to resume from: past a variable, or
/// at the start of a formula body so nested variables are found too.
/// On error returns the byte position of the offending prefix and a reason.
fn next_marker(
    line: &str,
    cursor: usize,
    syntax: &Syntax,
) -> Result<Option<(RawMarker, usize)>, (usize, String)> {
    let open = syntax.delim_open();
    let close = syntax.delim_close();

    let mut chars = line[cursor..].char_indices().peekable();
    while let Some((rel, ch)) = chars.next() {
        let kind = if ch == syntax.variable_prefix() {
            MarkerKind::Variable
        } else if ch == syntax.formula_prefix() {
            MarkerKind::Formula
        } else {
            continue;
        };
        if chars.peek().map(|&(_, c)| c) != Some(open) {
            continue;
        }

        let start = cursor + rel;
        let body_start = start + ch.len_utf8() + open.len_utf8();
        let body_end = find_close(line, body_start, open, close)
            .ok_or_else(|| (start, format!("unterminated marker: missing '{close}'")))?;
        let marker = RawMarker {
            kind,
            span: Span {
                start,
                end: body_end + close.len_utf8(),
            },
            body: Span {
                start: body_start,
                end: body_end,
            },
        };
        let next = match kind {
            MarkerKind::Variable => marker.span.end,
            MarkerKind::Formula => body_start,
        };
        return Ok(Some((marker, next)));
    }
    Ok(None)
}

/// Byte position of the delimiter closing a body that starts at `from`,
/// balancing nested delimiter pairs.
fn find_close(line: &str, from: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (rel, c) in line[from..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            if depth == 0 {
                return Some(from + rel);
            }
            depth -= 1;
        }
    }
    None
}

fn column_of(line: &str, byte: usize) -> usize {
    line[..byte].chars().count() + 1
}

// ── Marker bodies ─────────────────────────────────────────────────────────────

/// Split `name~domain` and parse the domain.
fn parse_variable_body(body: &str, syntax: &Syntax) -> Result<(String, DomainSpec), String> {
    let (name, domain) = match body.split_once('~') {
        Some((n, d)) => (n.trim(), Some(d.trim())),
        None => (body.trim(), None),
    };
    if name.is_empty() {
        return Err("empty variable name".into());
    }
    let Some(domain) = domain else {
        return Ok((name.to_owned(), DomainSpec::Unconstrained));
    };
    if domain.is_empty() {
        return Err(format!("empty domain after '~' for '{name}'"));
    }
    for prefix in [syntax.variable_prefix(), syntax.formula_prefix()] {
        let nested: String = [prefix, syntax.delim_open()].iter().collect();
        if domain.contains(&nested) {
            return Err(format!("marker nested inside the declaration of '{name}'"));
        }
    }

    let spec = if let Some(inner) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        parse_range(inner).map_err(|e| format!("bad range for '{name}': {e}"))?
    } else if let Some(inner) = domain.strip_prefix('{').and_then(|d| d.strip_suffix('}')) {
        parse_set(inner).map_err(|e| format!("bad set for '{name}': {e}"))?
    } else {
        DomainSpec::Default(domain.to_owned())
    };
    Ok((name.to_owned(), spec))
}

fn parse_range(inner: &str) -> Result<DomainSpec, String> {
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(format!("expected [min,max] or [min,max,default], got [{inner}]"));
    }
    let nums = parts
        .iter()
        .map(|p| {
            Value::parse_literal(p)
                .to_numeric()
                .and_then(|v| v.as_number())
                .ok_or_else(|| format!("'{p}' is not a number"))
        })
        .collect::<Result<Vec<f64>, String>>()?;

    let (min, max) = (nums[0], nums[1]);
    if min > max {
        return Err(format!("min {min} is greater than max {max}"));
    }
    let default = nums.get(2).copied();
    if let Some(d) = default {
        if d < min || d > max {
            return Err(format!("default {d} lies outside [{min}, {max}]"));
        }
    }
    Ok(DomainSpec::Range { min, max, default })
}

fn parse_set(inner: &str) -> Result<DomainSpec, String> {
    let items: Vec<String> = inner.split(',').map(|s| s.trim().to_owned()).collect();
    if items.iter().any(String::is_empty) {
        return Err("empty element".into());
    }
    Ok(DomainSpec::Set(items))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
