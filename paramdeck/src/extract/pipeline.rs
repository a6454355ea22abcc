//! Extraction rules: the operator set and the pipeline text grammar.
//!
//! A pipeline is written as operator calls joined by a chain token:
//!
//! ```text
//! grep("ESTI. + FAIBLE SIGMA", "*.listing") | get(0) | substring("SIGMA", "+/-") | asNumeric()
//! ```
//!
//! Arguments are quoted strings (`"..."` or `'...'`, with `\` escapes) or
//! integers.  Operator names are case-insensitive and ignore `_`.

use std::fmt;

use thiserror::Error;

use crate::pattern::check_glob;

/// Default token between pipeline stages.
pub const DEFAULT_CHAIN: &str = "|";

/// Error from parsing or validating a pipeline.  `position` is a byte offset
/// into the pipeline text (0 for rules built from an operator list).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at offset {position}: {message}")]
pub struct PipelineError {
    pub position: usize,
    pub message: String,
}

impl PipelineError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        PipelineError {
            position,
            message: message.into(),
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// One pipeline stage.  Indices are 0-based; a negative index is accepted
/// here and fails when the stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Lines matching `pattern` from every workdir file whose name matches
    /// the glob `files`.
    Grep { pattern: String, files: String },
    /// Select one line.
    Get(i64),
    /// Split on `delimiter` and keep one field.
    Cut { delimiter: String, index: i64 },
    /// Literal replace-all.
    Replace { old: String, new: String },
    /// Text strictly between the first `start` and the next `end`.
    Substring { start: String, end: String },
    AsNumeric,
}

impl Operation {
    /// Canonical operator name, as written in pipeline text.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Grep { .. } => "grep",
            Operation::Get(_) => "get",
            Operation::Cut { .. } => "cut",
            Operation::Replace { .. } => "replace",
            Operation::Substring { .. } => "substring",
            Operation::AsNumeric => "asNumeric",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Grep { pattern, files } => write!(f, "grep({pattern:?}, {files:?})"),
            Operation::Get(i) => write!(f, "get({i})"),
            Operation::Cut { delimiter, index } => write!(f, "cut({delimiter:?}, {index})"),
            Operation::Replace { old, new } => write!(f, "replace({old:?}, {new:?})"),
            Operation::Substring { start, end } => write!(f, "substring({start:?}, {end:?})"),
            Operation::AsNumeric => f.write_str("asNumeric()"),
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

/// A named output and the pipeline that produces it.
///
/// Construction guarantees the pipeline is non-empty and starts with its
/// only `grep`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    output: String,
    pipeline: Vec<Operation>,
}

impl ExtractionRule {
    /// Build a rule from an operator list.
    pub fn new(output: impl Into<String>, pipeline: Vec<Operation>) -> Result<Self, PipelineError> {
        validate(&pipeline, &[])?;
        Ok(ExtractionRule {
            output: output.into(),
            pipeline,
        })
    }

    /// Parse pipeline text whose stages are joined by `chain`.
    pub fn parse(
        output: impl Into<String>,
        text: &str,
        chain: &str,
    ) -> Result<Self, PipelineError> {
        let (pipeline, starts) = Parser::new(text, chain)?.parse_pipeline()?;
        validate(&pipeline, &starts)?;
        Ok(ExtractionRule {
            output: output.into(),
            pipeline,
        })
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn pipeline(&self) -> &[Operation] {
        &self.pipeline
    }
}

impl fmt::Display for ExtractionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.pipeline.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

/// Structural checks shared by both constructors.  `starts` holds the text
/// offset of each stage when known.
fn validate(pipeline: &[Operation], starts: &[usize]) -> Result<(), PipelineError> {
    let at = |i: usize| starts.get(i).copied().unwrap_or(0);
    let Some(first) = pipeline.first() else {
        return Err(PipelineError::new(0, "empty pipeline"));
    };
    if !matches!(first, Operation::Grep { .. }) {
        return Err(PipelineError::new(
            at(0),
            format!("pipeline must start with grep, not {}", first.name()),
        ));
    }
    for (i, op) in pipeline.iter().enumerate() {
        match op {
            Operation::Grep { files, .. } => {
                if i > 0 {
                    return Err(PipelineError::new(at(i), "grep may only be the first stage"));
                }
                check_glob(files)
                    .map_err(|e| PipelineError::new(at(i), format!("file glob: {e}")))?;
            }
            Operation::Cut { delimiter, .. } if delimiter.is_empty() => {
                return Err(PipelineError::new(at(i), "cut delimiter is empty"));
            }
            Operation::Replace { old, .. } if old.is_empty() => {
                return Err(PipelineError::new(at(i), "replace pattern is empty"));
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Parser ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    Int(i64),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    chain: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, chain: &'a str) -> Result<Self, PipelineError> {
        if chain.trim().is_empty() {
            return Err(PipelineError::new(0, "empty chain token"));
        }
        Ok(Parser { src, pos: 0, chain })
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn err(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::new(self.pos, message)
    }

    fn expect(&mut self, c: char) -> Result<(), PipelineError> {
        self.skip_ws();
        match self.peek() {
            Some(got) if got == c => {
                self.bump();
                Ok(())
            }
            Some(got) => Err(self.err(format!("expected '{c}', found '{got}'"))),
            None => Err(self.err(format!("expected '{c}', found end of pipeline"))),
        }
    }

    fn parse_pipeline(mut self) -> Result<(Vec<Operation>, Vec<usize>), PipelineError> {
        let mut ops = Vec::new();
        let mut starts = Vec::new();
        loop {
            self.skip_ws();
            starts.push(self.pos);
            ops.push(self.parse_stage()?);
            self.skip_ws();
            if self.peek().is_none() {
                break;
            }
            if !self.rest().starts_with(self.chain) {
                return Err(self.err(format!("expected '{}' between stages", self.chain)));
            }
            self.pos += self.chain.len();
        }
        Ok((ops, starts))
    }

    fn parse_stage(&mut self) -> Result<Operation, PipelineError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        if name.is_empty() {
            return Err(self.err("expected an operator name"));
        }
        self.expect('(')?;
        let args = self.parse_args()?;
        build_operation(name, args).map_err(|message| PipelineError::new(start, message))
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, PipelineError> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }
        loop {
            self.skip_ws();
            args.push(self.parse_arg()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.err(format!("expected ',' or ')', found '{c}'")));
                }
                None => return Err(self.err("unterminated argument list")),
            }
        }
    }

    fn parse_arg(&mut self) -> Result<Arg, PipelineError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.parse_quoted(q).map(Arg::Str)
            }
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => {
                let start = self.pos;
                self.bump();
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
                self.src[start..self.pos]
                    .parse::<i64>()
                    .map(Arg::Int)
                    .map_err(|_| PipelineError::new(start, "bad integer argument"))
            }
            Some(c) => Err(self.err(format!("unexpected '{c}' in argument"))),
            None => Err(self.err("missing argument")),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, PipelineError> {
        let open = self.pos - quote.len_utf8();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(PipelineError::new(open, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(PipelineError::new(open, "unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }
}

fn build_operation(name: &str, args: Vec<Arg>) -> Result<Operation, String> {
    let key: String = name
        .chars()
        .filter(|&c| c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let arity = match key.as_str() {
        "asnumeric" => 0,
        "get" => 1,
        "grep" | "cut" | "replace" | "substring" => 2,
        _ => return Err(format!("unknown operator '{name}'")),
    };
    if args.len() != arity {
        return Err(format!("{name}() takes {arity} argument(s), got {}", args.len()));
    }

    let mut args = args.into_iter();
    let args = &mut args;
    Ok(match key.as_str() {
        "grep" => Operation::Grep {
            pattern: take_str(args, name, "pattern")?,
            files: take_str(args, name, "file glob")?,
        },
        "replace" => Operation::Replace {
            old: take_str(args, name, "old text")?,
            new: take_str(args, name, "new text")?,
        },
        "substring" => Operation::Substring {
            start: take_str(args, name, "start marker")?,
            end: take_str(args, name, "end marker")?,
        },
        "cut" => Operation::Cut {
            delimiter: take_str(args, name, "delimiter")?,
            index: take_int(args, name)?,
        },
        "get" => Operation::Get(take_int(args, name)?),
        _ => Operation::AsNumeric,
    })
}

fn take_str(args: &mut impl Iterator<Item = Arg>, op: &str, what: &str) -> Result<String, String> {
    match args.next() {
        Some(Arg::Str(s)) => Ok(s),
        _ => Err(format!("{op}(): {what} must be a string")),
    }
}

fn take_int(args: &mut impl Iterator<Item = Arg>, op: &str) -> Result<i64, String> {
    match args.next() {
        Some(Arg::Int(i)) => Ok(i),
        _ => Err(format!("{op}(): index must be an integer")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MEAN_KEFF: &str = r#"grep("ESTI. + FAIBLE SIGMA", "*.listing") | get(0) | substring("SIGMA", "+/-") | asNumeric()"#;

    fn grep(pattern: &str, files: &str) -> Operation {
        Operation::Grep {
            pattern: pattern.into(),
            files: files.into(),
        }
    }

    #[test]
    fn parses_keff_pipeline() {
        let rule = ExtractionRule::parse("mean_keff", MEAN_KEFF, DEFAULT_CHAIN).unwrap();
        assert_eq!(rule.output(), "mean_keff");
        assert_eq!(
            rule.pipeline(),
            &[
                grep("ESTI. + FAIBLE SIGMA", "*.listing"),
                Operation::Get(0),
                Operation::Substring {
                    start: "SIGMA".into(),
                    end: "+/-".into()
                },
                Operation::AsNumeric,
            ]
        );
    }

    #[test]
    fn display_parses_back() {
        let rule = ExtractionRule::parse("k", MEAN_KEFF, DEFAULT_CHAIN).unwrap();
        let again = ExtractionRule::parse("k", &rule.to_string(), DEFAULT_CHAIN).unwrap();
        assert_eq!(rule, again);
    }

    #[test]
    fn operator_names_are_normalized() {
        let rule = ExtractionRule::parse(
            "x",
            "GREP('a', '*') | Get(-1) | CUT(':', 2) | Replace('D', 'E') | as_numeric()",
            "|",
        )
        .unwrap();
        assert_eq!(rule.pipeline()[1], Operation::Get(-1));
        assert_eq!(
            rule.pipeline()[2],
            Operation::Cut {
                delimiter: ":".into(),
                index: 2
            }
        );
        assert_eq!(rule.pipeline()[4], Operation::AsNumeric);
    }

    #[test]
    fn chain_token_inside_strings_is_literal() {
        let rule = ExtractionRule::parse("x", r#"grep("a|b", "*") >> cut("|", 1)"#, ">>").unwrap();
        assert_eq!(rule.pipeline()[0], grep("a|b", "*"));
        assert_eq!(rule.pipeline().len(), 2);
    }

    #[test]
    fn escapes_in_strings() {
        let rule = ExtractionRule::parse("x", r#"grep("say \"hi\"", '*.l\'s')"#, "|").unwrap();
        assert_eq!(rule.pipeline()[0], grep("say \"hi\"", "*.l's"));
    }

    #[test]
    fn must_start_with_grep() {
        let err = ExtractionRule::parse("x", "  get(0) | asNumeric()", "|").unwrap_err();
        assert_eq!(err.position, 2);
        let err = ExtractionRule::parse("x", "grep('a','*') | grep('b','*')", "|").unwrap_err();
        assert_eq!(err.position, 16);
        assert!(ExtractionRule::new("x", vec![]).is_err());
    }

    #[test]
    fn reports_position_of_syntax_errors() {
        let err = ExtractionRule::parse("x", "grep('a', '*') get(0)", "|").unwrap_err();
        assert_eq!(err.position, 15);

        let err = ExtractionRule::parse("x", "grep('a, '*')", "|").unwrap_err();
        assert!(err.message.contains("expected ',' or ')'"), "{err}");

        let err = ExtractionRule::parse("x", "grep('a', '*') | frob()", "|").unwrap_err();
        assert_eq!(err.position, 17);
        assert!(err.message.contains("unknown operator"));

        let err = ExtractionRule::parse("x", "grep('unterminated", "|").unwrap_err();
        assert_eq!(err.position, 5);
    }

    #[test]
    fn argument_kinds_are_checked() {
        assert!(ExtractionRule::parse("x", "grep('a', '*') | get('0')", "|").is_err());
        assert!(ExtractionRule::parse("x", "grep('a', 1)", "|").is_err());
        assert!(ExtractionRule::parse("x", "grep('a')", "|").is_err());
        assert!(ExtractionRule::parse("x", "grep('a', '*') | cut('', 0)", "|").is_err());
    }

    #[test]
    fn invalid_file_glob_is_rejected() {
        let err = ExtractionRule::parse("x", "grep('a', '[oops')", "|").unwrap_err();
        assert!(err.message.contains("file glob"));
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(ExtractionRule::parse("x", "grep('a', '*')", " ").is_err());
    }
}
