//! Marker syntax configuration.
//!
//! A template family fixes five characters: the variable prefix, the formula
//! prefix, the delimiter pair, and the comment character.  With the default
//! syntax a variable reads `${radius~[8.0,9.0]}`, a formula `@{2*radius}`,
//! and a comment line starts with `#`.

use thiserror::Error;

/// Error returned when a syntax configuration is self-contradictory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("variable and formula prefixes are both '{0}'")]
    SamePrefix(char),
    #[error("opening and closing delimiters are both '{0}'")]
    SameDelimiter(char),
    #[error("prefix '{0}' is also a delimiter")]
    PrefixIsDelimiter(char),
    #[error("{field} must be exactly {expected} character(s), got {value:?}")]
    BadField {
        field: &'static str,
        expected: usize,
        value: String,
    },
}

/// Immutable marker syntax shared by scanning and compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syntax {
    variable_prefix: char,
    formula_prefix: char,
    delim_open: char,
    delim_close: char,
    comment_char: char,
}

impl Default for Syntax {
    fn default() -> Self {
        Syntax {
            variable_prefix: '$',
            formula_prefix: '@',
            delim_open: '{',
            delim_close: '}',
            comment_char: '#',
        }
    }
}

impl Syntax {
    pub fn new(
        variable_prefix: char,
        formula_prefix: char,
        delim_open: char,
        delim_close: char,
        comment_char: char,
    ) -> Result<Self, SyntaxError> {
        if variable_prefix == formula_prefix {
            return Err(SyntaxError::SamePrefix(variable_prefix));
        }
        if delim_open == delim_close {
            return Err(SyntaxError::SameDelimiter(delim_open));
        }
        for p in [variable_prefix, formula_prefix] {
            if p == delim_open || p == delim_close {
                return Err(SyntaxError::PrefixIsDelimiter(p));
            }
        }
        Ok(Syntax {
            variable_prefix,
            formula_prefix,
            delim_open,
            delim_close,
            comment_char,
        })
    }

    /// Build from the string fields of a model file: `varprefix` (`"$"`),
    /// `formulaprefix` (`"@"`), `delim` (`"{}"`), `commentline` (`"#"`).
    pub fn from_model_fields(
        varprefix: &str,
        formulaprefix: &str,
        delim: &str,
        commentline: &str,
    ) -> Result<Self, SyntaxError> {
        let var = single_char("varprefix", varprefix)?;
        let formula = single_char("formulaprefix", formulaprefix)?;
        let comment = single_char("commentline", commentline)?;
        let mut delims = delim.chars();
        let (open, close) = match (delims.next(), delims.next(), delims.next()) {
            (Some(o), Some(c), None) => (o, c),
            _ => {
                return Err(SyntaxError::BadField {
                    field: "delim",
                    expected: 2,
                    value: delim.to_owned(),
                })
            }
        };
        Syntax::new(var, formula, open, close, comment)
    }

    pub fn variable_prefix(&self) -> char {
        self.variable_prefix
    }

    pub fn formula_prefix(&self) -> char {
        self.formula_prefix
    }

    pub fn delim_open(&self) -> char {
        self.delim_open
    }

    pub fn delim_close(&self) -> char {
        self.delim_close
    }

    pub fn comment_char(&self) -> char {
        self.comment_char
    }

    /// `true` if `line` is a comment line (first non-blank char is the
    /// comment character).
    pub fn is_comment_line(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.comment_char)
    }
}

fn single_char(field: &'static str, value: &str) -> Result<char, SyntaxError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(SyntaxError::BadField {
            field,
            expected: 1,
            value: value.to_owned(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
