//! Template discovery and compilation.
//!
//! A template is a simulator input deck with embedded markers:
//!
//! - `${name}` / `${name~domain}`: a variable, replaced by its bound value
//!   or its domain default
//! - `@{expression}`: a formula, evaluated after variable substitution
//!
//! The prefixes, delimiters and comment character come from a [`Syntax`].
//!
//! # Quick start
//!
//! ```rust
//! use std::collections::HashMap;
//! use paramdeck::{Syntax, Template, Value};
//!
//! let tpl = Template::parse("R ${radius~[8.0,9.0]} D @{2*radius}", Syntax::default()).unwrap();
//! let bindings = HashMap::from([("radius".to_string(), Value::Float(8.5))]);
//! assert_eq!(tpl.compile(&bindings).unwrap(), "R 8.5 D 17.0");
//! ```
//!
//! [`Syntax`]: crate::syntax::Syntax

pub mod compile;
pub mod domain;
pub mod expr;
pub mod scan;

use thiserror::Error;

pub use compile::{compile, discover, CompileOptions, Template};
pub use domain::{collect_variables, default_of, DomainKind, DomainSpec, Variables};
pub use expr::{evaluate, EvalError, Lookup};
pub use scan::{scan, FormulaOccurrence, ScanResult, Span, VariableOccurrence};

/// Errors from scanning or compiling a template.  Any of them aborts the
/// call; no partial document is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("line {line}, column {column}: malformed marker: {reason}")]
    MalformedMarker {
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("line {line}: variable '{name}' redeclared as {later}, first declared as {first}")]
    InconsistentDomain {
        name: String,
        first: DomainKind,
        later: DomainKind,
        line: usize,
    },

    #[error("unresolved variable '{name}'")]
    UnresolvedVariable { name: String },

    #[error("line {line}: formula '{expression}': {source}")]
    Formula {
        expression: String,
        line: usize,
        #[source]
        source: EvalError,
    },
}
