//! Result extraction from simulator reports.
//!
//! Each output name has a pipeline of operators that starts with a `grep`
//! over the report files of a working directory and narrows the matches
//! down to one scalar.  A failing pipeline leaves its output absent
//! without affecting the others.

pub mod interp;
pub mod pipeline;

use indexmap::IndexMap;

use crate::value::Value;

pub use interp::{extract, extract_all, parse_number, Stage, StageFailure};
pub use pipeline::{ExtractionRule, Operation, PipelineError, DEFAULT_CHAIN};

/// Extraction results keyed by output name, in rule order.  `None` marks an
/// absent output.
pub type Outputs = IndexMap<String, Option<Value>>;
