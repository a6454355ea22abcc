//! Parametric input decks for batch simulation codes.
//!
//! `paramdeck` does the two text jobs around a parametric study:
//!
//! - **Templating**: discover the `${variable}` and `@{formula}` markers of
//!   an input deck and compile it against a set of bindings
//!   ([`Template`]).
//! - **Extraction**: pull named scalar results out of the report files a
//!   run leaves in its working directory ([`ExtractionRule`],
//!   [`extract_all`]).
//!
//! A [`Model`] bundles the marker [`Syntax`] and extraction rules of one
//! simulator; [`embedded`] ships ready-made models.
//!
//! ```rust
//! use std::collections::HashMap;
//! use paramdeck::{embedded, Value};
//!
//! let (model, _) = embedded::load("Moret").unwrap().unwrap();
//! let tpl = model.template("* radius\nSPHE ${radius~[8.0,9.0]}\n").unwrap();
//! let deck = tpl
//!     .compile(&HashMap::from([("radius".to_string(), Value::Float(8.5))]))
//!     .unwrap();
//! assert_eq!(deck, "* radius\nSPHE 8.5\n");
//! ```
//!
//! The library logs through [`tracing`] and never installs a subscriber.

pub mod embedded;
pub mod extract;
pub mod model;
pub mod pattern;
pub mod sweep;
pub mod syntax;
pub mod template;
pub mod value;

pub use extract::{extract, extract_all, ExtractionRule, Operation, Outputs, PipelineError, StageFailure};
pub use model::{Model, ModelError};
pub use syntax::{Syntax, SyntaxError};
pub use template::{compile, discover, CompileOptions, DomainSpec, Template, TemplateError, Variables};
pub use value::Value;
