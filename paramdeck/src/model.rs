//! Model files: the marker syntax and output rules of one simulator.
//!
//! A model is a JSON object:
//!
//! ```json
//! {
//!   "id": "Moret",
//!   "varprefix": "$",
//!   "formulaprefix": "@",
//!   "delim": "{}",
//!   "commentline": "*",
//!   "output": {
//!     "mean_keff": "grep(\"ESTI. + FAIBLE SIGMA\", \"*.listing\") | get(0) | substring(\"SIGMA\", \"+/-\") | asNumeric()"
//!   }
//! }
//! ```
//!
//! | Key | Default |
//! |-----|---------|
//! | `varprefix` | `$` |
//! | `formulaprefix` | `@` |
//! | `delim` | `{}` |
//! | `commentline` | `#` |
//! | `chain` | `\|` |
//! | `output` | none |
//!
//! Unknown keys are ignored so plugin files carrying extra metadata still
//! load.

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::extract::{extract_all, ExtractionRule, Outputs, PipelineError, DEFAULT_CHAIN};
use crate::syntax::{Syntax, SyntaxError};
use crate::template::{Template, TemplateError};

// ── Public API ────────────────────────────────────────────────────────────────

/// Error from loading a model.  `Rule` is reported alongside a loaded
/// model; the others abort loading.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid marker syntax: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("output '{output}': {source}")]
    Rule {
        output: String,
        #[source]
        source: PipelineError,
    },
}

/// A loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub id: String,
    pub syntax: Syntax,
    /// Output rules in file order.
    pub rules: Vec<ExtractionRule>,
}

impl Model {
    pub fn new(id: impl Into<String>, syntax: Syntax) -> Self {
        Model {
            id: id.into(),
            syntax,
            rules: Vec::new(),
        }
    }

    /// Parse a model from JSON.
    ///
    /// An output whose pipeline does not parse is skipped and returned in
    /// the error list; the rest of the model still loads.
    pub fn load_str(json: &str) -> Result<(Self, Vec<ModelError>), ModelError> {
        let raw: RawModel = serde_json::from_str(json)?;
        let syntax = Syntax::from_model_fields(
            &raw.varprefix,
            &raw.formulaprefix,
            &raw.delim,
            &raw.commentline,
        )?;

        let mut model = Model::new(raw.id, syntax);
        let mut errors = Vec::new();
        for (output, pipeline) in raw.output {
            match ExtractionRule::parse(output.as_str(), &pipeline, &raw.chain) {
                Ok(rule) => model.rules.push(rule),
                Err(source) => {
                    warn!(model = %model.id, %output, %source, "skipping output rule");
                    errors.push(ModelError::Rule { output, source });
                }
            }
        }
        Ok((model, errors))
    }

    /// Read and parse a model file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<(Self, Vec<ModelError>), ModelError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_str(&json)
    }

    /// The rule for `output`, if the model defines one.
    pub fn rule(&self, output: &str) -> Option<&ExtractionRule> {
        self.rules.iter().find(|r| r.output() == output)
    }

    /// Parse `text` as a template in this model's syntax.
    pub fn template(&self, text: impl Into<String>) -> Result<Template, TemplateError> {
        Template::parse(text, self.syntax)
    }

    /// Run every output rule against the reports in `workdir`.
    pub fn extract(&self, workdir: impl AsRef<Path>) -> Outputs {
        extract_all(&self.rules, workdir)
    }
}

// ── File format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default = "default_varprefix")]
    varprefix: String,
    #[serde(default = "default_formulaprefix")]
    formulaprefix: String,
    #[serde(default = "default_delim")]
    delim: String,
    #[serde(default = "default_commentline")]
    commentline: String,
    #[serde(default = "default_chain")]
    chain: String,
    #[serde(default)]
    output: IndexMap<String, String>,
}

fn default_varprefix() -> String {
    "$".into()
}

fn default_formulaprefix() -> String {
    "@".into()
}

fn default_delim() -> String {
    "{}".into()
}

fn default_commentline() -> String {
    "#".into()
}

fn default_chain() -> String {
    DEFAULT_CHAIN.into()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
