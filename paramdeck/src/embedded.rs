//! Built-in model definitions.
//!
//! The JSON files under `models/` are baked into the library at compile
//! time via `include_str!()`, so common simulators work without any model
//! file on disk.

use crate::model::{Model, ModelError};

/// A single embedded model file.
pub struct EmbeddedModel {
    pub id: &'static str,
    pub json: &'static str,
}

/// All embedded models.
pub static EMBEDDED_MODELS: &[EmbeddedModel] = &[
    EmbeddedModel { id: "Moret", json: include_str!("../models/moret.json") },
];

/// Look up an embedded model's JSON by id, ignoring case.
pub fn get_model(id: &str) -> Option<&'static str> {
    EMBEDDED_MODELS
        .iter()
        .find(|m| m.id.eq_ignore_ascii_case(id))
        .map(|m| m.json)
}

/// Iterate over all embedded models as `(id, json)` pairs.
pub fn all_models() -> impl Iterator<Item = (&'static str, &'static str)> {
    EMBEDDED_MODELS.iter().map(|m| (m.id, m.json))
}

/// Parse an embedded model.  `None` if no model has that id.
pub fn load(id: &str) -> Option<Result<(Model, Vec<ModelError>), ModelError>> {
    get_model(id).map(Model::load_str)
}
