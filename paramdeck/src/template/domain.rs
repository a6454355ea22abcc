//! Variable domains and the merge of repeated declarations.

use std::fmt;

use indexmap::IndexMap;
use tracing::warn;

use super::scan::VariableOccurrence;
use super::TemplateError;
use crate::value::Value;

/// Discovered variables in order of first appearance.
pub type Variables = IndexMap<String, DomainSpec>;

/// The declared domain of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainSpec {
    /// Bare `${x}`: domain `[0,1]`, default `0`.
    Unconstrained,
    /// `${x~value}`: the literal is also the default.
    Default(String),
    /// `${x~[min,max]}` or `${x~[min,max,default]}`.
    Range {
        min: f64,
        max: f64,
        default: Option<f64>,
    },
    /// `${x~{a,b,c}}`: a discrete set whose first element is the default.
    Set(Vec<String>),
}

/// The variant of a [`DomainSpec`], used to check repeated declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Unconstrained,
    Default,
    Range,
    Set,
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DomainKind::Unconstrained => "unconstrained",
            DomainKind::Default => "default value",
            DomainKind::Range => "range",
            DomainKind::Set => "set",
        })
    }
}

impl DomainSpec {
    pub fn kind(&self) -> DomainKind {
        match self {
            DomainSpec::Unconstrained => DomainKind::Unconstrained,
            DomainSpec::Default(_) => DomainKind::Default,
            DomainSpec::Range { .. } => DomainKind::Range,
            DomainSpec::Set(_) => DomainKind::Set,
        }
    }

    /// The value substituted when the caller binds nothing.
    pub fn default_value(&self) -> Value {
        default_of(self)
    }

    /// Numeric interval of the domain, if it has one.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            DomainSpec::Unconstrained => Some((0.0, 1.0)),
            DomainSpec::Range { min, max, .. } => Some((*min, *max)),
            DomainSpec::Default(_) | DomainSpec::Set(_) => None,
        }
    }

    /// Whether `value` lies in the domain.
    ///
    /// The compiler never calls this; it is offered to callers that want to
    /// validate bindings before compiling.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            DomainSpec::Default(_) => true,
            DomainSpec::Set(items) => items
                .iter()
                .any(|item| &Value::parse_literal(item) == value || item == &value.to_string()),
            DomainSpec::Unconstrained | DomainSpec::Range { .. } => {
                match (self.bounds(), value.as_number()) {
                    (Some((lo, hi)), Some(x)) => lo <= x && x <= hi,
                    _ => false,
                }
            }
        }
    }
}

/// Default value of a domain.
///
/// A range without an explicit default uses `0` when `0` lies in
/// `[min, max]` and `min` otherwise.
pub fn default_of(spec: &DomainSpec) -> Value {
    match spec {
        DomainSpec::Unconstrained => Value::Int(0),
        DomainSpec::Default(lit) => Value::parse_literal(lit),
        DomainSpec::Range { min, max, default } => match default {
            Some(d) => Value::Float(*d),
            None if *min <= 0.0 && 0.0 <= *max => Value::Float(0.0),
            None => Value::Float(*min),
        },
        DomainSpec::Set(items) => items
            .first()
            .map(|s| Value::parse_literal(s))
            .unwrap_or_default(),
    }
}

/// Merge every occurrence into one domain per variable name.
///
/// The first declaring occurrence wins.  A bare `${x}` declares nothing and
/// is compatible with any domain.  A later declaration of a different kind
/// is an [`TemplateError::InconsistentDomain`]; a later declaration of the
/// same kind but different content is kept out and logged.
pub fn collect_variables(occurrences: &[VariableOccurrence]) -> Result<Variables, TemplateError> {
    let mut vars: Variables = IndexMap::new();
    // Line of the occurrence that set each entry, for diagnostics.
    let mut declared_at: IndexMap<&str, usize> = IndexMap::new();

    for occ in occurrences {
        if !vars.contains_key(&occ.name) {
            vars.insert(occ.name.clone(), occ.domain.clone());
            declared_at.insert(&occ.name, occ.line);
            continue;
        }
        let Some(current) = vars.get_mut(&occ.name) else { continue };

        match (current.kind(), occ.domain.kind()) {
            (_, DomainKind::Unconstrained) => {}
            (DomainKind::Unconstrained, _) => {
                *current = occ.domain.clone();
                declared_at.insert(&occ.name, occ.line);
            }
            (first, later) if first != later => {
                return Err(TemplateError::InconsistentDomain {
                    name: occ.name.clone(),
                    first,
                    later,
                    line: occ.line,
                });
            }
            _ => {
                if *current != occ.domain {
                    warn!(
                        variable = %occ.name,
                        line = occ.line,
                        first_line = declared_at.get(occ.name.as_str()).copied().unwrap_or(0),
                        "ignoring redeclaration; first declaration wins"
                    );
                }
            }
        }
    }
    Ok(vars)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
