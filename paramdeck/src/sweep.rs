//! Parameter sweeps: one value list per variable, expanded to cases.

use indexmap::IndexMap;

use crate::value::Value;

/// One case of a sweep: a binding for every swept variable.
pub type Case = IndexMap<String, Value>;

/// Cartesian product of the value lists.
///
/// The first variable varies slowest.  An empty list for any variable gives
/// no cases; no variables gives a single empty case.
pub fn grid(values: &IndexMap<String, Vec<Value>>) -> Vec<Case> {
    let total = values.values().map(Vec::len).product::<usize>();
    let mut cases = Vec::with_capacity(total);
    if total == 0 {
        return cases;
    }
    for n in 0..total {
        let mut case = Case::with_capacity(values.len());
        let mut rest = n;
        // Decode `n` in mixed radix, last variable fastest.
        let mut picks = Vec::with_capacity(values.len());
        for list in values.values().rev() {
            picks.push(rest % list.len());
            rest /= list.len();
        }
        for ((name, list), &i) in values.iter().zip(picks.iter().rev()) {
            case.insert(name.clone(), list[i].clone());
        }
        cases.push(case);
    }
    cases
}

/// Compact label for a case, e.g. `radius=8.5,u5=0.045`.
pub fn case_label(case: &Case) -> String {
    case.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
