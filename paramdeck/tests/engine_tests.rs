//! End-to-end tests: compile a deck from a template, then extract results
//! from a report left in a working directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use paramdeck::extract::{extract, Operation};
use paramdeck::sweep::{case_label, grid};
use paramdeck::template::DomainSpec;
use paramdeck::{embedded, extract_all, ExtractionRule, Model, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn moret() -> Model {
    let (model, errors) = embedded::load("Moret").expect("Moret is embedded").unwrap();
    assert!(errors.is_empty(), "{errors:?}");
    model
}

/// A fresh working directory holding copies of the given fixtures.
fn workdir(fixtures: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in fixtures {
        fs::copy(data(name), dir.path().join(name)).unwrap();
    }
    dir
}

fn bindings(pairs: &[(&str, f64)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_string(), Value::Float(v)))
        .collect()
}

fn float(v: &Option<Value>) -> f64 {
    match v {
        Some(Value::Float(x)) => *x,
        other => panic!("expected a float, got {other:?}"),
    }
}

// ── Templating ────────────────────────────────────────────────────────────────

#[test]
fn discovers_godiva_variables() {
    let text = fs::read_to_string(data("godiva.m5")).unwrap();
    let tpl = moret().template(text).unwrap();
    let vars = tpl.variables();
    assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["radius", "u5"]);
    assert_eq!(
        vars["radius"],
        DomainSpec::Range { min: 8.0, max: 9.0, default: None }
    );
    assert_eq!(vars["u5"], DomainSpec::Default("4.49988E-02".into()));
}

#[test]
fn compiles_godiva_deck() {
    let text = fs::read_to_string(data("godiva.m5")).unwrap();
    let tpl = moret().template(text).unwrap();
    let deck = tpl.compile(&bindings(&[("radius", 8.5), ("u5", 4.5e-2)])).unwrap();

    assert!(deck.contains("TITLE GODIVA R=8.5 D=17.0\n"));
    assert!(deck.contains("  TYPE 1 SPHE 8.5\n"));
    assert!(deck.contains("    U235     0.045\n"));
    // Comment lines pass through untouched.
    assert!(deck.contains("* Geometry modelling, radius ${radius} swept by the study\n"));

    let live: Vec<&str> = deck.lines().filter(|l| !l.starts_with('*')).collect();
    assert!(live.iter().all(|l| !l.contains("${") && !l.contains("@{")), "{deck}");
}

#[test]
fn compiling_with_defaults_substitutes_parsed_default() {
    let text = fs::read_to_string(data("godiva.m5")).unwrap();
    let deck = moret().template(text).unwrap().compile(&bindings(&[("radius", 9.0)])).unwrap();
    assert!(deck.contains("    U235     0.0449988\n"));
}

#[test]
fn sweep_compiles_one_deck_per_case() {
    let text = fs::read_to_string(data("godiva.m5")).unwrap();
    let tpl = moret().template(text).unwrap();

    let mut values = indexmap::IndexMap::new();
    values.insert("radius".to_string(), vec![Value::Float(8.0), Value::Float(8.5), Value::Float(9.0)]);
    values.insert("u5".to_string(), vec![Value::Float(0.045), Value::Float(0.05)]);
    let cases = grid(&values);
    assert_eq!(cases.len(), 6);

    let decks: Vec<(String, String)> = cases
        .iter()
        .map(|case| (case_label(case), tpl.compile(case).unwrap()))
        .collect();
    assert_eq!(decks[0].0, "radius=8.0,u5=0.045");
    assert!(decks[5].1.contains("SPHE 9.0"));
    assert!(decks[5].1.contains("U235     0.05\n"));
}

// ── Extraction ────────────────────────────────────────────────────────────────

#[test]
fn extracts_keff_and_sigma() {
    let dir = workdir(&["godiva.listing"]);
    let out = moret().extract(dir.path());
    assert_eq!(float(&out["mean_keff"]), 0.99612);
    assert_eq!(float(&out["sigma_keff"]), 0.00100);
}

#[test]
fn perturbation_outputs_absent_without_perturbation_data() {
    let dir = workdir(&["godiva.listing"]);
    let out = moret().extract(dir.path());
    assert_eq!(
        out.keys().collect::<Vec<_>>(),
        vec!["mean_keff", "sigma_keff", "dkeff_pertu", "sigma_dkeff_pertu"]
    );
    assert!(out["mean_keff"].is_some());
    assert!(out["sigma_keff"].is_some());
    assert_eq!(out["dkeff_pertu"], None);
    assert_eq!(out["sigma_dkeff_pertu"], None);
}

#[test]
fn perturbation_outputs_present_with_fortran_exponents() {
    let dir = workdir(&["godiva_pertu.listing"]);
    let out = moret().extract(dir.path());
    assert!((float(&out["dkeff_pertu"]) + 1.234e-3).abs() < 1e-15);
    assert!((float(&out["sigma_dkeff_pertu"]) - 2.1e-4).abs() < 1e-15);
    assert_eq!(float(&out["mean_keff"]), 0.99612);
}

#[test]
fn extraction_is_idempotent() {
    let dir = workdir(&["godiva_pertu.listing"]);
    let model = moret();
    let first = model.extract(dir.path());
    let second = model.extract(dir.path());
    assert_eq!(first, second);
}

#[test]
fn missing_or_empty_report_leaves_every_output_absent() {
    let model = moret();

    let empty = tempfile::tempdir().unwrap();
    let out = model.extract(empty.path());
    assert_eq!(out.len(), 4);
    assert!(out.values().all(Option::is_none));

    fs::write(empty.path().join("godiva.listing"), "").unwrap();
    assert!(model.extract(empty.path()).values().all(Option::is_none));

    let gone = empty.path().join("never-created");
    assert!(model.extract(&gone).values().all(Option::is_none));
}

#[test]
fn reports_with_other_extensions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(data("godiva.listing"), dir.path().join("godiva.listing.bak")).unwrap();
    assert!(moret().extract(dir.path()).values().all(Option::is_none));
}

#[test]
fn rules_built_from_operators() {
    let dir = workdir(&["godiva.listing"]);
    let rule = ExtractionRule::new(
        "neutrons",
        vec![
            Operation::Grep { pattern: "NOMBRE DE NEUTRONS".into(), files: "*.listing".into() },
            Operation::Get(0),
            Operation::Cut { delimiter: "SIMULES".into(), index: 1 },
            Operation::AsNumeric,
        ],
    )
    .unwrap();
    assert_eq!(extract(&rule, dir.path()).unwrap(), Value::Float(417000.0));
    let all = extract_all(std::slice::from_ref(&rule), dir.path());
    assert_eq!(all["neutrons"], Some(Value::Float(417000.0)));
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[test]
fn independent_cases_run_in_parallel() {
    let text = fs::read_to_string(data("godiva.m5")).unwrap();
    let model = moret();
    let tpl = model.template(text).unwrap();
    let dirs: Vec<_> = (0..4).map(|_| workdir(&["godiva.listing"])).collect();

    let results: Vec<(String, f64)> = std::thread::scope(|s| {
        let handles: Vec<_> = dirs
            .iter()
            .enumerate()
            .map(|(i, dir)| {
                let tpl = &tpl;
                let model = &model;
                s.spawn(move || {
                    let radius = 8.0 + 0.25 * i as f64;
                    let deck = tpl.compile(&bindings(&[("radius", radius)])).unwrap();
                    fs::write(dir.path().join("godiva.m5"), &deck).unwrap();
                    let out = model.extract(dir.path());
                    (deck, float(&out["mean_keff"]))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 4);
    assert!(results[1].0.contains("SPHE 8.25"));
    assert!(results.iter().all(|(_, k)| *k == 0.99612));
}
