//! Template compiler: binds variables, evaluates formulas, rewrites markers.

use indexmap::IndexMap;
use tracing::debug;

use super::domain::{collect_variables, Variables};
use super::expr::{evaluate, parse_expr, EvalError, Layered, Lookup};
use super::scan::{scan, FormulaOccurrence, ScanResult, Span};
use super::TemplateError;
use crate::syntax::Syntax;
use crate::value::Value;

/// Knobs for [`Template::compile_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Substitute the domain default for variables the caller did not bind.
    /// When `false`, every discovered variable needs an explicit binding.
    pub use_defaults: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { use_defaults: true }
    }
}

/// A scanned template, ready to be compiled against any number of binding
/// sets.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
    syntax: Syntax,
    scan: ScanResult,
    variables: Variables,
}

impl Template {
    /// Scan `text` and merge its variable declarations.
    ///
    /// Formula syntax is checked here too, so a template that parses only
    /// fails to compile on binding-dependent errors.
    pub fn parse(text: impl Into<String>, syntax: Syntax) -> Result<Self, TemplateError> {
        let text = text.into();
        let scan = scan(&text, &syntax)?;
        let variables = collect_variables(&scan.variables)?;
        let tpl = Template {
            text,
            syntax,
            scan,
            variables,
        };
        for f in &tpl.scan.formulas {
            let shape = tpl.formula_source(f, |_| Ok("(0)".into()))?;
            parse_expr(&shape).map_err(|source| TemplateError::Formula {
                expression: f.expression.clone(),
                line: f.line,
                source,
            })?;
        }
        Ok(tpl)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Discovered variables and their domains, in order of first appearance.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Every marker occurrence, in text order.
    pub fn occurrences(&self) -> &ScanResult {
        &self.scan
    }

    pub fn formulas(&self) -> &[FormulaOccurrence] {
        &self.scan.formulas
    }

    /// Default value of every variable.
    pub fn defaults(&self) -> IndexMap<String, Value> {
        self.variables
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default_value()))
            .collect()
    }

    /// Compile with default options.
    pub fn compile<B: Lookup + ?Sized>(&self, bindings: &B) -> Result<String, TemplateError> {
        self.compile_with(bindings, CompileOptions::default())
    }

    /// Resolve a value for every discovered variable.
    ///
    /// Bound values are taken as given, even outside a declared range.
    pub fn resolve<B: Lookup + ?Sized>(
        &self,
        bindings: &B,
        options: CompileOptions,
    ) -> Result<IndexMap<String, Value>, TemplateError> {
        let mut resolved = IndexMap::with_capacity(self.variables.len());
        for (name, spec) in &self.variables {
            let value = match bindings.lookup(name) {
                Some(v) => v,
                None if options.use_defaults => spec.default_value(),
                None => return Err(TemplateError::UnresolvedVariable { name: name.clone() }),
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    /// Produce the compiled document.  All-or-nothing: on error nothing is
    /// returned.
    pub fn compile_with<B: Lookup + ?Sized>(
        &self,
        bindings: &B,
        options: CompileOptions,
    ) -> Result<String, TemplateError> {
        let resolved = self.resolve(bindings, options)?;
        let scope = Layered {
            first: &resolved,
            second: bindings,
        };

        let mut edits: Vec<(Span, String)> =
            Vec::with_capacity(self.scan.variables.len() + self.scan.formulas.len());

        for f in &self.scan.formulas {
            let src = self.formula_source(f, |name| {
                let value = &resolved[name];
                match value.to_numeric() {
                    Some(n) if n.is_non_finite() => Err(EvalError::Arithmetic(format!(
                        "'{name}' is bound to non-finite value {n}"
                    ))),
                    Some(n) => Ok(format!("({n})")),
                    None => Err(EvalError::NonNumeric {
                        name: name.to_owned(),
                        value: value.to_string(),
                    }),
                }
            })?;
            let value = evaluate(&src, &scope).map_err(|e| match e {
                EvalError::UnboundReference(name) => TemplateError::UnresolvedVariable { name },
                source => TemplateError::Formula {
                    expression: f.expression.clone(),
                    line: f.line,
                    source,
                },
            })?;
            edits.push((f.span, value.to_string()));
        }

        for v in &self.scan.variables {
            if self.scan.formulas.iter().any(|f| f.body.contains(&v.span)) {
                continue; // already folded into its formula
            }
            edits.push((v.span, resolved[&v.name].to_string()));
        }

        edits.sort_by_key(|(span, _)| span.start);
        let out = rewrite(&self.text, &edits);
        debug!(
            variables = resolved.len(),
            formulas = self.scan.formulas.len(),
            bytes = out.len(),
            "compiled template"
        );
        Ok(out)
    }

    /// Expression text of `f` with each nested variable marker replaced by
    /// `subst(name)`.
    fn formula_source<F>(&self, f: &FormulaOccurrence, subst: F) -> Result<String, TemplateError>
    where
        F: Fn(&str) -> Result<String, EvalError>,
    {
        let mut src = String::with_capacity(f.body.len());
        let mut last = f.body.start;
        for v in self.scan.variables.iter().filter(|v| f.body.contains(&v.span)) {
            src.push_str(&self.text[last..v.span.start]);
            let piece = subst(&v.name).map_err(|source| TemplateError::Formula {
                expression: f.expression.clone(),
                line: f.line,
                source,
            })?;
            src.push_str(&piece);
            last = v.span.end;
        }
        src.push_str(&self.text[last..f.body.end]);
        Ok(src.trim().to_owned())
    }
}

/// Replace each non-overlapping span (sorted by start) with its text.
fn rewrite(text: &str, edits: &[(Span, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (span, replacement) in edits {
        out.push_str(&text[last..span.start]);
        out.push_str(replacement);
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Discover the variables of `text` and their domains.
pub fn discover(text: &str, syntax: &Syntax) -> Result<Variables, TemplateError> {
    let scan = scan(text, syntax)?;
    collect_variables(&scan.variables)
}

/// One-shot compile of `text` against `bindings`.
pub fn compile<B: Lookup + ?Sized>(
    text: &str,
    syntax: &Syntax,
    bindings: &B,
) -> Result<String, TemplateError> {
    Template::parse(text, *syntax)?.compile(bindings)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::template::domain::DomainSpec;

    fn bind(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn compile_default(text: &str, pairs: &[(&str, Value)]) -> Result<String, TemplateError> {
        compile(text, &Syntax::default(), &bind(pairs))
    }

    #[test]
    fn substitutes_bound_values() {
        let out = compile_default(
            "SPHE ${radius~[8.0,9.0]}\nU235 ${u5~4.49988E-02}\n",
            &[("radius", Value::Float(8.5)), ("u5", Value::Float(4.5e-2))],
        )
        .unwrap();
        assert_eq!(out, "SPHE 8.5\nU235 0.045\n");
    }

    #[test]
    fn falls_back_to_defaults() {
        let out = compile_default("${a} ${b~7} ${c~[2,3]} ${d~{x,y}}", &[]).unwrap();
        assert_eq!(out, "0 7 2.0 x");
    }

    #[test]
    fn formula_sees_substituted_variable() {
        let out = compile_default(
            "R ${radius~[8.0,9.0]} D @{2*radius}",
            &[("radius", Value::Float(8.5))],
        )
        .unwrap();
        assert_eq!(out, "R 8.5 D 17.0");
    }

    #[test]
    fn formula_with_nested_variable_marker() {
        let out = compile_default("D @{2 * ${radius~[8.0,9.0]}}", &[("radius", Value::Int(-3))])
            .unwrap();
        assert_eq!(out, "D -6");
        let out = compile_default("P @{2^${e}}", &[("e", Value::Int(-1))]).unwrap();
        assert_eq!(out, "P 0.5");
    }

    #[test]
    fn formula_may_reference_extra_bindings() {
        let out = compile_default("@{scale * 2}", &[("scale", Value::Float(1.25))]).unwrap();
        assert_eq!(out, "2.5");
    }

    #[test]
    fn out_of_range_binding_is_substituted_verbatim() {
        let out =
            compile_default("SPHE ${radius~[8.0,9.0]}", &[("radius", Value::Float(50.0))]).unwrap();
        assert_eq!(out, "SPHE 50.0");
    }

    #[test]
    fn string_bindings() {
        let out = compile_default("LIBR ${lib~jeff311.xml}", &[("lib", "endf8.xml".into())]).unwrap();
        assert_eq!(out, "LIBR endf8.xml");
    }

    #[test]
    fn repeated_variable_uses_first_declaration() {
        let out = compile_default("${r~8.0} ${r} ${r~9.0}", &[]).unwrap();
        assert_eq!(out, "8.0 8.0 8.0");
    }

    #[test]
    fn unbound_formula_reference_names_the_variable() {
        let err = compile_default("x ${a} @{a + missing}", &[]).unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedVariable { name: "missing".into() });
    }

    #[test]
    fn strict_mode_requires_every_binding() {
        let tpl = Template::parse("${a~1} ${b~2}", Syntax::default()).unwrap();
        let err = tpl
            .compile_with(&bind(&[("a", Value::Int(5))]), CompileOptions { use_defaults: false })
            .unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedVariable { name: "b".into() });
    }

    #[test]
    fn division_by_zero_aborts_compile() {
        let err = compile_default("ok ${z}\n@{1 / z}", &[("z", Value::Int(0))]).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Formula { line: 2, source: EvalError::Arithmetic(_), .. }
        ));
    }

    #[test]
    fn non_numeric_variable_in_formula() {
        let err = compile_default("@{2 * ${mat~UMET}}", &[]).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Formula { source: EvalError::NonNumeric { .. }, .. }
        ));
    }

    #[test]
    fn non_finite_nested_variable_is_an_arithmetic_error() {
        for x in [f64::NAN, f64::INFINITY] {
            let err = compile_default("@{2*${r}}", &[("r", Value::Float(x))]).unwrap_err();
            match err {
                TemplateError::Formula { source: EvalError::Arithmetic(msg), .. } => {
                    assert!(msg.contains("'r'"), "{msg}");
                }
                other => panic!("expected an arithmetic error, got {other:?}"),
            }
        }
    }

    #[test]
    fn formula_syntax_error_is_reported_at_parse() {
        let err = Template::parse("@{2 * (radius}", Syntax::default()).unwrap_err();
        assert!(matches!(err, TemplateError::Formula { source: EvalError::Syntax(_), .. }));
    }

    #[test]
    fn comment_lines_are_copied_untouched() {
        let syntax = Syntax::from_model_fields("$", "@", "{}", "*").unwrap();
        let text = "* radius ${radius}\nSPHE ${radius~[8,9]}\n";
        let out = compile(text, &syntax, &bind(&[("radius", Value::Float(8.5))])).unwrap();
        assert_eq!(out, "* radius ${radius}\nSPHE 8.5\n");
    }

    #[test]
    fn template_is_reusable_across_bindings() {
        let tpl = Template::parse("${r~[8,9]} @{r*r}", Syntax::default()).unwrap();
        assert_eq!(tpl.variables()["r"], DomainSpec::Range { min: 8.0, max: 9.0, default: None });
        let outs: Vec<String> = [8, 9]
            .iter()
            .map(|&r| tpl.compile(&bind(&[("r", Value::Int(r))])).unwrap())
            .collect();
        assert_eq!(outs, vec!["8 64", "9 81"]);
    }

    #[test]
    fn discover_lists_variables() {
        let vars = discover("${radius~[8.0,9.0]}\n${u5~4.49988E-02}\n# ${x}", &Syntax::default())
            .unwrap();
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["radius", "u5"]);
    }

    #[test]
    fn defaults_map() {
        let tpl = Template::parse("${a~[1,2]} ${b~x}", Syntax::default()).unwrap();
        let d = tpl.defaults();
        assert_eq!(d["a"], Value::Float(1.0));
        assert_eq!(d["b"], Value::Str("x".into()));
    }
}
