//! # Flowmesh Condition
//!
//! Evaluates a `condition` transition's expression string: every
//! JSONPath-looking token (`$` followed by `[A-Za-z0-9_.\[\]]+`) is
//! substituted with the JSON-literal form of its resolved value, and the
//! resulting plain-JS expression is evaluated in a throw-away
//! [`boa_engine`] VM and coerced to a boolean.
//!
//! A fresh `Context` is built per evaluation — expressions never share
//! VM state, so one flaky or malicious condition can't contaminate the
//! next node's evaluation.

use std::sync::OnceLock;

use boa_engine::{Context, Source};
use flowmesh_context::ExecutionContext;
use regex::Regex;
use serde_json::Value;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$[A-Za-z0-9_.\[\]]+").expect("static regex"))
}

/// Render a resolved JSON value as the literal a JS expression expects:
/// strings are quoted (and escaped), numbers/bools/null print as-is,
/// containers print as canonical JSON (itself valid JS object/array
/// literal syntax).
fn as_js_literal(value: &Value) -> String {
    match value {
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_owned()),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            value.to_string()
        }
    }
}

/// Substitute every JSONPath token in `expression` with its resolved
/// JSON-literal form, given `ctx`. Unresolvable tokens become the bare
/// word `undefined`, matching JS's own semantics for a missing value.
fn substitute(expression: &str, ctx: &ExecutionContext) -> String {
    token_regex()
        .replace_all(expression, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            match ctx.get_value(token) {
                Ok(value) => as_js_literal(&value),
                Err(_) => "undefined".to_owned(),
            }
        })
        .into_owned()
}

/// Evaluate a condition expression against the run's execution context.
/// Any substitution/evaluation failure, and any non-boolean-coercible
/// result, is treated as `false` — conditions are never a source of a
/// fatal execution error (see the error-handling taxonomy: "condition
/// error... treated as false, not an error").
#[must_use]
pub fn evaluate(expression: &str, ctx: &ExecutionContext) -> bool {
    let substituted = substitute(expression, ctx);

    let mut js = Context::default();
    match js.eval(Source::from_bytes(substituted.as_bytes())) {
        Ok(result) => result.to_boolean(),
        Err(err) => {
            tracing::debug!(expression = %substituted, error = %err, "condition evaluation failed");
            false
        }
    }
}
