//! `${path}` and `{{name}}` placeholder substitution.

use std::sync::LazyLock;

use conflux_core::value::{lookup_path, render};
use regex::Regex;
use serde_json::Value;

static DOLLAR_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("static pattern"));
static CURLY_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("static pattern"));

/// Resolves bare `{{name}}` placeholders that the data map did not cover.
///
/// The engine wires this to credential lookup by name; tests substitute a
/// map. Resolution is infallible — an unknown name returns `None` and the
/// placeholder stays literal.
pub trait NameResolver {
    /// Resolve a name to its replacement text.
    fn resolve(&self, name: &str) -> Option<String>;
}

impl NameResolver for std::collections::HashMap<String, String> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Interpolate a template against `data`.
///
/// Two passes, in order:
///
/// 1. `${path}` — dotted navigation through `data`; a missing path renders
///    as the empty string.
/// 2. `{{name}}` — looked up in `data` (dotted paths allowed), then through
///    the `resolver`; if neither resolves, the placeholder is left literal.
///
/// Replacement text is appended verbatim, so regex metacharacters in
/// replacements (or in the data) are inert. A template with no placeholders
/// comes back unchanged.
#[must_use]
pub fn interpolate(template: &str, data: &Value, resolver: Option<&dyn NameResolver>) -> String {
    let pass_one = replace_all(&DOLLAR_PLACEHOLDER, template, |path| {
        Some(lookup_path(data, path.trim()).map(render).unwrap_or_default())
    });

    replace_all(&CURLY_PLACEHOLDER, &pass_one, |name| {
        let name = name.trim();
        lookup_path(data, name)
            .map(render)
            .or_else(|| resolver.and_then(|r| r.resolve(name)))
    })
}

/// Interpolate every string inside a value tree, recursing through arrays
/// and objects. Non-string leaves pass through untouched.
#[must_use]
pub fn interpolate_value(
    value: &Value,
    data: &Value,
    resolver: Option<&dyn NameResolver>,
) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, data, resolver)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| interpolate_value(v, data, resolver))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, data, resolver)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Run one placeholder pass. `lookup` returning `None` keeps the original
/// placeholder text.
fn replace_all(pattern: &Regex, input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in pattern.captures_iter(input) {
        let whole = caps.get(0).expect("match");
        out.push_str(&input[last..whole.start()]);
        match lookup(&caps[1]) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    out
}
