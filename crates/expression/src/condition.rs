//! Field/operator/value condition rules.
//!
//! The rule shape shared by the `switch` and `filter` handlers: a dotted
//! field path, an operator name, and a comparison value, combined with
//! `and`/`or` across a rule's condition list.

use conflux_core::value::{lookup_path, render};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field/operator/value test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the data under test.
    #[serde(default)]
    pub field: String,
    /// Operator name, matched case-insensitively.
    pub operator: String,
    /// Comparison value; unused by the unary operators.
    #[serde(default)]
    pub value: Value,
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineWith {
    /// Every condition must hold.
    #[default]
    And,
    /// At least one condition must hold.
    Or,
}

/// Evaluate a list of conditions with the given combinator, short-circuiting.
///
/// An empty list holds vacuously.
#[must_use]
pub fn eval_conditions(conditions: &[Condition], combine: CombineWith, data: &Value) -> bool {
    match combine {
        CombineWith::And => conditions.iter().all(|c| eval_condition(c, data)),
        CombineWith::Or => {
            !conditions.is_empty() && conditions.iter().any(|c| eval_condition(c, data))
        }
    }
}

/// Evaluate a single condition against the data.
///
/// Unknown operators are false, never an error — a workflow author's typo
/// routes to the fallback branch instead of failing the run.
#[must_use]
pub fn eval_condition(condition: &Condition, data: &Value) -> bool {
    let actual = lookup_path(data, &condition.field);
    let expected = &condition.value;

    match condition.operator.to_ascii_lowercase().as_str() {
        "equals" => actual.is_some_and(|a| loose_eq(a, expected)),
        "notequals" => !actual.is_some_and(|a| loose_eq(a, expected)),
        "contains" => actual.is_some_and(|a| contains(a, expected)),
        "notcontains" => !actual.is_some_and(|a| contains(a, expected)),
        "startswith" => {
            actual.is_some_and(|a| render(a).starts_with(&render(expected)))
        }
        "endswith" => actual.is_some_and(|a| render(a).ends_with(&render(expected))),
        "matches" => actual.is_some_and(|a| {
            Regex::new(&render(expected)).is_ok_and(|re| re.is_match(&render(a)))
        }),
        "gt" => compare(actual, expected).is_some_and(std::cmp::Ordering::is_gt),
        "gte" => compare(actual, expected).is_some_and(std::cmp::Ordering::is_ge),
        "lt" => compare(actual, expected).is_some_and(std::cmp::Ordering::is_lt),
        "lte" => compare(actual, expected).is_some_and(std::cmp::Ordering::is_le),
        "isempty" => actual.is_none_or(is_empty),
        "isnotempty" => actual.is_some_and(|a| !is_empty(a)),
        "isnull" => actual.is_none_or(Value::is_null),
        "isnotnull" => actual.is_some_and(|a| !a.is_null()),
        "in" => actual.is_some_and(|a| member_of(a, expected)),
        "notin" => !actual.is_some_and(|a| member_of(a, expected)),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    a == b || render(a) == render(b)
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    Some(render(actual).cmp(&render(expected)))
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => s.contains(&render(expected)),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// `in` membership: the expected side may be a list or a comma-separated
/// string.
fn member_of(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| loose_eq(actual, item)),
        Value::String(s) => s
            .split(',')
            .any(|part| part.trim() == render(actual).as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn cond(field: &str, operator: &str, value: Value) -> Condition {
        Condition {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }
    }

    #[rstest]
    #[case("equals", json!("open"), true)]
    #[case("EQUALS", json!("open"), true)]
    #[case("notEquals", json!("open"), false)]
    #[case("contains", json!("pe"), true)]
    #[case("notContains", json!("zz"), true)]
    #[case("startsWith", json!("op"), true)]
    #[case("endsWith", json!("en"), true)]
    #[case("matches", json!("^o.+n$"), true)]
    #[case("isNotEmpty", json!(null), true)]
    #[case("isEmpty", json!(null), false)]
    fn string_operators(#[case] op: &str, #[case] value: Value, #[case] expected: bool) {
        let data = json!({"status": "open"});
        assert_eq!(
            eval_condition(&cond("status", op, value), &data),
            expected,
            "operator {op}"
        );
    }

    #[rstest]
    #[case("gt", json!(10), false)]
    #[case("gt", json!(4), true)]
    #[case("gte", json!(5), true)]
    #[case("lt", json!(6), true)]
    #[case("lte", json!(4), false)]
    fn numeric_operators(#[case] op: &str, #[case] value: Value, #[case] expected: bool) {
        let data = json!({"count": 5});
        assert_eq!(eval_condition(&cond("count", op, value), &data), expected);
    }

    #[test]
    fn numeric_comparison_coerces_strings() {
        let data = json!({"count": "15"});
        assert!(eval_condition(&cond("count", "gt", json!(9)), &data));
    }

    #[test]
    fn null_operators() {
        let data = json!({"a": null, "b": 1});
        assert!(eval_condition(&cond("a", "isNull", json!(null)), &data));
        assert!(eval_condition(&cond("missing", "isNull", json!(null)), &data));
        assert!(eval_condition(&cond("b", "isNotNull", json!(null)), &data));
    }

    #[test]
    fn membership() {
        let data = json!({"color": "red"});
        assert!(eval_condition(
            &cond("color", "in", json!(["red", "blue"])),
            &data
        ));
        assert!(eval_condition(
            &cond("color", "in", json!("red, blue")),
            &data
        ));
        assert!(eval_condition(
            &cond("color", "notIn", json!(["green"])),
            &data
        ));
    }

    #[test]
    fn array_contains() {
        let data = json!({"tags": ["a", "b"]});
        assert!(eval_condition(&cond("tags", "contains", json!("a")), &data));
        assert!(!eval_condition(&cond("tags", "contains", json!("z")), &data));
    }

    #[test]
    fn unknown_operator_is_false() {
        let data = json!({"a": 1});
        assert!(!eval_condition(&cond("a", "frobnicates", json!(1)), &data));
    }

    #[test]
    fn combinators_short_circuit() {
        let data = json!({"a": 1, "b": 2});
        let yes = cond("a", "equals", json!(1));
        let no = cond("b", "equals", json!(99));

        assert!(eval_conditions(
            &[yes.clone(), no.clone()],
            CombineWith::Or,
            &data
        ));
        assert!(!eval_conditions(
            &[yes.clone(), no.clone()],
            CombineWith::And,
            &data
        ));
        assert!(eval_conditions(&[yes], CombineWith::And, &data));
        // Vacuous truth for AND, false for OR.
        assert!(eval_conditions(&[], CombineWith::And, &data));
        assert!(!eval_conditions(&[], CombineWith::Or, &data));
    }

    #[test]
    fn deserializes_from_handler_parameters() {
        let c: Condition = serde_json::from_value(json!({
            "field": "user.age",
            "operator": "gte",
            "value": 18
        }))
        .unwrap();
        assert!(eval_condition(&c, &json!({"user": {"age": 21}})));
    }
}
