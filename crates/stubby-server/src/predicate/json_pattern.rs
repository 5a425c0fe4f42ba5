//! Structural JSON-pattern matching for request bodies.
//!
//! Rules:
//! - object: every pattern key must match the observed value under that key;
//!   extra observed keys are ignored. A `null` pattern value also accepts a
//!   missing key.
//! - array: pattern elements must match distinct observed elements in the same
//!   order. An empty pattern array matches any array.
//! - string: a regex against the string form of an observed scalar.
//! - number: exact decimal equality, never via floating point.
//! - boolean: exact equality.
//! - any other type combination is a mismatch.

use super::string_matcher::CompiledStringMatcher;
use super::PatternError;
use serde_json::{Number, Value};

/// A JSON pattern with every string leaf pre-compiled.
#[derive(Debug, Clone)]
pub struct JsonPattern {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Null,
    Bool(bool),
    Number(Number),
    Text(CompiledStringMatcher),
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
}

impl JsonPattern {
    /// Parse pattern text and compile it.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let value: Value = serde_json::from_str(text)?;
        Self::compile(&value)
    }

    pub fn compile(value: &Value) -> Result<Self, PatternError> {
        Ok(Self {
            root: Node::compile(value)?,
        })
    }

    /// Parse `body` and match it. A body that is not JSON never matches.
    pub fn matches_body(&self, body: &[u8]) -> bool {
        match serde_json::from_slice::<Value>(body) {
            Ok(observed) => self.matches(&observed),
            Err(_) => false,
        }
    }

    pub fn matches(&self, observed: &Value) -> bool {
        self.root.matches(observed)
    }
}

impl Node {
    fn compile(value: &Value) -> Result<Self, PatternError> {
        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::Text(CompiledStringMatcher::compile(s)?),
            Value::Array(items) => Node::Array(
                items
                    .iter()
                    .map(Node::compile)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(map) => Node::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Node::compile(v)?)))
                    .collect::<Result<Vec<_>, PatternError>>()?,
            ),
        })
    }

    fn matches(&self, observed: &Value) -> bool {
        match (self, observed) {
            (Node::Null, Value::Null) => true,
            (Node::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Node::Number(expected), Value::Number(actual)) => {
                decimal_eq(&expected.to_string(), &actual.to_string())
            }
            (Node::Text(matcher), Value::String(s)) => matcher.is_match(s),
            (Node::Text(matcher), Value::Bool(b)) => matcher.is_match(if *b { "true" } else { "false" }),
            (Node::Text(matcher), Value::Number(n)) => matcher.is_match(&n.to_string()),
            (Node::Text(matcher), Value::Null) => matcher.is_match("null"),
            (Node::Array(pattern), Value::Array(items)) => array_matches(pattern, items),
            (Node::Object(pattern), Value::Object(map)) => {
                pattern.iter().all(|(key, node)| match map.get(key) {
                    Some(value) => node.matches(value),
                    None => matches!(node, Node::Null),
                })
            }
            _ => false,
        }
    }
}

/// In-order subsequence match. Taking the earliest matching observed element
/// for each pattern element is optimal for subsequence search.
fn array_matches(pattern: &[Node], items: &[Value]) -> bool {
    let mut remaining = items.iter();
    pattern
        .iter()
        .all(|node| remaining.by_ref().any(|item| node.matches(item)))
}

/// Compare two JSON number literals as exact decimals, so `1.50 == 1.5`,
/// `1e2 == 100` and integers beyond 2^53 keep every digit.
pub fn decimal_eq(a: &str, b: &str) -> bool {
    match (canonical_decimal(a), canonical_decimal(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Normalise to (negative, significant digits, scale) where the value is
/// `0.<digits> * 10^scale`. Zero is `(false, "", 0)`.
fn canonical_decimal(text: &str) -> Option<(bool, String, i64)> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (mantissa, exponent) = match rest.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&rest[..pos], rest[pos + 1..].parse::<i64>().ok()?),
        None => (rest, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part
        .chars()
        .chain(frac_part.chars())
        .all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let without_leading = digits.trim_start_matches('0');
    let leading_zeros = (digits.len() - without_leading.len()) as i64;
    let significant = without_leading.trim_end_matches('0');
    if significant.is_empty() {
        return Some((false, String::new(), 0));
    }

    let scale = i64::try_from(int_part.len())
        .ok()?
        .checked_sub(leading_zeros)?
        .checked_add(exponent)?;
    Some((negative, significant.to_string(), scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pattern(value: Value) -> JsonPattern {
        JsonPattern::compile(&value).unwrap()
    }

    #[test]
    fn test_empty_object_matches_any_object() {
        let p = pattern(json!({}));
        assert!(p.matches(&json!({})));
        assert!(p.matches(&json!({"a": 1, "b": [1, 2]})));
        assert!(!p.matches(&json!([])));
    }

    #[test]
    fn test_empty_array_matches_any_array() {
        let p = pattern(json!([]));
        assert!(p.matches(&json!([])));
        assert!(p.matches(&json!([1, "x", {"a": null}])));
        assert!(!p.matches(&json!({})));
    }

    #[test]
    fn test_object_subset_semantics() {
        let p = pattern(json!({"name": "bob", "age": 42}));
        assert!(p.matches(&json!({"name": "bob", "age": 42, "city": "x"})));
        assert!(!p.matches(&json!({"name": "bob"})));
        assert!(!p.matches(&json!({"name": "alice", "age": 42})));
    }

    #[test]
    fn test_null_pattern_accepts_null_or_missing_key() {
        let p = pattern(json!({"deleted": null}));
        assert!(p.matches(&json!({})));
        assert!(p.matches(&json!({"deleted": null})));
        assert!(!p.matches(&json!({"deleted": false})));
    }

    #[test]
    fn test_array_ordered_subsequence_without_reuse() {
        let p = pattern(json!(["a", "b"]));
        assert!(p.matches(&json!(["x", "a", "y", "b"])));
        assert!(!p.matches(&json!(["b", "a"])));

        let twice = pattern(json!(["a", "a"]));
        assert!(!twice.matches(&json!(["a"])));
        assert!(twice.matches(&json!(["a", "z", "a"])));
    }

    #[test]
    fn test_string_pattern_is_regex_over_scalar_form() {
        assert!(pattern(json!({"flag": "true"})).matches(&json!({"flag": true})));
        assert!(pattern(json!({"id": "\\d+"})).matches(&json!({"id": 12345})));
        assert!(pattern(json!({"any": ".*"})).matches(&json!({"any": null})));
        assert!(!pattern(json!({"any": ".*"})).matches(&json!({"any": {"nested": 1}})));
    }

    #[test]
    fn test_booleans_exact() {
        assert!(pattern(json!(true)).matches(&json!(true)));
        assert!(!pattern(json!(true)).matches(&json!(false)));
        assert!(!pattern(json!(true)).matches(&json!("true")));
    }

    #[test]
    fn test_numbers_exact_decimal() {
        let big = JsonPattern::parse(r#"{"id": 12345678901234567890123}"#).unwrap();
        assert!(big.matches_body(br#"{"id": 12345678901234567890123}"#));
        assert!(!big.matches_body(br#"{"id": 12345678901234567890124}"#));

        let precise = JsonPattern::parse(r#"{"amount": 0.1000000000000000055511151231257827}"#).unwrap();
        assert!(!precise.matches_body(br#"{"amount": 0.1}"#));
    }

    #[test]
    fn test_type_mismatch_fails() {
        assert!(!pattern(json!({"a": {"b": 1}})).matches(&json!({"a": [1]})));
        assert!(!pattern(json!([1])).matches(&json!({"0": 1})));
        assert!(!pattern(json!(1)).matches(&json!("1")));
    }

    #[test]
    fn test_unparsable_body_never_matches() {
        let p = pattern(json!({}));
        assert!(!p.matches_body(b"not json"));
    }

    #[test]
    fn test_invalid_pattern_text_is_an_error() {
        assert!(matches!(
            JsonPattern::parse("{oops"),
            Err(PatternError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_decimal_eq() {
        assert!(decimal_eq("1.50", "1.5"));
        assert!(decimal_eq("1e2", "100"));
        assert!(decimal_eq("0.015", "1.5e-2"));
        assert!(decimal_eq("0", "-0.0"));
        assert!(!decimal_eq("-1", "1"));
        assert!(!decimal_eq("10", "1"));
        assert!(!decimal_eq("1e9223372036854775807", "1"));
        assert!(decimal_eq("1e9223372036854775807", "1e9223372036854775807"));
    }

    #[test]
    fn test_huge_exponent_does_not_overflow() {
        let p = JsonPattern::parse(r#"{"amount": 1}"#).unwrap();
        assert!(!p.matches_body(br#"{"amount": 1e9223372036854775807}"#));
        assert!(!p.matches_body(br#"{"amount": 10.5e9223372036854775807}"#));
        assert!(p.matches_body(br#"{"amount": 1.0}"#));
    }
}
