//! Subset matching for headers and query parameters.
//!
//! Every expected entry must be present in the observed map and satisfy its
//! literal/regex matcher. Observed entries without an expectation are ignored.

use super::string_matcher::{CaptureGroups, CompiledStringMatcher};
use super::PatternError;
use std::collections::BTreeMap;

/// One compiled `name: value` expectation.
#[derive(Debug, Clone)]
pub struct CompiledFieldMatcher {
    /// Field name (lowercased for headers)
    pub name: String,
    pub matcher: CompiledStringMatcher,
}

impl CompiledFieldMatcher {
    /// # Arguments
    /// * `lowercase_name` - Whether to lowercase the field name (true for headers)
    pub fn compile(name: &str, value: &str, lowercase_name: bool) -> Result<Self, PatternError> {
        let name = if lowercase_name {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        Ok(Self {
            name,
            matcher: CompiledStringMatcher::compile(value)?,
        })
    }

    /// Match an observed value, recording groups as `<source>.<name>.<group>`.
    pub fn matches(&self, observed: Option<&str>, source: &str, groups: &mut CaptureGroups) -> bool {
        match observed {
            Some(value) => {
                let prefix = format!("{source}.{}", self.name);
                self.matcher.capture(value, &prefix, groups)
            }
            None => false,
        }
    }
}

/// Compile a header matcher (lowercases the header name).
pub fn compile_header_matcher(name: &str, value: &str) -> Result<CompiledFieldMatcher, PatternError> {
    CompiledFieldMatcher::compile(name, value, true)
}

/// Compile a query matcher (preserves the parameter name).
pub fn compile_query_matcher(name: &str, value: &str) -> Result<CompiledFieldMatcher, PatternError> {
    CompiledFieldMatcher::compile(name, value, false)
}

/// Check every expectation against values produced by `lookup`.
pub fn subset_matches<'a, F>(
    expected: &[CompiledFieldMatcher],
    source: &str,
    lookup: F,
    groups: &mut CaptureGroups,
) -> bool
where
    F: Fn(&str) -> Option<&'a str>,
{
    expected
        .iter()
        .all(|field| field.matches(lookup(&field.name), source, groups))
}

/// Parse a raw query string, URL-decoding keys and values. Duplicate keys keep
/// the last value.
pub fn parse_query_string(query: Option<&str>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(decode(key), decode(value));
            } else if !pair.is_empty() {
                params.insert(decode(pair), String::new());
            }
        }
    }
    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in<'m>(map: &'m HashMap<String, String>) -> impl Fn(&str) -> Option<&'m str> + 'm {
        move |name| map.get(name).map(|v| v.as_str())
    }

    #[test]
    fn test_header_matcher_lowercases_name() {
        let compiled = compile_header_matcher("X-Api-Key", "secret").unwrap();
        let mut groups = CaptureGroups::new();

        assert_eq!(compiled.name, "x-api-key");
        assert!(compiled.matches(Some("secret"), "headers", &mut groups));
        assert!(!compiled.matches(Some("other"), "headers", &mut groups));
        assert!(!compiled.matches(None, "headers", &mut groups));
    }

    #[test]
    fn test_query_matcher_preserves_name() {
        let compiled = compile_query_matcher("Page", "1").unwrap();
        assert_eq!(compiled.name, "Page");
    }

    #[test]
    fn test_subset_ignores_extra_observed_entries() {
        let expected = vec![compile_query_matcher("status", "active").unwrap()];
        let observed: HashMap<String, String> = [
            ("status".to_string(), "active".to_string()),
            ("page".to_string(), "2".to_string()),
        ]
        .into_iter()
        .collect();

        let mut groups = CaptureGroups::new();
        assert!(subset_matches(&expected, "query", lookup_in(&observed), &mut groups));
    }

    #[test]
    fn test_subset_requires_every_expected_entry() {
        let expected = vec![
            compile_query_matcher("status", "active").unwrap(),
            compile_query_matcher("type", "full").unwrap(),
        ];
        let observed: HashMap<String, String> = [("status".to_string(), "active".to_string())]
            .into_iter()
            .collect();

        let mut groups = CaptureGroups::new();
        assert!(!subset_matches(&expected, "query", lookup_in(&observed), &mut groups));
    }

    #[test]
    fn test_empty_expectation_always_matches() {
        let observed = HashMap::new();
        let mut groups = CaptureGroups::new();
        assert!(subset_matches(&[], "headers", lookup_in(&observed), &mut groups));
    }

    #[test]
    fn test_regex_value_captures_under_field_prefix() {
        let expected = vec![compile_query_matcher("id", r"(\d+)-(\w+)").unwrap()];
        let observed: HashMap<String, String> = [("id".to_string(), "12-abc".to_string())]
            .into_iter()
            .collect();

        let mut groups = CaptureGroups::new();
        assert!(subset_matches(&expected, "query", lookup_in(&observed), &mut groups));
        assert_eq!(groups.get("query.id.1").unwrap(), "12");
        assert_eq!(groups.get("query.id.2").unwrap(), "abc");
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string(Some("a=1&b=hello%20world&flag&c=x+y&a=2"));

        assert_eq!(params.get("a").unwrap(), "2");
        assert_eq!(params.get("b").unwrap(), "hello world");
        assert_eq!(params.get("c").unwrap(), "x y");
        assert_eq!(params.get("flag").unwrap(), "");
        assert!(parse_query_string(None).is_empty());
    }
}
