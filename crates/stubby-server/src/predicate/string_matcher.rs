//! Literal and regex matching of a single expected value.

use super::pattern_cache::PatternCache;
use super::PatternError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Capture groups collected while matching, keyed as `<source>.<group>`
/// (for example `url.1`, `query.page.0`, `headers.x-id.name`, `post.2`).
pub type CaptureGroups = BTreeMap<String, String>;

/// An expected value compiled for repeated evaluation.
///
/// Values without regex metacharacters are compared literally. Any other value
/// must be a valid regex; it matches when the observed value equals it
/// literally or the anchored regex matches the whole observed value.
#[derive(Debug, Clone)]
pub enum CompiledStringMatcher {
    Literal(String),
    Pattern { source: String, regex: Arc<Regex> },
}

impl CompiledStringMatcher {
    pub fn compile(value: &str) -> Result<Self, PatternError> {
        if regex::escape(value) == value {
            return Ok(CompiledStringMatcher::Literal(value.to_string()));
        }
        Ok(CompiledStringMatcher::Pattern {
            source: value.to_string(),
            regex: PatternCache::global().compile(value)?,
        })
    }

    /// The configured text this matcher was compiled from.
    pub fn source(&self) -> &str {
        match self {
            CompiledStringMatcher::Literal(value) => value,
            CompiledStringMatcher::Pattern { source, .. } => source,
        }
    }

    pub fn is_match(&self, observed: &str) -> bool {
        match self {
            CompiledStringMatcher::Literal(value) => value == observed,
            CompiledStringMatcher::Pattern { source, regex } => {
                source == observed || regex.is_match(observed)
            }
        }
    }

    /// Match and record capture groups under `prefix`.
    ///
    /// Groups are only written when the value matches.
    pub fn capture(&self, observed: &str, prefix: &str, groups: &mut CaptureGroups) -> bool {
        if let CompiledStringMatcher::Pattern { regex, .. } = self {
            if let Some(caps) = regex.captures(observed) {
                for (idx, group) in caps.iter().enumerate() {
                    if let Some(group) = group {
                        groups.insert(format!("{prefix}.{idx}"), group.as_str().to_string());
                    }
                }
                for name in regex.capture_names().flatten() {
                    if let Some(group) = caps.name(name) {
                        groups.insert(format!("{prefix}.{name}"), group.as_str().to_string());
                    }
                }
                return true;
            }
        }

        if self.source() == observed {
            groups.insert(format!("{prefix}.0"), observed.to_string());
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match_is_case_sensitive() {
        let matcher = CompiledStringMatcher::compile("/invoice/123").unwrap();

        assert!(matcher.is_match("/invoice/123"));
        assert!(!matcher.is_match("/INVOICE/123"));
        assert!(!matcher.is_match("/invoice/1234"));
    }

    #[test]
    fn test_regex_requires_full_match() {
        let matcher = CompiledStringMatcher::compile(r"/invoice/\d{3}").unwrap();

        assert!(matcher.is_match("/invoice/123"));
        assert!(!matcher.is_match("/invoice/1234"));
        assert!(!matcher.is_match("x/invoice/123"));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = CompiledStringMatcher::compile(r#"{"ids": (1, 2}"#).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_plain_text_compiles_to_literal() {
        let matcher = CompiledStringMatcher::compile("/invoice/123").unwrap();
        assert!(matches!(matcher, CompiledStringMatcher::Literal(_)));
    }

    #[test]
    fn test_literal_equality_wins_over_regex_metacharacters() {
        let matcher = CompiledStringMatcher::compile("/path?x=1").unwrap();
        assert!(matcher.is_match("/path?x=1"));
    }

    #[test]
    fn test_capture_indexed_and_named_groups() {
        let matcher =
            CompiledStringMatcher::compile(r"^/account/(\d+)/(?P<section>[a-z]+)$").unwrap();
        let mut groups = CaptureGroups::new();

        assert!(matcher.capture("/account/42/orders", "url", &mut groups));
        assert_eq!(groups.get("url.0").unwrap(), "/account/42/orders");
        assert_eq!(groups.get("url.1").unwrap(), "42");
        assert_eq!(groups.get("url.2").unwrap(), "orders");
        assert_eq!(groups.get("url.section").unwrap(), "orders");
    }

    #[test]
    fn test_capture_leaves_groups_untouched_on_mismatch() {
        let matcher = CompiledStringMatcher::compile(r"^/account/(\d+)$").unwrap();
        let mut groups = CaptureGroups::new();

        assert!(!matcher.capture("/account/abc", "url", &mut groups));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_literal_capture_records_whole_value() {
        let matcher = CompiledStringMatcher::compile("/orders").unwrap();
        let mut groups = CaptureGroups::new();

        assert!(matcher.capture("/orders", "url", &mut groups));
        assert_eq!(groups.get("url.0").unwrap(), "/orders");
        assert_eq!(groups.len(), 1);
    }
}
