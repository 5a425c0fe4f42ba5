//! Shared cache of compiled, anchored regular expressions.

use super::PatternError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

static PATTERNS: Lazy<PatternCache> = Lazy::new(PatternCache::new);

/// Concurrent map from raw pattern text to its compiled form.
///
/// Only successful compilations are cached.
pub struct PatternCache {
    patterns: RwLock<HashMap<String, Arc<Regex>>>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCache {
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static PatternCache {
        &PATTERNS
    }

    /// Compile `pattern` as a full-string match, or return the cached regex.
    ///
    /// Racing callers may both compile; the first insert wins.
    pub fn compile(&self, pattern: &str) -> Result<Arc<Regex>, PatternError> {
        if let Some(cached) = self.patterns.read().get(pattern) {
            return Ok(Arc::clone(cached));
        }

        let compiled = build_anchored(pattern).map_err(|source| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        trace!("Compiled pattern '{}'", pattern);

        let mut patterns = self.patterns.write();
        Ok(Arc::clone(
            patterns
                .entry(pattern.to_string())
                .or_insert_with(|| Arc::new(compiled)),
        ))
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }
}

fn build_anchored(pattern: &str) -> Result<Regex, regex::Error> {
    // Validate the raw text first: wrapping can turn an unbalanced pattern
    // such as "a)(b" into a valid one.
    configure(pattern).build()?;
    configure(&format!(r"\A(?:{pattern})\z")).build()
}

fn configure(pattern: &str) -> RegexBuilder {
    let mut builder = RegexBuilder::new(pattern);
    builder.multi_line(true).dot_matches_new_line(true);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_is_anchored() {
        let cache = PatternCache::new();
        let regex = cache.compile(r"/invoice/\d+").unwrap();

        assert!(regex.is_match("/invoice/123"));
        assert!(!regex.is_match("/api/invoice/123"));
        assert!(!regex.is_match("/invoice/123/items"));
    }

    #[test]
    fn test_anchoring_survives_multiline_input() {
        let cache = PatternCache::new();
        let regex = cache.compile("b").unwrap();

        assert!(!regex.is_match("a\nb"));
        let dotall = cache.compile("a.b").unwrap();
        assert!(dotall.is_match("a\nb"));
    }

    #[test]
    fn test_invalid_syntax_is_rejected() {
        let cache = PatternCache::new();
        assert!(matches!(
            cache.compile("(unclosed"),
            Err(PatternError::InvalidRegex { .. })
        ));
        assert!(cache.compile("a)(b").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compiled_once() {
        let cache = PatternCache::new();
        let first = cache.compile("^/a$").unwrap();
        let second = cache.compile("^/a$").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_population() {
        let cache = Arc::new(PatternCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.compile(r"/items/(\d+)").unwrap())
            })
            .collect();

        let compiled: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        for regex in &compiled {
            assert!(regex.is_match("/items/7"));
        }
    }
}
