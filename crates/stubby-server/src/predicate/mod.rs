//! Value matchers used by the lifecycle matcher.
//!
//! Every expected value is compiled once, when a stub is built, and evaluated
//! many times against observed request values.
//!
//! # Module Structure
//!
//! - `pattern_cache` - Process-wide cache of anchored, compiled regexes
//! - `string_matcher` - Literal/regex matching with capture-group extraction
//! - `field_matcher` - Subset matching for headers and query parameters
//! - `json_pattern` - Structural JSON-pattern matching for request bodies

mod field_matcher;
mod json_pattern;
mod pattern_cache;
mod string_matcher;

use thiserror::Error;

pub use field_matcher::{
    compile_header_matcher, compile_query_matcher, parse_query_string, subset_matches,
    CompiledFieldMatcher,
};
pub use json_pattern::{decimal_eq, JsonPattern};
pub use pattern_cache::PatternCache;
pub use string_matcher::{CaptureGroups, CompiledStringMatcher};

/// Errors raised while compiling an expected value.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid JSON pattern: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
