//! Capture-group substitution into response bodies and headers.
//!
//! Tokens have the form `<% source.group %>` and refer to groups captured while
//! matching the request:
//!
//! - `<% url.1 %>` - first group of the URL regex
//! - `<% query.page.0 %>` - whole value of the `page` query parameter
//! - `<% headers.x-id.1 %>` - first group of the `x-id` header regex
//! - `<% post.name %>` - named group `name` of the body regex
//!
//! Tokens with no captured value are left in place.

use crate::predicate::CaptureGroups;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<%\s*([A-Za-z0-9_.\-]+)\s*%>").expect("token regex is valid")
});

/// Whether `text` contains at least one token.
pub fn has_template_tokens(text: &str) -> bool {
    TOKEN_REGEX.is_match(text)
}

/// Replace every known token in `text`.
pub fn render<'a>(text: &'a str, groups: &CaptureGroups) -> Cow<'a, str> {
    if groups.is_empty() {
        return Cow::Borrowed(text);
    }
    TOKEN_REGEX.replace_all(text, |caps: &Captures| match groups.get(&caps[1]) {
        Some(value) => value.clone(),
        None => caps[0].to_string(),
    })
}

/// Render a possibly non-UTF-8 body. Binary bodies are returned untouched.
pub fn render_bytes(body: &[u8], groups: &CaptureGroups) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    if !has_template_tokens(text) {
        return None;
    }
    Some(render(text, groups).into_owned())
}
