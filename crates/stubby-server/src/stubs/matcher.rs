//! First-match-wins selection of a lifecycle for an observed request.

use super::types::{BodyMatcher, ObservedRequest, StubHttpLifecycle, StubRequest};
use crate::predicate::{subset_matches, CaptureGroups};
use std::sync::Arc;
use tracing::trace;

/// The selected lifecycle and the groups captured while matching it.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleMatch {
    pub index: usize,
    pub captures: CaptureGroups,
}

impl StubRequest {
    /// Evaluate every configured constraint against `observed`.
    ///
    /// Returns the capture groups on a full match. The `authorization` header is
    /// not considered here; it is checked once a lifecycle has been selected.
    pub fn matches(&self, observed: &ObservedRequest) -> Option<CaptureGroups> {
        let mut groups = CaptureGroups::new();

        if !self.url.capture(&observed.path, "url", &mut groups) {
            return None;
        }
        if !self.accepts_method(&observed.method) {
            return None;
        }
        if !subset_matches(
            &self.query,
            "query",
            |name| observed.query.get(name).map(|v| v.as_str()),
            &mut groups,
        ) {
            return None;
        }
        if !subset_matches(&self.headers, "headers", |name| observed.header(name), &mut groups) {
            return None;
        }
        if !self.body_matches(observed, &mut groups) {
            return None;
        }

        Some(groups)
    }

    fn body_matches(&self, observed: &ObservedRequest, groups: &mut CaptureGroups) -> bool {
        match &self.body {
            None => true,
            Some(BodyMatcher::Text(matcher)) => {
                if observed.body.is_empty() && !matcher.source().is_empty() {
                    return false;
                }
                matcher.capture(&observed.body_text(), "post", groups)
            }
            Some(BodyMatcher::Json(pattern)) => pattern.matches_body(&observed.body),
        }
    }
}

/// Scan `lifecycles` in order and return the first full match.
pub fn find_match(
    observed: &ObservedRequest,
    lifecycles: &[Arc<StubHttpLifecycle>],
) -> Option<LifecycleMatch> {
    lifecycles.iter().enumerate().find_map(|(index, lifecycle)| {
        let captures = lifecycle.request.matches(observed)?;
        trace!(
            "{} {} matched lifecycle {}",
            observed.method,
            observed.path,
            index
        );
        Some(LifecycleMatch { index, captures })
    })
}
