//! Outcome classification for a matched (or unmatched) request.
//!
//! Priority is fixed: no match, then authorization, then redirect, then the
//! configured response. The selected sequence element is consumed before the
//! authorization check, so a rejected request still advances the cursor.

use super::types::{
    ObservedRequest, StubHttpLifecycle, StubResponse, AUTHORIZATION_HEADER, CORRELATION_ID_HEADER,
    RESOURCE_ID_HEADER,
};
use crate::predicate::CaptureGroups;
use crate::recording::RequestRecorder;
use crate::template;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Redirect statuses passed through unchanged. Anything else becomes 302.
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Default,
    NotFound,
    Unauthorized,
    Redirect,
}

/// Everything the transport needs to answer a request.
#[derive(Debug, Clone)]
pub struct ResolvedResponse {
    pub outcome: ResponseOutcome,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Delay to apply before sending; awaited by the caller
    pub latency: Option<Duration>,
    pub lifecycle_index: Option<usize>,
    pub correlation_id: Option<String>,
}

impl ResolvedResponse {
    fn new(outcome: ResponseOutcome, status: u16) -> Self {
        Self {
            outcome,
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            latency: None,
            lifecycle_index: None,
            correlation_id: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Build the response for `observed`, given the lifecycle it matched.
pub fn resolve_outcome(
    observed: &ObservedRequest,
    matched: Option<(&StubHttpLifecycle, &CaptureGroups)>,
    recorder: &RequestRecorder,
) -> ResolvedResponse {
    let Some((lifecycle, captures)) = matched else {
        debug!("No stub matched {} {}", observed.method, observed.path);
        return not_found(observed);
    };

    let Some(response) = lifecycle.next_response() else {
        // Sequences are validated non-empty when loaded
        return not_found(observed);
    };

    if let Some(expected) = lifecycle.expected_authorization() {
        match observed.header(AUTHORIZATION_HEADER) {
            Some(actual) if actual == expected => {}
            actual => return unauthorized(actual),
        }
    }

    if let Some(location) = response.location() {
        return redirect(lifecycle, response, location, captures);
    }

    stubbed(observed, lifecycle, response, captures, recorder)
}

fn not_found(observed: &ObservedRequest) -> ResolvedResponse {
    let headers: serde_json::Map<String, serde_json::Value> = observed
        .headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), json!(v)))
        .collect();
    let post = (!observed.body.is_empty()).then(|| observed.body_text().into_owned());

    let diagnostic = json!({
        "reason": format!(
            "(404) Nothing found for {} request at URI {}",
            observed.method.to_uppercase(),
            observed.path
        ),
        "method": observed.method.to_uppercase(),
        "url": observed.path,
        "query": observed.query,
        "headers": headers,
        "post": post,
    });

    let mut resolved = ResolvedResponse::new(ResponseOutcome::NotFound, 404);
    resolved
        .headers
        .push(("content-type".to_string(), "application/json".to_string()));
    resolved.body = Bytes::from(diagnostic.to_string());
    resolved
}

fn unauthorized(actual: Option<&str>) -> ResolvedResponse {
    let message = match actual {
        None => "You are not authorized to view this page without supplied 'Authorization' HTTP header"
            .to_string(),
        Some(actual) => {
            let mut message = format!("Unauthorized with supplied encoded credentials: '{actual}'");
            if let Some(decoded) = decode_basic(actual) {
                message.push_str(&format!(" which decodes to '{decoded}'"));
            }
            message
        }
    };
    debug!("Rejecting request: {}", message);

    let mut resolved = ResolvedResponse::new(ResponseOutcome::Unauthorized, 401);
    resolved
        .headers
        .push(("content-type".to_string(), "text/plain;charset=UTF-8".to_string()));
    resolved.body = Bytes::from(message);
    resolved
}

/// Decode the credentials of a `Basic` authorization value.
fn decode_basic(value: &str) -> Option<String> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let bytes = BASE64.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

fn redirect(
    lifecycle: &StubHttpLifecycle,
    response: &StubResponse,
    location: &str,
    captures: &CaptureGroups,
) -> ResolvedResponse {
    let status = if REDIRECT_STATUSES.contains(&response.status) {
        response.status
    } else {
        302
    };

    let mut resolved = ResolvedResponse::new(ResponseOutcome::Redirect, status);
    resolved.headers = vec![
        (
            "location".to_string(),
            template::render(location, captures).into_owned(),
        ),
        ("connection".to_string(), "close".to_string()),
    ];
    resolved.latency = response.latency.map(Duration::from_millis);
    resolved.lifecycle_index = Some(lifecycle.index);
    resolved
}

fn stubbed(
    observed: &ObservedRequest,
    lifecycle: &StubHttpLifecycle,
    response: &StubResponse,
    captures: &CaptureGroups,
    recorder: &RequestRecorder,
) -> ResolvedResponse {
    let raw = response.body_bytes();
    let body = match template::render_bytes(&raw, captures) {
        Some(rendered) => Bytes::from(rendered),
        None => raw,
    };

    let mut resolved = ResolvedResponse::new(ResponseOutcome::Default, response.status);
    resolved.headers = response
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), template::render(value, captures).into_owned()))
        .collect();
    resolved
        .headers
        .push((RESOURCE_ID_HEADER.to_string(), lifecycle.index.to_string()));

    if response.record {
        let correlation_id = recorder.record(lifecycle.index, observed);
        resolved
            .headers
            .push((CORRELATION_ID_HEADER.to_string(), correlation_id.clone()));
        resolved.correlation_id = Some(correlation_id);
    }

    resolved.body = body;
    resolved.latency = response.latency.map(Duration::from_millis);
    resolved.lifecycle_index = Some(lifecycle.index);
    resolved
}
