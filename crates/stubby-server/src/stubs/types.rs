//! Stub entities and the observed request they are matched against.

use super::cursor::SequenceCursor;
use crate::predicate::{
    compile_header_matcher, compile_query_matcher, parse_query_string, CompiledFieldMatcher,
    CompiledStringMatcher, JsonPattern, PatternError,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Header holding the expected credentials of a stub.
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Response header carrying the index of the lifecycle that produced it.
pub const RESOURCE_ID_HEADER: &str = "x-stubby-resource-id";
/// Response header carrying the id under which a request was recorded.
pub const CORRELATION_ID_HEADER: &str = "x-stubby-correlation-id";

// ============================================================================
// Observed side
// ============================================================================

/// A normalized incoming request, built by the transport for every call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservedRequest {
    pub method: String,
    /// Raw path without the query string
    pub path: String,
    /// Decoded query parameters (duplicate keys keep the last value)
    pub query: BTreeMap<String, String>,
    /// Headers in arrival order, names as received
    pub headers: Vec<(String, String)>,
    #[serde(serialize_with = "serialize_body")]
    pub body: Bytes,
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

impl ObservedRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query_string(mut self, raw: Option<&str>) -> Self {
        self.query.extend(parse_query_string(raw));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup. The last occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deterministic hash of method, path, query, headers and body.
    ///
    /// Header names are lowercased and sorted so that arrival order and case do
    /// not change the result.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.method.to_uppercase().hash(&mut hasher);
        self.path.hash(&mut hasher);
        self.query.hash(&mut hasher);

        let mut headers: Vec<(String, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.as_str()))
            .collect();
        headers.sort();
        headers.hash(&mut hasher);

        self.body.hash(&mut hasher);
        hasher.finish()
    }
}

// ============================================================================
// Configured request
// ============================================================================

/// How a stub constrains the request body.
#[derive(Debug, Clone)]
pub enum BodyMatcher {
    /// Literal or regex over the body text (`post` or `file`)
    Text(CompiledStringMatcher),
    /// Structural JSON pattern (`json`)
    Json(JsonPattern),
}

/// The request side of a lifecycle. Unset constraints never cause a mismatch.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub url: CompiledStringMatcher,
    /// Accepted methods, uppercased
    pub methods: Vec<String>,
    pub body: Option<BodyMatcher>,
    /// Header expectations, excluding `authorization`
    pub headers: Vec<CompiledFieldMatcher>,
    pub query: Vec<CompiledFieldMatcher>,
    /// Expected, already-encoded `authorization` header value
    pub authorization: Option<String>,
}

impl StubRequest {
    pub fn builder(url: impl Into<String>) -> StubRequestBuilder {
        StubRequestBuilder::new(url)
    }

    pub fn accepts_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Collects raw configured values and compiles them into a [`StubRequest`].
#[derive(Debug, Clone, Default)]
pub struct StubRequestBuilder {
    url: String,
    methods: Vec<String>,
    post: Option<String>,
    json: Option<String>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl StubRequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into().to_uppercase());
        self
    }

    /// Literal or regex body expectation.
    pub fn post(mut self, post: impl Into<String>) -> Self {
        self.post = Some(post.into());
        self
    }

    /// JSON-pattern body expectation. Takes precedence over `post`.
    pub fn json(mut self, pattern: impl Into<String>) -> Self {
        self.json = Some(pattern.into());
        self
    }

    /// Add a header expectation.
    ///
    /// `authorization-basic` (`user:password`, base64-encoded here),
    /// `authorization-bearer` and `authorization-custom` are shorthands for
    /// the `authorization` header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<StubRequest, PatternError> {
        let mut authorization = None;
        let mut headers = Vec::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            match name.to_lowercase().as_str() {
                AUTHORIZATION_HEADER | "authorization-custom" => {
                    authorization = Some(value.trim().to_string())
                }
                "authorization-basic" => {
                    authorization = Some(format!("Basic {}", BASE64.encode(value.trim())))
                }
                "authorization-bearer" => {
                    authorization = Some(format!("Bearer {}", value.trim()))
                }
                _ => headers.push(compile_header_matcher(name, value)?),
            }
        }

        let query = self
            .query
            .iter()
            .map(|(name, value)| compile_query_matcher(name, value))
            .collect::<Result<Vec<_>, _>>()?;

        let body = match (self.json, self.post) {
            (Some(pattern), _) => Some(BodyMatcher::Json(JsonPattern::parse(&pattern)?)),
            (None, Some(post)) => Some(BodyMatcher::Text(CompiledStringMatcher::compile(&post)?)),
            (None, None) => None,
        };

        let methods = if self.methods.is_empty() {
            vec!["GET".to_string()]
        } else {
            self.methods
        };

        Ok(StubRequest {
            url: CompiledStringMatcher::compile(&self.url)?,
            methods,
            body,
            headers,
            query,
            authorization,
        })
    }
}

// ============================================================================
// Configured response
// ============================================================================

/// One canned response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    /// Literal body, possibly containing `<% ... %>` tokens
    pub body: String,
    /// File-backed body, loaded at configuration time. Wins over `body`.
    pub file: Option<Bytes>,
    /// Headers in configured order; values may contain tokens
    pub headers: Vec<(String, String)>,
    /// Artificial delay in milliseconds
    pub latency: Option<u64>,
    /// Persist matching requests to the recorder
    pub record: bool,
}

impl Default for StubResponse {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            file: None,
            headers: Vec::new(),
            latency: None,
            record: false,
        }
    }
}

impl StubResponse {
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_file(mut self, bytes: impl Into<Bytes>) -> Self {
        self.file = Some(bytes.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_latency(mut self, millis: u64) -> Self {
        self.latency = Some(millis);
        self
    }

    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Raw body bytes before templating.
    pub fn body_bytes(&self) -> Bytes {
        match &self.file {
            Some(bytes) => bytes.clone(),
            None => Bytes::from(self.body.clone()),
        }
    }
}

/// A lifecycle answers with one response or walks through a sequence.
#[derive(Debug, Clone)]
pub enum StubResponses {
    Single(StubResponse),
    Sequence(Vec<StubResponse>),
}

impl StubResponses {
    pub fn len(&self) -> usize {
        match self {
            StubResponses::Single(_) => 1,
            StubResponses::Sequence(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<&StubResponse> {
        match self {
            StubResponses::Single(response) => (idx == 0).then_some(response),
            StubResponses::Sequence(items) => items.get(idx),
        }
    }
}

impl From<StubResponse> for StubResponses {
    fn from(response: StubResponse) -> Self {
        StubResponses::Single(response)
    }
}

impl From<Vec<StubResponse>> for StubResponses {
    fn from(responses: Vec<StubResponse>) -> Self {
        StubResponses::Sequence(responses)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Mutable per-lifecycle counters, shared between re-indexed copies.
#[derive(Debug, Default)]
struct LifecycleState {
    cursor: SequenceCursor,
    hits: AtomicU64,
}

/// A configured request paired with its response(s).
#[derive(Debug, Clone)]
pub struct StubHttpLifecycle {
    /// Position in the active list
    pub index: usize,
    pub request: StubRequest,
    pub responses: StubResponses,
    /// The configuration fragment this lifecycle was loaded from
    pub complete_yaml: String,
    pub description: Option<String>,
    pub uuid: Option<String>,
    state: Arc<LifecycleState>,
}

impl StubHttpLifecycle {
    pub fn new(request: StubRequest, responses: impl Into<StubResponses>) -> Self {
        Self {
            index: 0,
            request,
            responses: responses.into(),
            complete_yaml: String::new(),
            description: None,
            uuid: None,
            state: Arc::new(LifecycleState::default()),
        }
    }

    pub fn with_complete_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.complete_yaml = yaml.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// A copy at a new position that keeps the cursor and hit counter.
    pub fn reindexed(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    /// Pick the response for this match, advancing a sequence cursor.
    pub fn next_response(&self) -> Option<&StubResponse> {
        match &self.responses {
            StubResponses::Single(response) => Some(response),
            StubResponses::Sequence(items) => items.get(self.state.cursor.advance(items.len())),
        }
    }

    /// Position the next sequenced match will serve.
    pub fn sequence_position(&self) -> usize {
        self.state.cursor.position(self.responses.len())
    }

    pub fn hit_count(&self) -> u64 {
        self.state.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn record_hit(&self) {
        self.state.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Expected `authorization` value, if the stub demands one.
    pub fn expected_authorization(&self) -> Option<&str> {
        self.request.authorization.as_deref()
    }
}
