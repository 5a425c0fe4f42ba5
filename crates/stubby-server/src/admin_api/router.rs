//! Route dispatch for the admin API.

use super::handlers::{self, StubId};
use super::types::{collect_body, error_response, method_not_allowed, not_found};
use super::AdminState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Parsed admin route
#[derive(Debug, PartialEq, Eq)]
enum AdminRoute {
    /// GET/POST/DELETE /
    Root,
    /// GET /status
    Status,
    /// POST /refresh
    Refresh,
    /// GET/DELETE /recorded
    Recorded,
    /// GET /recorded/:correlation_id
    RecordedById(String),
    /// GET/PUT/DELETE /:index or /:uuid
    Stub(StubId),
}

impl AdminRoute {
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Some(AdminRoute::Root),
            ["status"] => Some(AdminRoute::Status),
            ["refresh"] => Some(AdminRoute::Refresh),
            ["recorded"] => Some(AdminRoute::Recorded),
            ["recorded", id] => Some(AdminRoute::RecordedById(id.to_string())),
            [id] => Some(AdminRoute::Stub(StubId::parse(id))),
            _ => None,
        }
    }
}

/// `append=true` in the query string makes POST extend instead of replace.
fn wants_append(query: Option<&str>) -> bool {
    query
        .map(|q| q.split('&').any(|pair| pair == "append=true" || pair == "append"))
        .unwrap_or(false)
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return Ok(error_response(StatusCode::BAD_REQUEST, &e)),
    };
    Ok(route_by_path(&method, &path, query.as_deref(), body, &state))
}

/// Route based on method and path
pub fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let Some(route) = AdminRoute::parse(path) else {
        return not_found();
    };

    match (method, route) {
        (&Method::GET, AdminRoute::Root) => handlers::handle_dump(state),
        (&Method::POST, AdminRoute::Root) => {
            handlers::handle_create(state, &body, wants_append(query))
        }
        (&Method::DELETE, AdminRoute::Root) => handlers::handle_delete_all(state),

        (&Method::GET, AdminRoute::Status) => handlers::handle_status(state),
        (&Method::POST, AdminRoute::Refresh) => handlers::handle_refresh(state),

        (&Method::GET, AdminRoute::Recorded) => handlers::handle_recorded_list(state),
        (&Method::DELETE, AdminRoute::Recorded) => handlers::handle_recorded_clear(state),
        (&Method::GET, AdminRoute::RecordedById(id)) => handlers::handle_recorded_get(state, &id),

        (&Method::GET, AdminRoute::Stub(id)) => handlers::handle_get(state, &id),
        (&Method::PUT, AdminRoute::Stub(id)) => handlers::handle_update(state, &id, path, &body),
        (&Method::DELETE, AdminRoute::Stub(id)) => handlers::handle_delete(state, &id),

        _ => method_not_allowed(method, path),
    }
}
