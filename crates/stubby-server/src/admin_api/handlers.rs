//! Admin endpoint handlers.

use super::types::{
    build_response, error_response, json_response, text_response, yaml_response, StatusReport,
};
use super::AdminState;
use crate::loader::LoadedConfig;
use crate::stubs::RepositoryError;
use crate::watcher;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::fmt;
use tracing::{info, warn};

/// A stub addressed by list position or by uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubId {
    Index(usize),
    Uuid(String),
}

impl StubId {
    /// Numeric segments address an index, anything else a uuid.
    pub fn parse(segment: &str) -> Self {
        match segment.parse() {
            Ok(index) => StubId::Index(index),
            Err(_) => StubId::Uuid(segment.to_string()),
        }
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubId::Index(index) => write!(f, "index#{index}"),
            StubId::Uuid(uuid) => write!(f, "uuid#{uuid}"),
        }
    }
}

fn repository_error(err: RepositoryError) -> Response<Full<Bytes>> {
    match err {
        RepositoryError::IndexNotFound(_) | RepositoryError::UuidNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, &err.to_string())
        }
        RepositoryError::Invalid(_) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

/// Parse a YAML payload, rejecting empty or non-UTF-8 bodies.
fn parse_payload(
    state: &AdminState,
    method: &str,
    path: &str,
    body: &Bytes,
) -> Result<LoadedConfig, Response<Full<Bytes>>> {
    let text = std::str::from_utf8(body).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "Payload is not valid UTF-8")
    })?;
    if text.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("{method} request on URI {path} was empty"),
        ));
    }
    state
        .loader()
        .load_str(text)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))
}

/// GET / - Every loaded fragment
pub fn handle_dump(state: &AdminState) -> Response<Full<Bytes>> {
    let snapshot = state.repository.snapshot();
    if snapshot.lifecycles.is_empty() && snapshot.web_sockets.is_empty() {
        return build_response(StatusCode::NO_CONTENT, Bytes::new());
    }
    yaml_response(state.repository.dump_complete_yaml())
}

/// GET /{index|uuid}
pub fn handle_get(state: &AdminState, id: &StubId) -> Response<Full<Bytes>> {
    let result = match id {
        StubId::Index(index) => state.repository.marshalled_text_by_index(*index),
        StubId::Uuid(uuid) => state.repository.marshalled_text_by_uuid(uuid),
    };
    match result {
        Ok(yaml) => yaml_response(yaml),
        Err(e) => repository_error(e),
    }
}

/// POST / - Replace (or with `append`, extend) the loaded stubs
pub fn handle_create(state: &AdminState, body: &Bytes, append: bool) -> Response<Full<Bytes>> {
    let loaded = match parse_payload(state, "POST", "/", body) {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };

    let result = if append {
        if !loaded.web_sockets.is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Web-socket configs cannot be appended, POST without append to replace them",
            );
        }
        state.repository.append(loaded.lifecycles)
    } else {
        state
            .repository
            .replace_all_with_web_sockets(loaded.lifecycles, loaded.web_sockets)
    };
    if let Err(e) = result {
        return repository_error(e);
    }

    let snapshot = state.repository.snapshot();
    let mut resp = text_response(StatusCode::CREATED, "Configuration created successfully");
    if let [only] = snapshot.lifecycles.as_slice() {
        if let Ok(location) = only.request.url.source().parse() {
            resp.headers_mut().insert(hyper::header::LOCATION, location);
        }
    }
    resp
}

/// PUT /{index|uuid} - Replace one stub with the single stub in the payload
pub fn handle_update(
    state: &AdminState,
    id: &StubId,
    path: &str,
    body: &Bytes,
) -> Response<Full<Bytes>> {
    let exists = match id {
        StubId::Index(index) => state.repository.exists_by_index(*index),
        StubId::Uuid(uuid) => state.repository.get_by_uuid(uuid).is_ok(),
    };
    if !exists {
        return error_response(
            StatusCode::NOT_FOUND,
            &format!("Stub request {id} does not exist, cannot update"),
        );
    }

    let mut loaded = match parse_payload(state, "PUT", path, body) {
        Ok(loaded) => loaded,
        Err(resp) => return resp,
    };
    let lifecycle = match loaded.lifecycles.pop() {
        Some(lifecycle) if loaded.lifecycles.is_empty() && loaded.web_sockets.is_empty() => {
            lifecycle
        }
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "PUT payload must contain exactly one stub",
            )
        }
    };
    let location = lifecycle.request.url.source().to_string();

    let result = match id {
        StubId::Index(index) => state.repository.update_by_index(*index, lifecycle),
        StubId::Uuid(uuid) => state.repository.update_by_uuid(uuid, lifecycle),
    };
    if let Err(e) = result {
        return repository_error(e);
    }

    info!("Stub request {} updated through admin portal", id);
    let mut resp = text_response(
        StatusCode::CREATED,
        &format!("Stub request {id} updated successfully"),
    );
    if let Ok(location) = location.parse() {
        resp.headers_mut().insert(hyper::header::LOCATION, location);
    }
    resp
}

/// DELETE /
pub fn handle_delete_all(state: &AdminState) -> Response<Full<Bytes>> {
    state.repository.delete_all();
    text_response(
        StatusCode::OK,
        "All in-memory YAML config was deleted successfully",
    )
}

/// DELETE /{index|uuid}
pub fn handle_delete(state: &AdminState, id: &StubId) -> Response<Full<Bytes>> {
    let result = match id {
        StubId::Index(index) => state.repository.delete_by_index(*index),
        StubId::Uuid(uuid) => state.repository.delete_by_uuid(uuid),
    };
    match result {
        Ok(_) => text_response(
            StatusCode::OK,
            &format!("Stub request {id} deleted successfully"),
        ),
        Err(e) => repository_error(e),
    }
}

/// GET /status
pub fn handle_status(state: &AdminState) -> Response<Full<Bytes>> {
    let snapshot = state.repository.snapshot();
    let cache_metrics = state.repository.cache_metrics();
    let report = StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        stubs: snapshot.lifecycles.len(),
        web_sockets: snapshot.web_sockets.len(),
        scans: state.repository.scans(),
        recorded_requests: state.repository.recorder().len(),
        cache_hit_rate: cache_metrics.hit_rate(),
        cache_metrics,
        resource_stats: state.repository.resource_stats(),
    };
    json_response(StatusCode::OK, &report)
}

/// POST /refresh - Reload the configured stubs file
pub fn handle_refresh(state: &AdminState) -> Response<Full<Bytes>> {
    let Some(path) = state.data_file.as_deref() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "No stubs file configured, nothing to refresh",
        );
    };
    match watcher::reload(&state.repository, path) {
        Ok(count) => text_response(
            StatusCode::OK,
            &format!("Reloaded {count} stubs from {}", path.display()),
        ),
        Err(e) => {
            warn!("Admin refresh failed: {:#}", e);
            error_response(StatusCode::BAD_REQUEST, &format!("{e:#}"))
        }
    }
}

/// GET /recorded
pub fn handle_recorded_list(state: &AdminState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &state.repository.recorder().get_all())
}

/// GET /recorded/{correlation id}
pub fn handle_recorded_get(state: &AdminState, correlation_id: &str) -> Response<Full<Bytes>> {
    match state.repository.recorder().get(correlation_id) {
        Some(recorded) => json_response(StatusCode::OK, &recorded),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("No request recorded under {correlation_id}"),
        ),
    }
}

/// DELETE /recorded
pub fn handle_recorded_clear(state: &AdminState) -> Response<Full<Bytes>> {
    state.repository.recorder().clear();
    text_response(StatusCode::OK, "Recorded requests cleared")
}
