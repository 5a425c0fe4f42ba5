//! Response bodies and helpers for the admin API.

use crate::cache::CacheMetrics;
use crate::stubs::ResourceStat;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";
pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Body of `GET /status`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub version: &'static str,
    pub stubs: usize,
    pub web_sockets: usize,
    pub scans: u64,
    pub recorded_requests: usize,
    pub cache_metrics: CacheMetrics,
    pub cache_hit_rate: f64,
    pub resource_stats: Vec<ResourceStat>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

pub fn yaml_response(yaml: String) -> Response<Full<Bytes>> {
    build_response_with_headers(StatusCode::OK, [("Content-Type", YAML_CONTENT_TYPE)], yaml)
}

/// Plain text confirmation, newline terminated.
pub fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    build_response_with_headers(
        status,
        [("Content-Type", TEXT_CONTENT_TYPE)],
        format!("{message}\n"),
    )
}

pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    build_response_with_headers(status, std::iter::empty::<(&str, &str)>(), body)
}

/// Build a response. Falls back to a bare 500 if a header is malformed.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn method_not_allowed(method: &hyper::Method, path: &str) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &format!("Method {method} is not allowed on URI {path}"),
    )
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_format() {
        let resp = error_response(StatusCode::BAD_REQUEST, "Test error");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = serde_json::from_str(&body_of(resp).await).unwrap();
        assert_eq!(body["errors"][0]["code"], "400");
        assert_eq!(body["errors"][0]["message"], "Test error");
    }

    #[test]
    fn test_json_response() {
        let body = serde_json::json!({"test": "value"});
        let resp = json_response(StatusCode::OK, &body);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_text_response_is_newline_terminated() {
        let resp = text_response(StatusCode::CREATED, "done");
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_of(resp).await, "done\n");
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let resp = build_response_with_headers(StatusCode::OK, [("bad header", "x")], "body");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_response() {
        let resp = not_found();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
