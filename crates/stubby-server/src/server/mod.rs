//! Stubs listener.
//!
//! Every incoming request is normalized into an [`ObservedRequest`], resolved
//! against the repository and answered with the resolved status, headers and
//! body. Configured latency is awaited here, after resolution, so no
//! repository lock is held while sleeping.

use crate::stubs::{ObservedRequest, ResolvedResponse, StubRepository};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub struct StubsServer {
    addr: SocketAddr,
    repository: Arc<StubRepository>,
}

impl StubsServer {
    pub fn new(addr: SocketAddr, repository: Arc<StubRepository>) -> Self {
        Self { addr, repository }
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Stubs portal listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let repository = Arc::clone(&self.repository);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let repository = Arc::clone(&repository);
                    async move { handle_stub_request(req, repository).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Stubs connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_stub_request(
    req: Request<Incoming>,
    repository: Arc<StubRepository>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let observed = observe(&parts, body);

    let resolved = repository.resolve(&observed);
    debug!(
        outcome = ?resolved.outcome,
        status = resolved.status,
        "{} {}",
        observed.method,
        observed.path
    );

    if let Some(latency) = resolved.latency {
        tokio::time::sleep(latency).await;
    }
    Ok(render(resolved))
}

/// Normalize the request head and collected body.
pub fn observe(parts: &Parts, body: Bytes) -> ObservedRequest {
    let mut observed = ObservedRequest::new(parts.method.as_str(), parts.uri.path())
        .with_query_string(parts.uri.query())
        .with_body(body);

    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => observed = observed.with_header(name.as_str(), value),
            Err(_) => debug!("Skipping non-ASCII header {}", name),
        }
    }
    observed
}

/// Turn a resolved response into a hyper response.
pub fn render(resolved: ResolvedResponse) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(resolved.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, value) in &resolved.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Full::new(resolved.body)).unwrap_or_else(|e| {
        debug!("Invalid stubbed response head: {}", e);
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}
