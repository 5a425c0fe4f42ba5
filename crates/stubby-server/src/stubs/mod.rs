//! Stub entities, matching and the active stub repository.
//!
//! # Module Structure
//!
//! - `types` - Configured request/response/lifecycle and the observed request
//! - `cursor` - Lock-free cursor over sequenced responses
//! - `matcher` - First-match-wins lifecycle selection
//! - `resolver` - Outcome classification (not found, unauthorized, redirect, default)
//! - `repository` - Snapshot-swapping store with indexed CRUD
//! - `websocket` - WebSocket stub configuration

mod cursor;
mod matcher;
mod repository;
mod resolver;
mod types;
mod websocket;

#[cfg(test)]
mod tests;

pub use cursor::SequenceCursor;
pub use matcher::{find_match, LifecycleMatch};
pub use repository::{RepositoryError, RepositoryResult, ResourceStat, Snapshot, StubRepository};
pub use resolver::{resolve_outcome, ResolvedResponse, ResponseOutcome};
pub use types::{
    BodyMatcher, ObservedRequest, StubHttpLifecycle, StubRequest, StubRequestBuilder, StubResponse,
    StubResponses, AUTHORIZATION_HEADER, CORRELATION_ID_HEADER, RESOURCE_ID_HEADER,
};
pub use websocket::{
    MessageType, WebSocketClientRequest, WebSocketConfig, WebSocketOnMessage, WebSocketPolicy,
    WebSocketServerResponse,
};
