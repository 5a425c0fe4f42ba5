//! Side-channel capture of requests that hit a stub flagged with `record`.
//!
//! Recorded requests are kept in memory under a generated correlation id so
//! they can be inspected through the admin API. The store is bounded and never
//! blocks the response path for longer than a short write lock.

mod store;

pub use store::{RecordedRequest, RequestRecorder, DEFAULT_RECORDER_CAPACITY};
