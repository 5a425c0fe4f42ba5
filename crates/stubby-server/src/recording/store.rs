//! Bounded in-memory store of recorded requests.

use crate::stubs::ObservedRequest;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_RECORDER_CAPACITY: usize = 1000;

/// A request captured for later inspection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest {
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Index of the lifecycle that matched
    pub stub_index: usize,
    pub request: ObservedRequest,
}

/// Recording store. Oldest entries are dropped once `capacity` is reached.
pub struct RequestRecorder {
    capacity: usize,
    entries: RwLock<VecDeque<RecordedRequest>>,
}

impl Default for RequestRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RECORDER_CAPACITY)
    }
}

impl RequestRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Store `request` and return its correlation id.
    pub fn record(&self, stub_index: usize, request: &ObservedRequest) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        let entry = RecordedRequest {
            correlation_id: correlation_id.clone(),
            recorded_at: Utc::now(),
            stub_index,
            request: request.clone(),
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        debug!(
            "Recorded {} {} for stub {} as {}",
            request.method, request.path, stub_index, correlation_id
        );
        correlation_id
    }

    pub fn get(&self, correlation_id: &str) -> Option<RecordedRequest> {
        self.entries
            .read()
            .iter()
            .find(|e| e.correlation_id == correlation_id)
            .cloned()
    }

    /// All recorded requests, oldest first.
    pub fn get_all(&self) -> Vec<RecordedRequest> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let recorder = RequestRecorder::new(10);
        let request = ObservedRequest::new("POST", "/orders").with_body("{}");

        let id = recorder.record(2, &request);
        let recorded = recorder.get(&id).unwrap();

        assert_eq!(recorded.stub_index, 2);
        assert_eq!(recorded.request.path, "/orders");
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(recorder.get("unknown").is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let recorder = RequestRecorder::new(2);
        let first = recorder.record(0, &ObservedRequest::new("GET", "/1"));
        recorder.record(0, &ObservedRequest::new("GET", "/2"));
        recorder.record(0, &ObservedRequest::new("GET", "/3"));

        assert_eq!(recorder.len(), 2);
        assert!(recorder.get(&first).is_none());
        let paths: Vec<String> = recorder
            .get_all()
            .into_iter()
            .map(|r| r.request.path)
            .collect();
        assert_eq!(paths, vec!["/2", "/3"]);
    }

    #[test]
    fn test_clear() {
        let recorder = RequestRecorder::default();
        recorder.record(0, &ObservedRequest::new("GET", "/"));
        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_serializes_body_as_text() {
        let recorder = RequestRecorder::new(1);
        let id = recorder.record(0, &ObservedRequest::new("POST", "/").with_body("hello"));
        let json = serde_json::to_value(recorder.get(&id).unwrap()).unwrap();

        assert_eq!(json["request"]["body"], "hello");
        assert_eq!(json["correlationId"], id.as_str());
    }
}
