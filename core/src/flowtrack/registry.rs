//! In-flight HTTP request metadata keyed by trace id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Request fields recorded by upstream request parsing and read back when
/// the matching response is decoded.
#[derive(Debug, Clone)]
pub struct HttpRequestRecord {
    pub url: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

/// Concurrent trace id to request map. Entries are immutable once installed
/// and are dropped when their flow is untracked.
#[derive(Default)]
pub struct TraceRegistry {
    requests: DashMap<String, HttpRequestRecord>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request in flight for `trace_id`.
    pub fn insert(&self, trace_id: impl Into<String>, record: HttpRequestRecord) {
        self.requests.insert(trace_id.into(), record);
    }

    /// Returns the request recorded for `trace_id`, if any.
    pub fn get(&self, trace_id: &str) -> Option<HttpRequestRecord> {
        self.requests.get(trace_id).map(|record| record.clone())
    }

    /// Drops the entry for `trace_id`.
    pub fn remove(&self, trace_id: &str) {
        self.requests.remove(trace_id);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let registry = TraceRegistry::new();
        registry.insert(
            "trace-1",
            HttpRequestRecord {
                url: "/v1/items".into(),
                method: "GET".into(),
                timestamp: Utc::now(),
            },
        );

        let record = registry.get("trace-1").unwrap();
        assert_eq!(record.method, "GET");
        assert!(registry.get("trace-2").is_none());

        registry.remove("trace-1");
        assert!(registry.is_empty());
    }
}
