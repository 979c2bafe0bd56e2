use serde::Serialize;

/// Structured trace events emitted across all Arbor crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ResolutionStarted {
        correlation_id: u64,
        context_path: Vec<String>,
        key: String,
    },
    ResolutionFinished {
        correlation_id: u64,
        outcome: String,
        hops: u32,
        queries: u32,
    },
    SessionSpawned {
        session_key: String,
        owner: String,
    },
    SessionRegistered {
        session_key: String,
        owner: String,
    },
    SessionSuperseded {
        session_key: String,
        stale_owner: String,
        current_owner: String,
    },
    SessionEvicted {
        session_key: String,
        owner: String,
        reason: String,
    },
    StoreFailure {
        operation: String,
        key: String,
        error: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ar_event");
    }
}
