use serde::Serialize;

/// Structured lifecycle events logged alongside (not instead of) the
/// StepEvent wire. These are the handful of things worth seeing in a log
/// aggregator even when nobody is attached to a run's event stream —
/// session resolution and persistence failures, chiefly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
    PersistenceFailed {
        session_id: String,
        operation: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "agentcore_event");
    }
}
