use serde::Serialize;
use uuid::Uuid;

use crate::event::TerminationReason;
use crate::step::StepMetrics;

/// What a `Runnable::run` returns. The lifecycle wrapper around it decides
/// whether to emit `RUN_COMPLETED` or `RUN_FAILED` purely by inspecting
/// `termination_reason`/`error` — no exception to catch.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub response: String,
    pub run_id: Uuid,
    pub session_id: String,
    pub metrics: StepMetrics,
    pub termination_reason: TerminationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

/// A run-level error kind, carried as data rather than as a Rust `Error` —
/// see `error::Error`'s doc comment for why the split exists.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub kind: String,
    pub message: String,
}

impl RunOutput {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
