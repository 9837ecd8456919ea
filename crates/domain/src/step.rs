use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{Role, ToolCall};

/// Per-step measurements, attached once a step is finalized. Every field is
/// optional because a user step carries none of them and a tool step
/// carries only `tool_duration_ms`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepMetrics {
    pub wall_time_ms: Option<u64>,
    pub first_token_ms: Option<u64>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub tool_duration_ms: Option<u64>,
}

/// The canonical durable record of one message in a session: a user turn,
/// an assistant turn (optionally carrying tool calls), or a tool result.
///
/// Immutable after commit (I-2). `sequence` is assigned by the step
/// pipeline, never by the caller — constructors here leave it at `0` as a
/// placeholder (see `Step::assign_sequence`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub session_id: String,
    pub run_id: Uuid,
    pub sequence: u64,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StepMetrics>,
    pub created_at: DateTime<Utc>,
}

impl Step {
    pub fn user(session_id: impl Into<String>, run_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            run_id,
            sequence: 0,
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            metrics: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        session_id: impl Into<String>,
        run_id: Uuid,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        metrics: StepMetrics,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            run_id,
            sequence: 0,
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            name: None,
            metrics: Some(metrics),
            created_at: Utc::now(),
        }
    }

    pub fn tool_result(
        session_id: impl Into<String>,
        run_id: Uuid,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            run_id,
            sequence: 0,
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            metrics: Some(StepMetrics {
                tool_duration_ms: Some(duration_ms),
                ..Default::default()
            }),
            created_at: Utc::now(),
        }
    }

    pub fn assign_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool-call fragment as it accumulates across streamed chunks, keyed by
/// its position in the provider's tool-call array rather than by id — the
/// id itself may not arrive until a later fragment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCallFragmentDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments_fragment: Option<String>,
}

/// An ephemeral, advisory streaming update. Never persisted, never
/// reconstructible from the step store alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragmentDelta>,
}
