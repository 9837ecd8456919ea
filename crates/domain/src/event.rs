use serde::Serialize;
use uuid::Uuid;

use crate::step::{Step, StepDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    StepDelta,
    StepCompleted,
    RunCompleted,
    RunFailed,
    ToolAuthRequired,
    ToolAuthDenied,
}

/// Why a run stopped. `Completed`/`MaxSteps`/`MaxTokens`/`Cancelled` are
/// normal endings; only a run that never reaches one of these reasons
/// before an unrecoverable error surfaces as `RUN_FAILED` without a
/// termination reason at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    MaxSteps,
    MaxTokens,
    Cancelled,
    Error,
}

/// The envelope that flows on the Wire. `delta`/`step`/`data` are mutually
/// exclusive — exactly one is populated, chosen by `event_type`.
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub run_id: Uuid,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<StepDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_runnable_id: Option<String>,
    pub depth: u32,
}

impl StepEvent {
    #[allow(clippy::too_many_arguments)]
    fn base(
        event_type: EventType,
        run_id: Uuid,
        session_id: impl Into<String>,
        parent_run_id: Option<Uuid>,
        nested_runnable_id: Option<String>,
        depth: u32,
    ) -> Self {
        Self {
            event_type,
            run_id,
            session_id: session_id.into(),
            step_id: None,
            delta: None,
            step: None,
            data: None,
            parent_run_id,
            nested_runnable_id,
            depth,
        }
    }

    pub fn run_started(
        run_id: Uuid,
        session_id: impl Into<String>,
        parent_run_id: Option<Uuid>,
        nested_runnable_id: Option<String>,
        depth: u32,
        input: serde_json::Value,
    ) -> Self {
        let mut ev = Self::base(
            EventType::RunStarted,
            run_id,
            session_id,
            parent_run_id,
            nested_runnable_id,
            depth,
        );
        ev.data = Some(serde_json::json!({ "input": input }));
        ev
    }

    pub fn step_delta(
        run_id: Uuid,
        session_id: impl Into<String>,
        depth: u32,
        delta: StepDelta,
    ) -> Self {
        let mut ev = Self::base(EventType::StepDelta, run_id, session_id, None, None, depth);
        ev.delta = Some(delta);
        ev
    }

    pub fn step_completed(run_id: Uuid, session_id: impl Into<String>, depth: u32, step: Step) -> Self {
        let mut ev = Self::base(EventType::StepCompleted, run_id, session_id, None, None, depth);
        ev.step_id = Some(step.id);
        ev.step = Some(step);
        ev
    }

    pub fn run_completed(
        run_id: Uuid,
        session_id: impl Into<String>,
        parent_run_id: Option<Uuid>,
        depth: u32,
        output: serde_json::Value,
        reason: TerminationReason,
    ) -> Self {
        let mut ev = Self::base(
            EventType::RunCompleted,
            run_id,
            session_id,
            parent_run_id,
            None,
            depth,
        );
        ev.data = Some(serde_json::json!({ "output": output, "termination_reason": reason }));
        ev
    }

    pub fn run_failed(
        run_id: Uuid,
        session_id: impl Into<String>,
        parent_run_id: Option<Uuid>,
        depth: u32,
        error_kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut ev = Self::base(
            EventType::RunFailed,
            run_id,
            session_id,
            parent_run_id,
            None,
            depth,
        );
        ev.data = Some(serde_json::json!({
            "error": { "kind": error_kind.into(), "message": message.into() },
        }));
        ev
    }

    pub fn tool_auth_required(
        run_id: Uuid,
        session_id: impl Into<String>,
        depth: u32,
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
    ) -> Self {
        let mut ev = Self::base(
            EventType::ToolAuthRequired,
            run_id,
            session_id,
            None,
            None,
            depth,
        );
        ev.data = Some(serde_json::json!({ "tool_name": tool_name.into(), "call_id": call_id.into() }));
        ev
    }

    pub fn tool_auth_denied(
        run_id: Uuid,
        session_id: impl Into<String>,
        depth: u32,
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut ev = Self::base(
            EventType::ToolAuthDenied,
            run_id,
            session_id,
            None,
            None,
            depth,
        );
        ev.data = Some(serde_json::json!({
            "tool_name": tool_name.into(),
            "call_id": call_id.into(),
            "reason": reason.into(),
        }));
        ev
    }
}
