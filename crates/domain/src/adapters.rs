use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::cancel::AbortSignal;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::step::Step;
use crate::stream::{BoxStream, StreamEvent};
use crate::tool::{Message, ToolDefinition, ToolResult};

/// A streaming model backend. Adapters for specific providers live outside
/// this crate; the core only ever talks to this trait.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;
}

/// Something the model can call. `execute` may return `Err` for failures
/// the tool genuinely cannot express as data (e.g. its own I/O setup
/// failed); the tool executor turns that into a `tool_execution_error`
/// `ToolResult` rather than failing the run.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    /// Whether a call to this tool must be confirmed by a `PermissionManager`
    /// before it runs.
    fn requires_consent(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        call_id: &str,
        args: Value,
        ctx: &ExecutionContext,
        abort: &AbortSignal,
    ) -> Result<ToolResult>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The durable step store contract (§4.8). Implementations are best-effort:
/// a failure here must never fail a run, only degrade future retrieval.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_step(&self, step: Step) -> Result<()>;
    async fn get_steps(&self, session_id: &str, since_sequence: Option<u64>) -> Result<Vec<Step>>;
    async fn save_run(&self, session_id: &str, run_id: uuid::Uuid, data: Value) -> Result<()>;
    async fn delete_steps_from(&self, session_id: &str, sequence: u64) -> Result<()>;
    async fn copy_steps_until(&self, session_id: &str, sequence: u64, new_session_id: &str) -> Result<()>;

    /// Allocates and returns the next `sequence` for `session_id`. A session
    /// spans multiple runs, and possibly multiple independent executors
    /// sharing this same store (a nested agent invoked as a tool of
    /// another, both committing into the same session) — implementations
    /// must serialize callers against whatever history already exists for
    /// the session so the counter never restarts or collides. This is what
    /// makes the Step Pipeline's sequence allocation authoritative (I-3,
    /// P8) regardless of how many `StepPipeline`s end up calling it.
    async fn next_sequence(&self, session_id: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub from_cache: bool,
}

impl ConsentResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            from_cache: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            from_cache: false,
        }
    }
}

/// Consulted before a consent-requiring tool runs. May suspend pending a
/// human decision, bounded by `timeout`.
#[async_trait]
pub trait PermissionManager: Send + Sync {
    async fn check(
        &self,
        user_id: Option<&str>,
        tool_name: &str,
        args: &Value,
        ctx: &ExecutionContext,
        timeout: Duration,
    ) -> ConsentResult;
}

/// Always grants consent. A default for hosts and tests that don't gate
/// tool execution on human approval.
pub struct AlwaysAllow;

#[async_trait]
impl PermissionManager for AlwaysAllow {
    async fn check(
        &self,
        _user_id: Option<&str>,
        _tool_name: &str,
        _args: &Value,
        _ctx: &ExecutionContext,
        _timeout: Duration,
    ) -> ConsentResult {
        ConsentResult::allow()
    }
}
