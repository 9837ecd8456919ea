//! Adapts a `Runnable` into a `Tool` so one agent can call another as a
//! nested tool call. Guards against unbounded nesting depth and against
//! cycles in the call stack before ever invoking the inner agent.

use std::sync::Arc;
use std::time::Instant;

use agentcore_domain::{
    AbortSignal, ExecutionContext, NestingType, Result, RunnableType, Tool, ToolResult,
};
use async_trait::async_trait;
use uuid::Uuid;

use super::lifecycle::run_lifecycle;
use super::runnable::Runnable;

pub struct AgentTool {
    inner: Arc<dyn Runnable>,
    inner_id: String,
    name: String,
    description: String,
    parameters_schema: serde_json::Value,
    max_depth: u32,
}

impl AgentTool {
    pub fn new(
        inner: Arc<dyn Runnable>,
        inner_id: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        max_depth: u32,
    ) -> Self {
        let inner_id = inner_id.into();
        Self {
            inner,
            name: inner_id.clone(),
            description: description.into(),
            parameters_schema,
            max_depth,
            inner_id,
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters_schema.clone()
    }

    async fn execute(
        &self,
        call_id: &str,
        args: serde_json::Value,
        ctx: &ExecutionContext,
        _abort: &AbortSignal,
    ) -> Result<ToolResult> {
        let started = Instant::now();

        if ctx.depth >= self.max_depth {
            return Ok(ToolResult::failure(
                call_id,
                &self.name,
                "max_depth_exceeded",
                format!("nesting would exceed the maximum depth of {}", self.max_depth),
                started.elapsed().as_millis() as u64,
            ));
        }

        if ctx.is_on_call_stack(&self.inner_id) {
            return Ok(ToolResult::failure(
                call_id,
                &self.name,
                "cycle_detected",
                format!("'{}' is already on the current call stack", self.inner_id),
                started.elapsed().as_millis() as u64,
            ));
        }

        let child_ctx = ctx.child(
            Uuid::new_v4(),
            self.inner_id.clone(),
            NestingType::ToolCall,
            RunnableType::Agent,
            Some(self.inner_id.clone()),
        );

        // Bracket the nested run with its own RUN_STARTED/RUN_COMPLETED (or
        // RUN_FAILED) on the shared wire, carrying parent_run_id/depth from
        // child_ctx -- run_lifecycle never closes the wire, so this is safe
        // to call from inside a still-running parent.
        let output = run_lifecycle(&*self.inner, args, child_ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(match output.error {
            Some(err) => ToolResult::failure(call_id, &self.name, err.kind, err.message, duration_ms),
            None => ToolResult::success(call_id, &self.name, output.response, duration_ms),
        })
    }
}
