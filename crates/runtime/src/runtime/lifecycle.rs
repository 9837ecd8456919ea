//! Wraps one `Runnable::run` invocation with the `RUN_STARTED` /
//! `RUN_COMPLETED` / `RUN_FAILED` bracket every run gets on the wire,
//! regardless of how it terminates.

use agentcore_domain::{ExecutionContext, RunOutput, StepEvent};

use super::runnable::Runnable;

/// Emits `RUN_STARTED`, invokes `runnable.run(input, ctx)`, then emits
/// exactly one of `RUN_COMPLETED` / `RUN_FAILED` based on the output's
/// `error` field, and returns the output unchanged.
///
/// Does not close the wire — the top-level `run_stream` driver owns that,
/// so a nested invocation (an agent called as a tool) can use this same
/// wrapper without terminating the shared channel.
pub async fn run_lifecycle(
    runnable: &dyn Runnable,
    input: serde_json::Value,
    ctx: ExecutionContext,
) -> RunOutput {
    let started = StepEvent::run_started(
        ctx.run_id,
        ctx.session_id.clone(),
        ctx.parent_run_id,
        ctx.nested_runnable_id.clone(),
        ctx.depth,
        input.clone(),
    );
    let _ = ctx.wire.write(started).await;

    let output = runnable.run(input, ctx.clone()).await;

    let event = if let Some(error) = &output.error {
        StepEvent::run_failed(
            ctx.run_id,
            ctx.session_id.clone(),
            ctx.parent_run_id,
            ctx.depth,
            error.kind.clone(),
            error.message.clone(),
        )
    } else {
        StepEvent::run_completed(
            ctx.run_id,
            ctx.session_id.clone(),
            ctx.parent_run_id,
            ctx.depth,
            serde_json::to_value(&output).unwrap_or(serde_json::Value::Null),
            output.termination_reason,
        )
    };
    let _ = ctx.wire.write(event).await;

    output
}
