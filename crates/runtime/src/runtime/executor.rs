//! The LLM/tool loop: accumulates a streamed assistant turn, commits steps,
//! dispatches tool calls, and decides when and how a run terminates.

use std::sync::Arc;

use agentcore_domain::{
    AbortSignal, ContentPart, ExecutionContext, Message, MessageContent, ModelAdapter, PermissionManager, Role,
    RunError, RunOutput, SessionStore, Step, StepDelta, StepMetrics, StepEvent, TerminationReason, ToolCall,
    ToolCallFragmentDelta, Usage,
};
use futures_util::StreamExt;

use super::config::ExecutorConfig;
use super::step_pipeline::StepPipeline;
use super::tool_executor::ToolExecutor;
use super::tool_registry::ToolRegistry;

pub struct AgentExecutor {
    model: Arc<dyn ModelAdapter>,
    store: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    pipeline: StepPipeline,
    tool_executor: ToolExecutor,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(
        model: Arc<dyn ModelAdapter>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        config: ExecutorConfig,
    ) -> Self {
        let tool_executor = ToolExecutor::new(tools.clone(), config.max_concurrent_tools)
            .with_consent_timeout(config.consent_timeout);
        Self {
            model,
            pipeline: StepPipeline::new(store.clone()),
            store,
            tools,
            tool_executor,
            config,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionManager>) -> Self {
        self.tool_executor = self.tool_executor.with_permissions(permissions);
        self
    }

    /// Runs the loop to completion against the given context, replaying any
    /// prior session history before `input` and returning once the run
    /// terminates (normally, on a budget, on cancellation, or on an
    /// unrecoverable error).
    pub async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ExecutionContext,
        system_prompt: Option<&str>,
        abort: &AbortSignal,
    ) -> RunOutput {
        let history = self.store.get_steps(&ctx.session_id, None).await.unwrap_or_default();
        let mut messages = Vec::new();
        if let Some(sp) = system_prompt {
            messages.push(Message::system(sp));
        }
        for step in &history {
            messages.push(step_to_message(step));
        }

        let user_text = extract_text(&input);
        let user_step = Step::user(ctx.session_id.clone(), ctx.run_id, user_text.clone());
        self.pipeline.commit(&ctx.wire, ctx.run_id, ctx.depth, user_step).await;
        messages.push(Message::user(user_text));

        let mut total_usage = Usage::default();
        let tool_defs = self.tools.definitions();

        for step_index in 0..self.config.max_steps {
            if abort.is_cancelled() {
                return self.succeed(ctx, String::new(), TerminationReason::Cancelled, total_usage);
            }

            let stream = match self.model.stream(&messages, &tool_defs).await {
                Ok(s) => s,
                Err(e) => return self.fail(ctx, "provider_error", e.to_string()),
            };

            let (content, fragments, usage, stream_error, cancelled) = self.accumulate(stream, ctx, abort).await;
            if let Some(u) = usage {
                total_usage.add(&u);
            }
            if cancelled {
                return self.succeed(ctx, content, TerminationReason::Cancelled, total_usage);
            }
            if let Some(message) = stream_error {
                return self.fail(ctx, "provider_error", message);
            }

            let resolved_calls = match resolve_tool_calls(&fragments) {
                Ok(calls) => calls,
                Err(reason) => return self.fail(ctx, "malformed_tool_call", reason),
            };

            let assistant_step = Step::assistant(
                ctx.session_id.clone(),
                ctx.run_id,
                content.clone(),
                resolved_calls.clone(),
                StepMetrics {
                    total_tokens: Some(total_usage.total_tokens),
                    ..Default::default()
                },
            );
            self.pipeline.commit(&ctx.wire, ctx.run_id, ctx.depth, assistant_step).await;

            if resolved_calls.is_empty() {
                return self.succeed(ctx, content, TerminationReason::Completed, total_usage);
            }

            messages.push(assistant_message(&content, &resolved_calls));

            if let Some(max_tokens) = self.config.max_tokens {
                if total_usage.total_tokens >= max_tokens {
                    return self
                        .terminate_with_summary(ctx, messages, TerminationReason::MaxTokens, total_usage, abort)
                        .await;
                }
            }

            let results = self
                .tool_executor
                .dispatch_batch(
                    &resolved_calls,
                    ctx,
                    ctx.user_id.as_deref(),
                    abort,
                    &ctx.wire,
                    ctx.run_id,
                    ctx.depth,
                )
                .await;

            for result in &results {
                let tool_step = Step::tool_result(
                    ctx.session_id.clone(),
                    ctx.run_id,
                    &result.call_id,
                    &result.tool_name,
                    &result.content,
                    result.duration_ms,
                );
                self.pipeline.commit(&ctx.wire, ctx.run_id, ctx.depth, tool_step).await;
                messages.push(Message::tool_result(&result.call_id, &result.content));
            }

            if step_index + 1 == self.config.max_steps {
                return self
                    .terminate_with_summary(ctx, messages, TerminationReason::MaxSteps, total_usage, abort)
                    .await;
            }
        }

        self.succeed(ctx, String::new(), TerminationReason::MaxSteps, total_usage)
    }

    /// Drains one model stream, pushing `STEP_DELTA` events as chunks
    /// arrive and accumulating tool-call fragments by index — the only key
    /// stable across a provider's interleaved fragments. Checks `abort`
    /// after every chunk, not just at the top of the outer loop, so a
    /// cancellation lands mid-stream instead of waiting for the model to
    /// finish this turn.
    async fn accumulate(
        &self,
        mut stream: agentcore_domain::BoxStream<'static, agentcore_domain::Result<agentcore_domain::StreamEvent>>,
        ctx: &ExecutionContext,
        abort: &AbortSignal,
    ) -> (String, Vec<ToolCallFragmentDelta>, Option<Usage>, Option<String>, bool) {
        let mut content = String::new();
        let mut fragments: Vec<ToolCallFragmentDelta> = Vec::new();
        let mut usage = None;
        let mut error = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(agentcore_domain::StreamEvent::Token { text }) => {
                    content.push_str(&text);
                    let delta = StepDelta {
                        content: Some(text),
                        tool_calls: Vec::new(),
                    };
                    let _ = ctx
                        .wire
                        .write(StepEvent::step_delta(ctx.run_id, ctx.session_id.clone(), ctx.depth, delta))
                        .await;
                }
                Ok(agentcore_domain::StreamEvent::Thinking { .. }) => {}
                Ok(agentcore_domain::StreamEvent::ToolCallDelta {
                    index,
                    call_id,
                    tool_name,
                    arguments_delta,
                }) => {
                    while fragments.len() <= index as usize {
                        let next_index = fragments.len() as u32;
                        fragments.push(ToolCallFragmentDelta {
                            index: next_index,
                            ..Default::default()
                        });
                    }
                    let frag = &mut fragments[index as usize];
                    if let Some(id) = call_id {
                        frag.id = Some(id);
                    }
                    if let Some(name) = tool_name {
                        frag.name = Some(name);
                    }
                    if !arguments_delta.is_empty() {
                        let mut joined = frag.arguments_fragment.clone().unwrap_or_default();
                        joined.push_str(&arguments_delta);
                        frag.arguments_fragment = Some(joined);
                    }
                    let delta = StepDelta {
                        content: None,
                        tool_calls: vec![frag.clone()],
                    };
                    let _ = ctx
                        .wire
                        .write(StepEvent::step_delta(ctx.run_id, ctx.session_id.clone(), ctx.depth, delta))
                        .await;
                }
                Ok(agentcore_domain::StreamEvent::Done { usage: u, .. }) => usage = u,
                Ok(agentcore_domain::StreamEvent::Error { message }) => error = Some(message),
                Err(e) => error = Some(e.to_string()),
            }

            if abort.is_cancelled() {
                return (content, fragments, usage, error, true);
            }
        }

        (content, fragments, usage, error, false)
    }

    fn succeed(&self, ctx: &ExecutionContext, response: String, reason: TerminationReason, usage: Usage) -> RunOutput {
        RunOutput {
            response,
            run_id: ctx.run_id,
            session_id: ctx.session_id.clone(),
            metrics: StepMetrics {
                input_tokens: Some(usage.prompt_tokens),
                output_tokens: Some(usage.completion_tokens),
                total_tokens: Some(usage.total_tokens),
                ..Default::default()
            },
            termination_reason: reason,
            error: None,
        }
    }

    fn fail(&self, ctx: &ExecutionContext, kind: &str, message: String) -> RunOutput {
        RunOutput {
            response: String::new(),
            run_id: ctx.run_id,
            session_id: ctx.session_id.clone(),
            metrics: StepMetrics::default(),
            termination_reason: TerminationReason::Error,
            error: Some(RunError {
                kind: kind.to_string(),
                message,
            }),
        }
    }

    /// Gives a run that hit a budget one extra, non-tool-calling turn to
    /// summarize progress before terminating, if configured to do so.
    async fn terminate_with_summary(
        &self,
        ctx: &ExecutionContext,
        mut messages: Vec<Message>,
        reason: TerminationReason,
        mut usage: Usage,
        abort: &AbortSignal,
    ) -> RunOutput {
        if !self.config.termination_summary || abort.is_cancelled() {
            return self.succeed(ctx, String::new(), reason, usage);
        }

        messages.push(Message::user(
            "The step budget for this run has been reached. Summarize what was accomplished and what remains.",
        ));

        let stream = match self.model.stream(&messages, &[]).await {
            Ok(s) => s,
            Err(_) => return self.succeed(ctx, String::new(), reason, usage),
        };

        let (content, _fragments, extra_usage, _error, cancelled) = self.accumulate(stream, ctx, abort).await;
        if let Some(u) = extra_usage {
            usage.add(&u);
        }
        if cancelled {
            return self.succeed(ctx, content, reason, usage);
        }
        if !content.is_empty() {
            let step = Step::assistant(ctx.session_id.clone(), ctx.run_id, content.clone(), Vec::new(), StepMetrics::default());
            self.pipeline.commit(&ctx.wire, ctx.run_id, ctx.depth, step).await;
        }
        self.succeed(ctx, content, reason, usage)
    }
}

fn extract_text(input: &serde_json::Value) -> String {
    input.as_str().map(str::to_string).unwrap_or_else(|| input.to_string())
}

fn step_to_message(step: &Step) -> Message {
    match step.role {
        Role::User => Message::user(step.content.clone()),
        Role::System => Message::system(step.content.clone()),
        Role::Assistant => {
            if step.tool_calls.is_empty() {
                Message::assistant(step.content.clone())
            } else {
                assistant_message(&step.content, &step.tool_calls)
            }
        }
        Role::Tool => Message::tool_result(step.tool_call_id.clone().unwrap_or_default(), step.content.clone()),
    }
}

fn assistant_message(content: &str, calls: &[ToolCall]) -> Message {
    if calls.is_empty() {
        return Message::assistant(content.to_string());
    }
    let mut parts = Vec::new();
    if !content.is_empty() {
        parts.push(ContentPart::Text { text: content.to_string() });
    }
    for call in calls {
        parts.push(ContentPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        });
    }
    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

/// Turns accumulated fragments into `ToolCall`s, or a description of why
/// they can't be — a missing id/name or unparseable arguments is fatal to
/// the run (`malformed_tool_call`), never silently defaulted.
fn resolve_tool_calls(fragments: &[ToolCallFragmentDelta]) -> Result<Vec<ToolCall>, String> {
    let mut calls = Vec::with_capacity(fragments.len());
    for frag in fragments {
        let id = frag
            .id
            .clone()
            .ok_or_else(|| format!("tool call at index {} never received an id", frag.index))?;
        let name = frag
            .name
            .clone()
            .ok_or_else(|| format!("tool call at index {} never received a name", frag.index))?;
        let raw = frag.arguments_fragment.clone().unwrap_or_else(|| "{}".to_string());
        let arguments = serde_json::from_str(&raw)
            .map_err(|e| format!("tool call '{name}' (call_id {id}) has malformed arguments: {e}"))?;
        calls.push(ToolCall {
            call_id: id,
            tool_name: name,
            arguments,
        });
    }
    Ok(calls)
}
