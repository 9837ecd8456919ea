//! Test doubles for building against the execution core without a real
//! model provider or tool backend: a scriptable `ModelAdapter` and a
//! configurable `Tool`. `agentcore_sessions::InMemorySessionStore` already
//! covers the `SessionStore` side and is re-exported here for convenience.

use std::sync::Mutex;

use agentcore_domain::{
    AbortSignal, BoxStream, ExecutionContext, Message, ModelAdapter, Result, StreamEvent, Tool, ToolDefinition,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::Value;

pub use agentcore_sessions::InMemorySessionStore;

/// A `ModelAdapter` that plays back a fixed sequence of model turns, one
/// per call to `stream`. Panics if called more times than scripted — a
/// test asserting on the wrong number of LLM turns should fail loudly
/// rather than silently reusing the last turn.
pub struct ScriptedModel {
    turns: Mutex<Vec<Vec<StreamEvent>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns),
        }
    }

    /// A model that only ever replies with a single text token and no
    /// tool calls — the common case for "happy path" tests.
    pub fn single_reply(text: impl Into<String>) -> Self {
        Self::new(vec![vec![
            StreamEvent::Token { text: text.into() },
            StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".to_string()),
            },
        ]])
    }
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    async fn stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let turn = {
            let mut turns = self.turns.lock().expect("ScriptedModel mutex poisoned");
            if turns.is_empty() {
                panic!("ScriptedModel called more times than it was scripted for");
            }
            turns.remove(0)
        };
        Ok(Box::pin(futures_util::stream::iter(turn.into_iter().map(Ok))))
    }
}

/// A `Tool` whose behavior (success content, failure, consent requirement)
/// is fixed at construction time.
pub struct ConfigurableTool {
    name: String,
    description: String,
    requires_consent: bool,
    outcome: ToolOutcome,
}

enum ToolOutcome {
    Success(String),
    Failure { kind: String, message: String },
}

impl ConfigurableTool {
    pub fn always_succeeds(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "a test tool that always succeeds".to_string(),
            requires_consent: false,
            outcome: ToolOutcome::Success(content.into()),
        }
    }

    pub fn always_fails(name: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "a test tool that always fails".to_string(),
            requires_consent: false,
            outcome: ToolOutcome::Failure {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }

    pub fn requiring_consent(mut self) -> Self {
        self.requires_consent = true;
        self
    }
}

#[async_trait]
impl Tool for ConfigurableTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    fn requires_consent(&self) -> bool {
        self.requires_consent
    }

    async fn execute(
        &self,
        call_id: &str,
        _args: Value,
        _ctx: &ExecutionContext,
        _abort: &AbortSignal,
    ) -> Result<ToolResult> {
        Ok(match &self.outcome {
            ToolOutcome::Success(content) => ToolResult::success(call_id, &self.name, content.clone(), 0),
            ToolOutcome::Failure { kind, message } => {
                ToolResult::failure(call_id, &self.name, kind.clone(), message.clone(), 0)
            }
        })
    }
}
