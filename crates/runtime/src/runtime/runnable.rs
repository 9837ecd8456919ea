//! The `Runnable` abstraction: anything that can drive a turn of the
//! execution core, whether invoked at the top level (`run_stream`, owning
//! its own wire) or nested inside another run as a tool (`run`, sharing the
//! parent's wire and never closing it).

use std::sync::Arc;

use agentcore_domain::{
    AbortSignal, BoxStream, ExecutionContext, ModelAdapter, PermissionManager, RunOutput, RunnableType, SessionStore,
    StepEvent, Wire, DEFAULT_CAPACITY,
};
use async_trait::async_trait;
use uuid::Uuid;

use super::config::ExecutorConfig;
use super::executor::AgentExecutor;
use super::lifecycle::run_lifecycle;
use super::tool_registry::ToolRegistry;

#[async_trait]
pub trait Runnable: Send + Sync {
    /// Nested invocation: runs within an existing context and never closes
    /// its wire. This is what `AgentTool` calls on an inner agent.
    async fn run(&self, input: serde_json::Value, ctx: ExecutionContext) -> RunOutput;

    /// Top-level invocation: allocates a fresh run id, wire, and root
    /// context, then returns the event stream as the run proceeds. Closes
    /// the wire once the run (and everything nested inside it) is done.
    async fn run_stream(
        &self,
        input: serde_json::Value,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> BoxStream<'static, StepEvent>;
}

/// A `Runnable` backed by one `AgentExecutor`: a model, a tool registry, a
/// session store, and an execution config.
#[derive(Clone)]
pub struct Agent {
    pub id: String,
    model: Arc<dyn ModelAdapter>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    config: ExecutorConfig,
    permissions: Option<Arc<dyn PermissionManager>>,
    system_prompt: Option<String>,
    abort: AbortSignal,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        model: Arc<dyn ModelAdapter>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            id: id.into(),
            model,
            tools,
            store,
            config,
            permissions: None,
            system_prompt: None,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionManager>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// A shared handle a host can cancel from outside the run, e.g. on a
    /// user-initiated stop request.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn cancel(&self) {
        self.abort.cancel();
    }

    fn build_executor(&self) -> AgentExecutor {
        let mut executor = AgentExecutor::new(self.model.clone(), self.tools.clone(), self.store.clone(), self.config.clone());
        if let Some(p) = &self.permissions {
            executor = executor.with_permissions(p.clone());
        }
        executor
    }
}

#[async_trait]
impl Runnable for Agent {
    async fn run(&self, input: serde_json::Value, ctx: ExecutionContext) -> RunOutput {
        let executor = self.build_executor();
        executor.execute(input, &ctx, self.system_prompt.as_deref(), &self.abort).await
    }

    async fn run_stream(
        &self,
        input: serde_json::Value,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> BoxStream<'static, StepEvent> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let wire = Arc::new(Wire::new(DEFAULT_CAPACITY));
        let run_id = Uuid::new_v4();
        let ctx = ExecutionContext::new_root(
            run_id,
            session_id,
            wire.clone(),
            user_id,
            RunnableType::Agent,
            Some(self.id.clone()),
        );
        let rx = wire
            .take_receiver()
            .expect("a freshly created root wire's receiver has never been taken");

        let this = self.clone();
        tokio::spawn(async move {
            run_lifecycle(&this, input, ctx).await;
            wire.close();
        });

        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::{EventType, Result, StreamEvent, ToolDefinition, Message};
    use agentcore_sessions::InMemorySessionStore;
    use futures_util::StreamExt;

    struct Echo;
    #[async_trait]
    impl ModelAdapter for Echo {
        async fn stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::iter(vec![
                Ok(StreamEvent::Token { text: "hi there".into() }),
                Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                }),
            ])))
        }
    }

    #[tokio::test]
    async fn run_stream_closes_after_terminal_event() {
        let agent = Agent::new(
            "a1",
            Arc::new(Echo),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemorySessionStore::new()),
            ExecutorConfig::default(),
        );
        let mut stream = agent.run_stream(serde_json::json!("hi"), None, None).await;

        let mut saw_run_completed = false;
        while let Some(event) = stream.next().await {
            if event.event_type == EventType::RunCompleted {
                saw_run_completed = true;
            }
        }
        assert!(saw_run_completed);
    }

    #[tokio::test]
    async fn run_stream_first_event_is_run_started() {
        let agent = Agent::new(
            "a1",
            Arc::new(Echo),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemorySessionStore::new()),
            ExecutorConfig::default(),
        );
        let mut stream = agent.run_stream(serde_json::json!("hi"), None, None).await;
        let first = stream.next().await.unwrap();
        assert_eq!(first.event_type, EventType::RunStarted);
    }
}
