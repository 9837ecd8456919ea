//! Resolves, authorizes, and executes one assistant step's tool calls.
//!
//! A batch of calls from a single step runs concurrently, bounded by a
//! semaphore, but results are handed back in the original call order —
//! callers zip them against the originating `ToolCall` vector by index,
//! not by completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agentcore_domain::{
    AbortSignal, AlwaysAllow, ExecutionContext, PermissionManager, StepEvent, ToolCall, ToolResult, Wire,
};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::tool_registry::ToolRegistry;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    permissions: Arc<dyn PermissionManager>,
    max_concurrent: usize,
    consent_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, max_concurrent: usize) -> Self {
        Self {
            registry,
            permissions: Arc::new(AlwaysAllow),
            max_concurrent,
            consent_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionManager>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Dispatches every call in `calls` concurrently (bounded by
    /// `max_concurrent`) and returns results in the same order as `calls`.
    pub async fn dispatch_batch(
        &self,
        calls: &[ToolCall],
        ctx: &ExecutionContext,
        user_id: Option<&str>,
        abort: &AbortSignal,
        wire: &Wire,
        run_id: Uuid,
        depth: u32,
    ) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));

        let futures = calls.iter().map(|call| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.dispatch_one(call, ctx, user_id, abort, wire, run_id, depth).await
            }
        });

        join_all(futures).await
    }

    async fn dispatch_one(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
        user_id: Option<&str>,
        abort: &AbortSignal,
        wire: &Wire,
        run_id: Uuid,
        depth: u32,
    ) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.registry.get(&call.tool_name) else {
            return ToolResult::failure(
                &call.call_id,
                &call.tool_name,
                "tool_not_found",
                format!("no tool named '{}' is registered", call.tool_name),
                started.elapsed().as_millis() as u64,
            );
        };

        if tool.requires_consent() {
            let _ = wire
                .write(StepEvent::tool_auth_required(
                    run_id,
                    ctx.session_id.clone(),
                    depth,
                    &call.tool_name,
                    &call.call_id,
                ))
                .await;

            let consent = self
                .permissions
                .check(user_id, &call.tool_name, &call.arguments, ctx, self.consent_timeout)
                .await;

            if !consent.allowed {
                let reason = consent.reason.unwrap_or_else(|| "denied".to_string());
                let _ = wire
                    .write(StepEvent::tool_auth_denied(
                        run_id,
                        ctx.session_id.clone(),
                        depth,
                        &call.tool_name,
                        &call.call_id,
                        reason.clone(),
                    ))
                    .await;
                return ToolResult::failure(
                    &call.call_id,
                    &call.tool_name,
                    "permission_denied",
                    reason,
                    started.elapsed().as_millis() as u64,
                );
            }
        }

        if abort.is_cancelled() {
            return ToolResult::failure(
                &call.call_id,
                &call.tool_name,
                "cancelled",
                "run was cancelled before this tool executed",
                started.elapsed().as_millis() as u64,
            );
        }

        match tool.execute(&call.call_id, call.arguments.clone(), ctx, abort).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(
                &call.call_id,
                &call.tool_name,
                "tool_execution_error",
                e.to_string(),
                started.elapsed().as_millis() as u64,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::{ConsentResult, RunnableType, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;
    #[async_trait]
    impl agentcore_domain::Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(
            &self,
            call_id: &str,
            args: Value,
            _ctx: &ExecutionContext,
            _abort: &AbortSignal,
        ) -> Result<ToolResult> {
            Ok(ToolResult::success(call_id, "echo", args.to_string(), 1))
        }
    }

    struct Gated;
    #[async_trait]
    impl agentcore_domain::Tool for Gated {
        fn name(&self) -> &str {
            "gated"
        }
        fn description(&self) -> &str {
            "needs consent"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({})
        }
        fn requires_consent(&self) -> bool {
            true
        }
        async fn execute(
            &self,
            call_id: &str,
            _args: Value,
            _ctx: &ExecutionContext,
            _abort: &AbortSignal,
        ) -> Result<ToolResult> {
            Ok(ToolResult::success(call_id, "gated", "ran", 1))
        }
    }

    struct DenyAll;
    #[async_trait]
    impl PermissionManager for DenyAll {
        async fn check(
            &self,
            _user_id: Option<&str>,
            _tool_name: &str,
            _args: &Value,
            _ctx: &ExecutionContext,
            _timeout: Duration,
        ) -> ConsentResult {
            ConsentResult::deny("no")
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new_root(
            Uuid::new_v4(),
            "s1",
            Arc::new(Wire::new(8)),
            None,
            RunnableType::Agent,
            None,
        )
    }

    #[tokio::test]
    async fn unknown_tool_returns_tool_not_found() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), 4);
        let ctx = ctx();
        let wire = Wire::new(8);
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "ghost".into(),
            arguments: serde_json::json!({}),
        };
        let results = executor
            .dispatch_batch(&[call], &ctx, None, &AbortSignal::new(), &wire, ctx.run_id, 0)
            .await;
        assert!(!results[0].is_success);
        assert_eq!(results[0].error.as_deref(), Some("tool_not_found"));
    }

    #[tokio::test]
    async fn batch_preserves_call_order_in_results() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let executor = ToolExecutor::new(Arc::new(registry), 4);
        let ctx = ctx();
        let wire = Wire::new(8);
        let calls: Vec<ToolCall> = (0..5)
            .map(|i| ToolCall {
                call_id: format!("c{i}"),
                tool_name: "echo".into(),
                arguments: serde_json::json!({ "i": i }),
            })
            .collect();
        let results = executor
            .dispatch_batch(&calls, &ctx, None, &AbortSignal::new(), &wire, ctx.run_id, 0)
            .await;
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.call_id, format!("c{i}"));
        }
    }

    #[tokio::test]
    async fn consent_required_and_denied_yields_permission_denied() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Gated));
        let executor = ToolExecutor::new(Arc::new(registry), 4).with_permissions(Arc::new(DenyAll));
        let ctx = ctx();
        let wire = Wire::new(8);
        let mut rx = wire.take_receiver().unwrap();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "gated".into(),
            arguments: serde_json::json!({}),
        };
        let results = executor
            .dispatch_batch(&[call], &ctx, None, &AbortSignal::new(), &wire, ctx.run_id, 0)
            .await;
        assert!(!results[0].is_success);
        assert_eq!(results[0].error.as_deref(), Some("permission_denied"));

        let required = rx.recv().await.unwrap();
        assert_eq!(required.event_type, agentcore_domain::EventType::ToolAuthRequired);
        let denied = rx.recv().await.unwrap();
        assert_eq!(denied.event_type, agentcore_domain::EventType::ToolAuthDenied);
    }

    #[tokio::test]
    async fn cancelled_abort_signal_short_circuits_execution() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let executor = ToolExecutor::new(Arc::new(registry), 4);
        let ctx = ctx();
        let wire = Wire::new(8);
        let abort = AbortSignal::new();
        abort.cancel();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let results = executor
            .dispatch_batch(&[call], &ctx, None, &abort, &wire, ctx.run_id, 0)
            .await;
        assert_eq!(results[0].error.as_deref(), Some("cancelled"));
    }

    /// A tool that tracks how many calls are in flight at once, so the
    /// dispatch bound can be verified rather than just the result count.
    struct Tracking {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl agentcore_domain::Tool for Tracking {
        fn name(&self) -> &str {
            "tracking"
        }
        fn description(&self) -> &str {
            "records peak concurrent in-flight calls"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(
            &self,
            call_id: &str,
            _args: Value,
            _ctx: &ExecutionContext,
            _abort: &AbortSignal,
        ) -> Result<ToolResult> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ToolResult::success(call_id, "tracking", "ok", 20))
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_max_concurrent() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Tracking {
            in_flight: in_flight.clone(),
            peak: peak.clone(),
        }));
        let executor = ToolExecutor::new(Arc::new(registry), 2);
        let ctx = ctx();
        let wire = Wire::new(8);
        let calls: Vec<ToolCall> = (0..6)
            .map(|i| ToolCall {
                call_id: format!("c{i}"),
                tool_name: "tracking".into(),
                arguments: serde_json::json!({}),
            })
            .collect();
        let results = executor
            .dispatch_batch(&calls, &ctx, None, &AbortSignal::new(), &wire, ctx.run_id, 0)
            .await;
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.is_success));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 2, "calls never actually ran concurrently");
    }
}
