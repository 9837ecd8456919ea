use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::wire::Wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnableType {
    Agent,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingType {
    ToolCall,
    WorkflowNode,
}

/// Small bag of metadata carried alongside a context. Holds the call-stack
/// used for cycle detection (`_call_stack`) plus whatever tracing hints a
/// host wants threaded through. Not part of the persisted model.
#[derive(Debug, Clone, Default)]
pub struct ContextMetadata {
    pub call_stack: Vec<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

/// Immutable per-run descriptor: identity, the shared wire, and nesting
/// state. Cloning an `ExecutionContext` is cheap (the wire is `Arc`-shared);
/// `child()` is the only way to derive a new one, and always increments
/// depth.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub session_id: String,
    pub wire: Arc<Wire>,
    pub user_id: Option<String>,
    pub runnable_type: RunnableType,
    pub runnable_id: Option<String>,
    pub parent_run_id: Option<Uuid>,
    pub nested_runnable_id: Option<String>,
    pub nesting_type: Option<NestingType>,
    pub depth: u32,
    pub metadata: ContextMetadata,
}

impl ExecutionContext {
    pub fn new_root(
        run_id: Uuid,
        session_id: impl Into<String>,
        wire: Arc<Wire>,
        user_id: Option<String>,
        runnable_type: RunnableType,
        runnable_id: Option<String>,
    ) -> Self {
        // Seed the call stack with the root's own id so a cycle back to the
        // root (A -> B -> A) is caught the moment B tries to invoke A,
        // rather than one level later when A itself tries to call back out.
        let call_stack = runnable_id.clone().into_iter().collect();
        Self {
            run_id,
            session_id: session_id.into(),
            wire,
            user_id,
            runnable_type,
            runnable_id,
            parent_run_id: None,
            nested_runnable_id: None,
            nesting_type: None,
            depth: 0,
            metadata: ContextMetadata {
                call_stack,
                extra: HashMap::new(),
            },
        }
    }

    /// Derives a child context for a nested invocation (an agent called as
    /// a tool of this one). The child shares `session_id` and `wire`,
    /// increments `depth`, and extends `_call_stack` with
    /// `nested_runnable_id` so a later nested call can detect a cycle back
    /// to an ancestor.
    pub fn child(
        &self,
        run_id: Uuid,
        nested_runnable_id: impl Into<String>,
        nesting_type: NestingType,
        runnable_type: RunnableType,
        runnable_id: Option<String>,
    ) -> Self {
        let nested_runnable_id = nested_runnable_id.into();
        let mut metadata = self.metadata.clone();
        metadata.call_stack.push(nested_runnable_id.clone());

        Self {
            run_id,
            session_id: self.session_id.clone(),
            wire: self.wire.clone(),
            user_id: self.user_id.clone(),
            runnable_type,
            runnable_id,
            parent_run_id: Some(self.run_id),
            nested_runnable_id: Some(nested_runnable_id),
            nesting_type: Some(nesting_type),
            depth: self.depth + 1,
            metadata,
        }
    }

    pub fn is_on_call_stack(&self, runnable_id: &str) -> bool {
        self.metadata.call_stack.iter().any(|id| id == runnable_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_ctx() -> ExecutionContext {
        ExecutionContext::new_root(
            Uuid::new_v4(),
            "s1",
            Arc::new(Wire::new(8)),
            None,
            RunnableType::Agent,
            Some("agent-a".into()),
        )
    }

    #[test]
    fn child_increments_depth_and_sets_parent() {
        let root = root_ctx();
        let child = root.child(Uuid::new_v4(), "agent-b", NestingType::ToolCall, RunnableType::Agent, Some("agent-b".into()));
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_run_id, Some(root.run_id));
        assert_eq!(child.session_id, root.session_id);
    }

    #[test]
    fn child_shares_wire_with_parent() {
        let root = root_ctx();
        let child = root.child(Uuid::new_v4(), "agent-b", NestingType::ToolCall, RunnableType::Agent, None);
        assert!(Arc::ptr_eq(&root.wire, &child.wire));
    }

    #[test]
    fn root_call_stack_is_seeded_with_its_own_runnable_id() {
        let root = root_ctx();
        assert!(root.is_on_call_stack("agent-a"));
    }

    #[test]
    fn call_stack_detects_cycle_back_to_ancestor() {
        let root = root_ctx();
        let child = root.child(Uuid::new_v4(), "agent-b", NestingType::ToolCall, RunnableType::Agent, Some("agent-b".into()));
        // agent-a is the root's own id, carried onto every descendant's
        // call stack from the start -- a direct A -> B -> A cycle is
        // caught the instant B tries to invoke A, not one level later.
        assert!(child.is_on_call_stack("agent-a"));
        assert!(child.is_on_call_stack("agent-b"));
    }

    #[test]
    fn depth_increases_by_one_per_level() {
        let root = root_ctx();
        let c1 = root.child(Uuid::new_v4(), "a", NestingType::ToolCall, RunnableType::Agent, None);
        let c2 = c1.child(Uuid::new_v4(), "b", NestingType::ToolCall, RunnableType::Agent, None);
        assert_eq!(c2.depth, 2);
    }
}
