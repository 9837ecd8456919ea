use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use agentcore_domain::{Result, SessionStore, Step};

/// A `SessionStore` backed by nothing but memory. Used by tests and by
/// hosts that don't need steps to survive a restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    steps: RwLock<HashMap<String, Vec<Step>>>,
    runs: RwLock<HashMap<(String, Uuid), Value>>,
    /// Per-session sequence counters, shared by every caller holding this
    /// same store (e.g. a parent agent and a nested agent invoked as its
    /// tool, both committing into the same session) — this is the one
    /// piece of state that must never be duplicated per `StepPipeline`.
    sequences: RwLock<HashMap<String, u64>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_step(&self, step: Step) -> Result<()> {
        let mut steps = self.steps.write();
        let session = steps.entry(step.session_id.clone()).or_default();
        if session.iter().any(|s| s.id == step.id) {
            return Ok(());
        }
        session.push(step);
        Ok(())
    }

    async fn get_steps(&self, session_id: &str, since_sequence: Option<u64>) -> Result<Vec<Step>> {
        let steps = self.steps.read();
        let Some(session) = steps.get(session_id) else {
            return Ok(Vec::new());
        };
        let since = since_sequence.unwrap_or(0);
        Ok(session
            .iter()
            .filter(|s| s.sequence >= since)
            .cloned()
            .collect())
    }

    async fn save_run(&self, session_id: &str, run_id: Uuid, data: Value) -> Result<()> {
        self.runs
            .write()
            .insert((session_id.to_owned(), run_id), data);
        Ok(())
    }

    async fn delete_steps_from(&self, session_id: &str, sequence: u64) -> Result<()> {
        let mut steps = self.steps.write();
        if let Some(session) = steps.get_mut(session_id) {
            session.retain(|s| s.sequence < sequence);
        }
        Ok(())
    }

    async fn copy_steps_until(&self, session_id: &str, sequence: u64, new_session_id: &str) -> Result<()> {
        let prefix: Vec<Step> = {
            let steps = self.steps.read();
            steps
                .get(session_id)
                .map(|session| {
                    session
                        .iter()
                        .filter(|s| s.sequence < sequence)
                        .cloned()
                        .map(|mut s| {
                            s.session_id = new_session_id.to_owned();
                            s
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        self.steps
            .write()
            .insert(new_session_id.to_owned(), prefix);
        Ok(())
    }

    async fn next_sequence(&self, session_id: &str) -> Result<u64> {
        let mut sequences = self.sequences.write();
        let counter = sequences.entry(session_id.to_owned()).or_insert_with(|| {
            self.steps
                .read()
                .get(session_id)
                .map(|steps| steps.iter().map(|s| s.sequence).max().unwrap_or(0))
                .unwrap_or(0)
        });
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::Role;

    fn step(session: &str, sequence: u64, role: Role) -> Step {
        let mut s = match role {
            Role::User => Step::user(session, Uuid::new_v4(), "hi"),
            Role::Assistant => Step::assistant(session, Uuid::new_v4(), "hi", vec![], Default::default()),
            _ => Step::tool_result(session, Uuid::new_v4(), "c1", "tool", "ok", 1),
        };
        s.assign_sequence(sequence);
        s
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = InMemorySessionStore::new();
        store.save_step(step("s1", 1, Role::User)).await.unwrap();
        store.save_step(step("s1", 2, Role::Assistant)).await.unwrap();
        let steps = store.get_steps("s1", None).await.unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[tokio::test]
    async fn save_step_is_idempotent_by_id() {
        let store = InMemorySessionStore::new();
        let s = step("s1", 1, Role::User);
        store.save_step(s.clone()).await.unwrap();
        store.save_step(s).await.unwrap();
        assert_eq!(store.get_steps("s1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_steps_since_sequence_filters() {
        let store = InMemorySessionStore::new();
        store.save_step(step("s1", 1, Role::User)).await.unwrap();
        store.save_step(step("s1", 2, Role::Assistant)).await.unwrap();
        let steps = store.get_steps("s1", Some(2)).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sequence, 2);
    }

    #[tokio::test]
    async fn delete_steps_from_truncates_tail() {
        let store = InMemorySessionStore::new();
        store.save_step(step("s1", 1, Role::User)).await.unwrap();
        store.save_step(step("s1", 2, Role::Assistant)).await.unwrap();
        store.save_step(step("s1", 3, Role::User)).await.unwrap();
        store.delete_steps_from("s1", 2).await.unwrap();
        let steps = store.get_steps("s1", None).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sequence, 1);
    }

    #[tokio::test]
    async fn copy_steps_until_forks_into_new_session() {
        let store = InMemorySessionStore::new();
        store.save_step(step("s1", 1, Role::User)).await.unwrap();
        store.save_step(step("s1", 2, Role::Assistant)).await.unwrap();
        store.save_step(step("s1", 3, Role::User)).await.unwrap();
        store.copy_steps_until("s1", 3, "s1-fork").await.unwrap();
        let forked = store.get_steps("s1-fork", None).await.unwrap();
        assert_eq!(forked.len(), 2);
        assert!(forked.iter().all(|s| s.session_id == "s1-fork"));
    }

    #[tokio::test]
    async fn get_steps_for_unknown_session_is_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.get_steps("nope", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn next_sequence_increments_from_one() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.next_sequence("s1").await.unwrap(), 1);
        assert_eq!(store.next_sequence("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn next_sequence_is_independent_per_session() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.next_sequence("a").await.unwrap(), 1);
        assert_eq!(store.next_sequence("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn next_sequence_continues_past_steps_already_persisted() {
        // Simulates a second run against a session that already has
        // history, or a second StepPipeline sharing this store with a
        // nested agent: the counter must pick up where the persisted
        // steps leave off, not restart at 1.
        let store = InMemorySessionStore::new();
        store.save_step(step("s1", 1, Role::User)).await.unwrap();
        store.save_step(step("s1", 2, Role::Assistant)).await.unwrap();
        assert_eq!(store.next_sequence("s1").await.unwrap(), 3);
        assert_eq!(store.next_sequence("s1").await.unwrap(), 4);
    }
}
