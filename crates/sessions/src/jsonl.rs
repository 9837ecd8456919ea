//! Append-only JSONL session persistence.
//!
//! Each session gets a `<session_id>.jsonl` file under the configured base
//! directory holding one JSON-encoded `Step` per line, plus a shared
//! `runs.jsonl` for run-level metadata. An in-memory cache mirrors the file
//! so reads don't round-trip through disk on every call; the file is the
//! durability layer, not the read path.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use agentcore_domain::{Error, Result, SessionStore, Step, TraceEvent};

pub struct JsonlSessionStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<Step>>>,
    /// Per-session sequence counters, shared by every caller holding this
    /// same store — see `SessionStore::next_sequence`.
    sequences: RwLock<HashMap<String, u64>>,
}

impl JsonlSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
            sequences: RwLock::new(HashMap::new()),
        })
    }

    fn steps_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    fn runs_path(&self) -> PathBuf {
        self.base_dir.join("runs.jsonl")
    }

    /// Loads a session's steps from disk into the cache, if not already
    /// resident. Malformed lines are logged and skipped, never fatal.
    fn ensure_loaded(&self, session_id: &str) {
        if self.cache.read().contains_key(session_id) {
            return;
        }
        let path = self.steps_path(session_id);
        let mut steps = Vec::new();
        if let Ok(raw) = std::fs::read_to_string(&path) {
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Step>(line) {
                    Ok(step) => steps.push(step),
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "skipping malformed step line");
                    }
                }
            }
        }
        self.cache.write().entry(session_id.to_owned()).or_insert(steps);
    }

    fn rewrite(&self, session_id: &str, steps: &[Step]) -> Result<()> {
        let path = self.steps_path(session_id);
        let mut buf = String::new();
        for step in steps {
            let line = serde_json::to_string(step).map_err(Error::Json)?;
            buf.push_str(&line);
            buf.push('\n');
        }
        std::fs::write(&path, buf).map_err(Error::Io)
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn save_step(&self, step: Step) -> Result<()> {
        self.ensure_loaded(&step.session_id);

        {
            let cache = self.cache.read();
            if let Some(existing) = cache.get(&step.session_id) {
                if existing.iter().any(|s| s.id == step.id) {
                    return Ok(());
                }
            }
        }

        let line = serde_json::to_string(&step).map_err(Error::Json)?;
        let path = self.steps_path(&step.session_id);
        let append = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));

        if let Err(e) = append {
            TraceEvent::PersistenceFailed {
                session_id: step.session_id.clone(),
                operation: "save_step".into(),
                reason: e.to_string(),
            }
            .emit();
        }

        self.cache
            .write()
            .entry(step.session_id.clone())
            .or_default()
            .push(step);
        Ok(())
    }

    async fn get_steps(&self, session_id: &str, since_sequence: Option<u64>) -> Result<Vec<Step>> {
        self.ensure_loaded(session_id);
        let since = since_sequence.unwrap_or(0);
        Ok(self
            .cache
            .read()
            .get(session_id)
            .map(|steps| steps.iter().filter(|s| s.sequence >= since).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_run(&self, session_id: &str, run_id: Uuid, data: Value) -> Result<()> {
        let line = serde_json::json!({ "session_id": session_id, "run_id": run_id, "data": data });
        let path = self.runs_path();
        let append = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = append {
            TraceEvent::PersistenceFailed {
                session_id: session_id.to_owned(),
                operation: "save_run".into(),
                reason: e.to_string(),
            }
            .emit();
        }
        Ok(())
    }

    async fn delete_steps_from(&self, session_id: &str, sequence: u64) -> Result<()> {
        self.ensure_loaded(session_id);
        let remaining: Vec<Step> = {
            let mut cache = self.cache.write();
            let steps = cache.entry(session_id.to_owned()).or_default();
            steps.retain(|s| s.sequence < sequence);
            steps.clone()
        };
        self.rewrite(session_id, &remaining)
    }

    async fn copy_steps_until(&self, session_id: &str, sequence: u64, new_session_id: &str) -> Result<()> {
        self.ensure_loaded(session_id);
        let prefix: Vec<Step> = {
            let cache = self.cache.read();
            cache
                .get(session_id)
                .map(|steps| {
                    steps
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
        self.rewrite(new_session_id, &prefix)?;
        self.cache.write().insert(new_session_id.to_owned(), prefix);
        Ok(())
    }

    async fn next_sequence(&self, session_id: &str) -> Result<u64> {
        self.ensure_loaded(session_id);
        let mut sequences = self.sequences.write();
        let counter = sequences.entry(session_id.to_owned()).or_insert_with(|| {
            self.cache
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
    use tempfile::tempdir;

    fn step(session: &str, sequence: u64) -> Step {
        let mut s = Step::user(session, Uuid::new_v4(), "hi");
        s.assign_sequence(sequence);
        s
    }

    #[tokio::test]
    async fn save_step_persists_to_disk() {
        let dir = tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path()).unwrap();
        store.save_step(step("s1", 1)).await.unwrap();
        let path = dir.path().join("s1.jsonl");
        assert!(path.exists());
        let raw = std::fs::read_to_string(path).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn reload_reads_back_persisted_steps() {
        let dir = tempdir().unwrap();
        {
            let store = JsonlSessionStore::new(dir.path()).unwrap();
            store.save_step(step("s1", 1)).await.unwrap();
            store.save_step(step("s1", 2)).await.unwrap();
        }
        let store2 = JsonlSessionStore::new(dir.path()).unwrap();
        let steps = store2.get_steps("s1", None).await.unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("s1.jsonl"), "not json\n").unwrap();
        let store = JsonlSessionStore::new(dir.path()).unwrap();
        let steps = store.get_steps("s1", None).await.unwrap();
        assert!(steps.is_empty());
    }

    #[tokio::test]
    async fn delete_steps_from_rewrites_file() {
        let dir = tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path()).unwrap();
        store.save_step(step("s1", 1)).await.unwrap();
        store.save_step(step("s1", 2)).await.unwrap();
        store.delete_steps_from("s1", 2).await.unwrap();
        let steps = store.get_steps("s1", None).await.unwrap();
        assert_eq!(steps.len(), 1);
        let raw = std::fs::read_to_string(dir.path().join("s1.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn copy_steps_until_writes_new_session_file() {
        let dir = tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path()).unwrap();
        store.save_step(step("s1", 1)).await.unwrap();
        store.save_step(step("s1", 2)).await.unwrap();
        store.copy_steps_until("s1", 2, "s1-fork").await.unwrap();
        assert!(dir.path().join("s1-fork.jsonl").exists());
        let forked = store.get_steps("s1-fork", None).await.unwrap();
        assert_eq!(forked.len(), 1);
    }

    #[test]
    fn role_enum_is_reexported_for_callers() {
        let _ = Role::User;
    }

    #[tokio::test]
    async fn next_sequence_continues_across_a_reload() {
        let dir = tempdir().unwrap();
        {
            let store = JsonlSessionStore::new(dir.path()).unwrap();
            store.save_step(step("s1", 1)).await.unwrap();
            store.save_step(step("s1", 2)).await.unwrap();
        }
        // A fresh store instance over the same directory -- standing in for
        // a second run, or a nested agent's own StepPipeline sharing the
        // same on-disk session -- must not restart the counter at 1.
        let store2 = JsonlSessionStore::new(dir.path()).unwrap();
        assert_eq!(store2.next_sequence("s1").await.unwrap(), 3);
    }
}
