//! Builds a `Trace`/`Span` tree out of the flat `StepEvent` stream a run
//! produces on the wire. A run nested as a tool call gets its own `Trace`
//! entry, linked to its parent via `parent_run_id` rather than being
//! folded into one flat node list — `tree()` walks that link to
//! reconstruct the full nested picture on demand.
//!
//! Bounded in memory (a ring of the most recent traces), optionally
//! persisted as append-only JSONL, and taps its updates out through a
//! `tokio::sync::broadcast` channel per run so a UI can watch one run live.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use agentcore_domain::{EventType, Role, StepEvent, TraceEvent};

pub const DEFAULT_CAPACITY: usize = 2000;
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    LlmCall,
    ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Completed,
    Failed,
}

/// One finished unit of work within a run: a single model turn, or a
/// single tool call's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub kind: SpanKind,
    pub name: String,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
    pub is_error: bool,
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        format!("{}…", &text[..MAX])
    }
}

/// The span collection for one run. A run nested as a tool call gets its
/// own `Trace`, linked to the invoking run via `parent_run_id` — walk that
/// chain to reconstruct the full tree for a top-level run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub run_id: Uuid,
    pub session_id: String,
    pub parent_run_id: Option<Uuid>,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub spans: Vec<Span>,
}

impl Trace {
    fn new(run_id: Uuid, session_id: String, parent_run_id: Option<Uuid>) -> Self {
        Self {
            run_id,
            session_id,
            parent_run_id,
            status: SpanStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            error: None,
            spans: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TraceUpdate {
    SpanRecorded(Span),
    TraceClosed(Trace),
}

pub struct TraceStore {
    order: RwLock<VecDeque<Uuid>>,
    traces: RwLock<HashMap<Uuid, Trace>>,
    channels: RwLock<HashMap<Uuid, broadcast::Sender<TraceUpdate>>>,
    capacity: usize,
    persist_path: Option<PathBuf>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self {
            order: RwLock::new(VecDeque::new()),
            traces: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            capacity: DEFAULT_CAPACITY,
            persist_path: None,
        }
    }

    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    fn channel(&self, run_id: Uuid) -> broadcast::Sender<TraceUpdate> {
        self.channels
            .write()
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, run_id: Uuid) -> broadcast::Receiver<TraceUpdate> {
        self.channel(run_id).subscribe()
    }

    pub fn get(&self, run_id: Uuid) -> Option<Trace> {
        self.traces.read().get(&run_id).cloned()
    }

    /// Every span belonging to `run_id` and to any run nested under it,
    /// ordered root-first.
    pub fn tree(&self, run_id: Uuid) -> Vec<Trace> {
        let traces = self.traces.read();
        let mut out = Vec::new();
        let mut frontier = vec![run_id];
        while let Some(id) = frontier.pop() {
            if let Some(t) = traces.get(&id) {
                out.push(t.clone());
                for (child_id, child) in traces.iter() {
                    if child.parent_run_id == Some(id) {
                        frontier.push(*child_id);
                    }
                }
            }
        }
        out
    }

    fn insert_trace(&self, trace: Trace) {
        let run_id = trace.run_id;
        let mut order = self.order.write();
        let mut traces = self.traces.write();
        if !traces.contains_key(&run_id) {
            order.push_back(run_id);
            while order.len() > self.capacity {
                if let Some(evicted) = order.pop_front() {
                    traces.remove(&evicted);
                }
            }
        }
        traces.insert(run_id, trace);
    }

    fn persist(&self, trace: &Trace) {
        let Some(path) = &self.persist_path else { return };
        let line = match serde_json::to_string(trace) {
            Ok(l) => l,
            Err(_) => return,
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            TraceEvent::PersistenceFailed {
                session_id: trace.session_id.clone(),
                operation: "trace_persist".into(),
                reason: e.to_string(),
            }
            .emit();
        }
    }

    /// Folds one `StepEvent` into the trace tree. Call this for every
    /// event observed on a wire — typically from a task tapping a cloned
    /// receiver alongside the run's primary consumer.
    pub fn ingest(&self, event: &StepEvent) {
        match event.event_type {
            EventType::RunStarted => {
                let trace = Trace::new(event.run_id, event.session_id.clone(), event.parent_run_id);
                self.insert_trace(trace);
            }
            EventType::StepCompleted => {
                let Some(step) = &event.step else { return };
                let span = match step.role {
                    Role::Assistant => Span {
                        kind: SpanKind::LlmCall,
                        name: "llm_call".to_string(),
                        status: SpanStatus::Completed,
                        started_at: step.created_at,
                        ended_at: Some(step.created_at),
                        duration_ms: step.metrics.as_ref().and_then(|m| m.wall_time_ms),
                        input_preview: None,
                        output_preview: Some(preview(&step.content)),
                        is_error: false,
                    },
                    Role::Tool => Span {
                        kind: SpanKind::ToolCall,
                        name: step.name.clone().unwrap_or_default(),
                        status: SpanStatus::Completed,
                        started_at: step.created_at,
                        ended_at: Some(step.created_at),
                        duration_ms: step.metrics.as_ref().and_then(|m| m.tool_duration_ms),
                        input_preview: None,
                        output_preview: Some(preview(&step.content)),
                        is_error: false,
                    },
                    Role::User | Role::System => return,
                };

                let mut traces = self.traces.write();
                if let Some(trace) = traces.get_mut(&event.run_id) {
                    trace.spans.push(span.clone());
                }
                drop(traces);
                let _ = self.channel(event.run_id).send(TraceUpdate::SpanRecorded(span));
            }
            EventType::RunCompleted | EventType::RunFailed => {
                let closed = {
                    let mut traces = self.traces.write();
                    let Some(trace) = traces.get_mut(&event.run_id) else { return };
                    trace.status = if event.event_type == EventType::RunCompleted {
                        SpanStatus::Completed
                    } else {
                        SpanStatus::Failed
                    };
                    trace.ended_at = Some(Utc::now());
                    trace.duration_ms = Some((trace.ended_at.unwrap() - trace.started_at).num_milliseconds().max(0) as u64);
                    if event.event_type == EventType::RunFailed {
                        trace.error = event
                            .data
                            .as_ref()
                            .and_then(|d| d.get("error"))
                            .and_then(|e| e.get("message"))
                            .and_then(|m| m.as_str())
                            .map(str::to_string);
                    }
                    trace.clone()
                };
                self.persist(&closed);
                let _ = self.channel(event.run_id).send(TraceUpdate::TraceClosed(closed));
            }
            EventType::StepDelta | EventType::ToolAuthRequired | EventType::ToolAuthDenied => {}
        }
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::{Step, StepMetrics, TerminationReason};

    fn user_session(run_id: Uuid) -> StepEvent {
        StepEvent::run_started(run_id, "s1", None, None, 0, serde_json::json!("hi"))
    }

    #[test]
    fn run_started_creates_a_running_trace() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        store.ingest(&user_session(run_id));
        let trace = store.get(run_id).unwrap();
        assert_eq!(trace.status, SpanStatus::Running);
        assert!(trace.spans.is_empty());
    }

    #[test]
    fn assistant_step_completed_adds_llm_call_span() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        store.ingest(&user_session(run_id));

        let step = Step::assistant("s1", run_id, "hello", vec![], StepMetrics::default());
        store.ingest(&StepEvent::step_completed(run_id, "s1", 0, step));

        let trace = store.get(run_id).unwrap();
        assert_eq!(trace.spans.len(), 1);
        assert_eq!(trace.spans[0].kind, SpanKind::LlmCall);
    }

    #[test]
    fn tool_step_completed_adds_tool_call_span() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        store.ingest(&user_session(run_id));

        let step = Step::tool_result("s1", run_id, "c1", "add", "3", 5);
        store.ingest(&StepEvent::step_completed(run_id, "s1", 0, step));

        let trace = store.get(run_id).unwrap();
        assert_eq!(trace.spans.len(), 1);
        assert_eq!(trace.spans[0].kind, SpanKind::ToolCall);
        assert_eq!(trace.spans[0].name, "add");
    }

    #[test]
    fn run_completed_closes_trace() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        store.ingest(&user_session(run_id));
        store.ingest(&StepEvent::run_completed(
            run_id,
            "s1",
            None,
            0,
            serde_json::json!({}),
            TerminationReason::Completed,
        ));
        let trace = store.get(run_id).unwrap();
        assert_eq!(trace.status, SpanStatus::Completed);
        assert!(trace.ended_at.is_some());
    }

    #[test]
    fn run_failed_records_error_message() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        store.ingest(&user_session(run_id));
        store.ingest(&StepEvent::run_failed(run_id, "s1", None, 0, "malformed_tool_call", "bad args"));
        let trace = store.get(run_id).unwrap();
        assert_eq!(trace.status, SpanStatus::Failed);
        assert_eq!(trace.error.as_deref(), Some("bad args"));
    }

    #[test]
    fn nested_run_links_to_parent_via_parent_run_id() {
        let store = TraceStore::new();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        store.ingest(&user_session(parent));
        store.ingest(&StepEvent::run_started(child, "s1", Some(parent), Some("inner".into()), 1, serde_json::json!({})));

        let tree = store.tree(parent);
        assert_eq!(tree.len(), 2);
        assert!(tree.iter().any(|t| t.run_id == child && t.parent_run_id == Some(parent)));
    }

    #[test]
    fn oldest_trace_evicted_once_capacity_exceeded() {
        let mut store = TraceStore::new();
        store.capacity = 2;
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.ingest(&user_session(*id));
        }
        assert!(store.get(ids[0]).is_none());
        assert!(store.get(ids[2]).is_some());
    }

    #[tokio::test]
    async fn subscriber_observes_span_and_close_updates() {
        let store = TraceStore::new();
        let run_id = Uuid::new_v4();
        let mut rx = store.subscribe(run_id);
        store.ingest(&user_session(run_id));
        let step = Step::assistant("s1", run_id, "hi", vec![], StepMetrics::default());
        store.ingest(&StepEvent::step_completed(run_id, "s1", 0, step));
        store.ingest(&StepEvent::run_completed(
            run_id,
            "s1",
            None,
            0,
            serde_json::json!({}),
            TerminationReason::Completed,
        ));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TraceUpdate::SpanRecorded(_)));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, TraceUpdate::TraceClosed(_)));
    }
}
