//! Sequence allocation, best-effort persistence, and `STEP_COMPLETED`
//! emission for finalized steps.
//!
//! Sequence allocation is delegated to the session store itself
//! (`SessionStore::next_sequence`) rather than kept in a counter local to
//! this pipeline: a session spans multiple runs, and a nested agent
//! invoked as a tool of another gets its own `StepPipeline` entirely, but
//! both pipelines share the same store. Allocating from the store is what
//! keeps the counter authoritative (I-3, P8) across all of that, instead
//! of each pipeline instance restarting its own count at one.

use std::sync::Arc;

use uuid::Uuid;

use agentcore_domain::{SessionStore, Step, StepEvent, TraceEvent, Wire};

pub struct StepPipeline {
    store: Arc<dyn SessionStore>,
}

impl StepPipeline {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Assigns the step's sequence number, persists it (best-effort — a
    /// store failure is logged via `TraceEvent::PersistenceFailed` and
    /// never propagated into the run), and emits `STEP_COMPLETED` on the
    /// wire. Returns the finalized step.
    pub async fn commit(&self, wire: &Wire, run_id: Uuid, depth: u32, mut step: Step) -> Step {
        let sequence = match self.store.next_sequence(&step.session_id).await {
            Ok(seq) => seq,
            Err(e) => {
                TraceEvent::PersistenceFailed {
                    session_id: step.session_id.clone(),
                    operation: "next_sequence".into(),
                    reason: e.to_string(),
                }
                .emit();
                0
            }
        };
        step.assign_sequence(sequence);

        if let Err(e) = self.store.save_step(step.clone()).await {
            TraceEvent::PersistenceFailed {
                session_id: step.session_id.clone(),
                operation: "save_step".into(),
                reason: e.to_string(),
            }
            .emit();
        }

        let event = StepEvent::step_completed(run_id, step.session_id.clone(), depth, step.clone());
        let _ = wire.write(event).await;
        step
    }
}
