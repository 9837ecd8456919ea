//! Tool-call approval workflow — gates consent-requiring tools behind human
//! approval instead of granting or denying them unconditionally.
//!
//! A pending call waits on a `oneshot` channel until a human approves or
//! denies it through whatever surface the host exposes (a CLI prompt, a
//! dashboard button); `ApprovalPermissionManager` bridges that wait into
//! the `PermissionManager` contract the tool executor consults, bounded by
//! a timeout so a call is never blocked indefinitely.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use agentcore_domain::{ConsentResult, ExecutionContext, PermissionManager};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The decision made by a human reviewer.
#[derive(Debug)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: Option<String> },
}

/// A pending approval waiting for human review.
pub struct PendingApproval {
    pub id: Uuid,
    pub command: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
    pub respond: oneshot::Sender<ApprovalDecision>,
}

/// Serializable snapshot of a pending approval (for API responses / SSE events).
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalInfo {
    pub id: Uuid,
    pub command: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingApproval> for ApprovalInfo {
    fn from(p: &PendingApproval) -> Self {
        Self {
            id: p.id,
            command: p.command.clone(),
            session_key: p.session_key.clone(),
            created_at: p.created_at,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe store for pending exec approvals.
///
/// Each approval is associated with a `oneshot::Sender` that unblocks the
/// waiting `dispatch_exec` call when resolved.
pub struct ApprovalStore {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    timeout: Duration,
}

impl ApprovalStore {
    /// Create a new store with the given approval timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// The configured approval timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Insert a pending approval. Returns the serializable info snapshot.
    pub fn insert(&self, approval: PendingApproval) -> ApprovalInfo {
        let info = ApprovalInfo::from(&approval);
        self.pending.write().insert(approval.id, approval);
        info
    }

    /// Resolve a pending approval as approved. Returns `true` if found.
    pub fn approve(&self, id: &Uuid) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Approved);
            return true;
        }
        false
    }

    /// Resolve a pending approval as denied. Returns `true` if found.
    pub fn deny(&self, id: &Uuid, reason: Option<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Denied { reason });
            return true;
        }
        false
    }

    /// Remove a timed-out approval (called when the receiver times out).
    pub fn remove_expired(&self, id: &Uuid) {
        self.pending.write().remove(id);
    }

    /// List all currently pending approvals (for dashboard introspection).
    pub fn list_pending(&self) -> Vec<ApprovalInfo> {
        self.pending
            .read()
            .values()
            .map(ApprovalInfo::from)
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PermissionManager bridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A `PermissionManager` that suspends each consent-requiring call behind
/// `ApprovalStore` until a human resolves it or `timeout` elapses, at
/// which point the call is treated as denied.
pub struct ApprovalPermissionManager {
    store: ApprovalStore,
}

impl ApprovalPermissionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            store: ApprovalStore::new(timeout),
        }
    }

    pub fn store(&self) -> &ApprovalStore {
        &self.store
    }
}

#[async_trait]
impl PermissionManager for ApprovalPermissionManager {
    async fn check(
        &self,
        _user_id: Option<&str>,
        tool_name: &str,
        args: &Value,
        ctx: &ExecutionContext,
        timeout: Duration,
    ) -> ConsentResult {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let command = format!("{tool_name} {args}");
        self.store.insert(PendingApproval {
            id,
            command,
            session_key: ctx.session_id.clone(),
            created_at: Utc::now(),
            respond: tx,
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(ApprovalDecision::Approved)) => ConsentResult::allow(),
            Ok(Ok(ApprovalDecision::Denied { reason })) => {
                ConsentResult::deny(reason.unwrap_or_else(|| "denied by reviewer".to_string()))
            }
            Ok(Err(_)) => ConsentResult::deny("approval channel closed without a decision"),
            Err(_) => {
                self.store.remove_expired(&id);
                ConsentResult::deny("approval timed out")
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
