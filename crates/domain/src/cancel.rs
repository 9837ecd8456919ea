use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, checkable one-way cancellation flag. Cheap to clone and to
/// poll; never suspends. `AgentExecutor`/`ToolExecutor` check it at every
/// loop boundary rather than relying on being interrupted.
///
/// This is the bare flag only. Cascading cancellation across a tree of
/// nested runs (so cancelling a parent cancels every in-flight child) is a
/// registry built on top of this type, not part of it.
#[derive(Clone, Default)]
pub struct AbortSignal {
    cancelled: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
