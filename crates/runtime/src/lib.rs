//! The execution core's runtime: the Step Pipeline, Run Lifecycle,
//! AgentExecutor, ToolExecutor, Runnable/AgentTool, and Trace Collector
//! built on top of `agentcore-domain`'s data model and `agentcore-sessions`'
//! store implementations.
//!
//! Everything here is a library the host process links against — there is
//! no HTTP surface, no config loader, no provider adapter. Those are
//! supplied by the host through the traits in `agentcore_domain::adapters`.

pub mod runtime;

pub use runtime::agent_tool::AgentTool;
pub use runtime::approval::{ApprovalDecision, ApprovalInfo, ApprovalPermissionManager, ApprovalStore, PendingApproval};
pub use runtime::cancel::{CancelMap, CancelToken};
pub use runtime::config::ExecutorConfig;
pub use runtime::executor::AgentExecutor;
pub use runtime::lifecycle::run_lifecycle;
pub use runtime::runnable::{Agent, Runnable};
pub use runtime::step_pipeline::StepPipeline;
pub use runtime::tool_executor::ToolExecutor;
pub use runtime::tool_registry::ToolRegistry;
pub use runtime::trace::{Span, SpanKind, SpanStatus, Trace, TraceStore};
