//! Data model and external-interface contracts for the agent execution
//! core: steps, events, execution contexts, the wire, and the traits a
//! host must implement (model adapter, tool, session store, permission
//! manager) to drive it.

pub mod adapters;
pub mod cancel;
pub mod context;
pub mod error;
pub mod event;
pub mod run_output;
pub mod step;
pub mod stream;
pub mod tool;
pub mod trace;
pub mod wire;

pub use adapters::{AlwaysAllow, ConsentResult, ModelAdapter, PermissionManager, SessionStore, Tool};
pub use cancel::AbortSignal;
pub use context::{ContextMetadata, ExecutionContext, NestingType, RunnableType};
pub use error::{Error, Result};
pub use event::{EventType, StepEvent, TerminationReason};
pub use run_output::{RunError, RunOutput};
pub use step::{Step, StepDelta, StepMetrics, ToolCallFragmentDelta};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition, ToolResult};
pub use trace::TraceEvent;
pub use wire::{Wire, WireError, WireSender, DEFAULT_CAPACITY};
