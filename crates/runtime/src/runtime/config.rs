use std::time::Duration;

/// Bounds and timeouts for one `AgentExecutor` loop. Built in code by the
/// host, not loaded from a file — there is no hot-reloadable config layer
/// in this crate.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard ceiling on assistant-turn iterations of the LLM/tool loop.
    pub max_steps: u32,
    /// Cumulative token ceiling across the run, checked after each step.
    pub max_tokens: Option<u32>,
    /// How many nested `Runnable` levels an `AgentTool` chain may reach
    /// before `max_depth_exceeded` is returned instead of recursing.
    pub max_depth: u32,
    /// Upper bound on tool calls from a single assistant step dispatched
    /// concurrently.
    pub max_concurrent_tools: usize,
    /// How long a consent-requiring tool call waits on the
    /// `PermissionManager` before the call is treated as denied.
    pub consent_timeout: Duration,
    /// Whether a run that terminates on `max_steps`/`max_tokens` gets one
    /// extra non-tool-calling LLM turn to summarize what happened so far.
    pub termination_summary: bool,
}

/// Default iteration ceiling for the assistant/tool loop.
pub const DEFAULT_MAX_TOOL_LOOPS: u32 = 25;

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_TOOL_LOOPS,
            max_tokens: None,
            max_depth: 5,
            max_concurrent_tools: 8,
            consent_timeout: Duration::from_secs(300),
            termination_summary: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_expected_loop_ceiling() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.max_steps, 25);
        assert_eq!(cfg.max_depth, 5);
        assert!(cfg.termination_summary);
    }
}
