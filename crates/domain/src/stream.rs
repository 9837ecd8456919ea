use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for model streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// A chunk of a streamed model response (provider-agnostic).
///
/// Tool calls arrive as sparse, index-addressed fragments: a provider may
/// interleave partial argument strings for several calls in one response
/// before any of them is complete. `index` is the only stable key across
/// fragments — `call_id`/`tool_name` are not guaranteed to be present on
/// the first fragment of a given index.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// Model is "thinking" — provider-specific, surfaced for UIs that show it.
    #[serde(rename = "thinking")]
    Thinking { text: String },

    /// A tool-call fragment at the given index. `call_id`/`tool_name` are set
    /// once (the first time the provider includes them) and never change
    /// thereafter; `arguments_delta` is appended to whatever has accumulated
    /// so far for this index.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        index: u32,
        call_id: Option<String>,
        tool_name: Option<String>,
        #[serde(default)]
        arguments_delta: String,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
