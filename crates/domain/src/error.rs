/// Shared error type used across the execution core crates.
///
/// Reserved for failures the core cannot locally recover from. Run-level
/// outcomes a model or tool can react to (malformed arguments, a denied
/// tool, a run that hit its step budget) are *not* represented here — they
/// travel as data on `ToolResult` and `StepEvent`, never as an `Error`
/// variant, so the happy path of the executor never has to downcast an
/// error to decide whether a run actually failed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
