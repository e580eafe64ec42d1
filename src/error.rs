//! Error taxonomy for the rendering pipeline.

/// Errors a backend render can fail with.
///
/// None of these escape [`crate::service::DiagramRenderer`]: they are turned
/// into an inline message or a silent no-op at that boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Transport failure or non-success response from the remote server.
    #[error("network error: {0}")]
    Network(String),
    /// The remote server cannot produce the requested format.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    /// The local engine exited abnormally.
    #[error("engine exited with {}: {stderr}", exit_code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    Process {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Engine path or other settings are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The engine or its runtime could not be spawned.
    #[error("command not found: {0}")]
    CommandNotFound(String),
    /// The engine closed its output without writing anything.
    #[error("engine produced no output")]
    NoOutput,
    /// A backend deadline elapsed.
    #[error("render timed out after {0}ms")]
    Timeout(u64),
    /// Cache store I/O failure. Logged, never surfaced to callers.
    #[error("cache error: {0}")]
    Cache(String),
}

impl RenderError {
    /// Message to show inside the target surface, for the errors a user
    /// should see there.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            RenderError::UnsupportedFeature(message) => Some(message),
            _ => None,
        }
    }
}
