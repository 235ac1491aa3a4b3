use thiserror::Error;

/// Typed error hierarchy for the bridge.
///
/// Use at module boundaries (media store, webhook dispatch, config validation).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
///
/// None of these are fatal to the process. Every failure is isolated to the
/// message that produced it and surfaced through logs.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Media download failed: {0}")]
    Download(String),

    #[error("Webhook returned {status}: {body}")]
    Dispatch { status: u16, body: String },

    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Invalid webhook response: {0}")]
    ResponseParse(String),

    #[error("Message deletion failed: {0}")]
    Deletion(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    /// Short label used as a structured field in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Download(_) => "download",
            Self::Dispatch { .. } | Self::Transport(_) => "dispatch",
            Self::ResponseParse(_) => "response_parse",
            Self::Deletion(_) => "deletion",
            Self::Internal(_) => "internal",
        }
    }
}
