use thiserror::Error;

/// Errors raised while reading a snapshot or configuration.
///
/// The layout pipeline itself has no recoverable failure modes; everything
/// here is detected before the first stage runs.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Duplicate pin id: {0}")]
    DuplicatePin(String),

    #[error("Link {from} -> {to} joins two {direction} pins")]
    MismatchedLink {
        from: String,
        to: String,
        direction: &'static str,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
