//! Error types for the protocol layer.
//!
//! Two failure classes, matching two very different moments:
//!
//! - [`ProtocolError::Unavailable`] happens once, at startup, when the
//!   active server version's mappings can't supply everything an
//!   adapter needs. The whole beam subsystem is then disabled — every
//!   later beam construction fails fast instead of half-working.
//! - [`ProtocolError::OperationFailed`] happens at runtime when one
//!   specific packet build goes wrong. It is surfaced to the caller
//!   (and logged), and the task that triggered it self-cancels. There
//!   is no retry: a broken mapping needs a mapping fix, not patience.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The subsystem could not be initialized for the detected server
    /// version: a required mapping identifier or protocol object shape
    /// could not be resolved. Disables all beam creation.
    #[error("beam protocol support is unavailable: {0}")]
    Unavailable(String),

    /// A specific packet-construction operation failed at runtime.
    #[error("protocol operation `{op}` failed: {detail}")]
    OperationFailed {
        /// The adapter operation that failed (e.g. `build_spawn_packet`).
        op: &'static str,
        detail: String,
    },

    /// An externally supplied mapping table could not be parsed.
    #[error("invalid mapping table: {0}")]
    InvalidMappings(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Shorthand for an [`OperationFailed`](Self::OperationFailed).
    pub fn operation(op: &'static str, detail: impl Into<String>) -> Self {
        Self::OperationFailed {
            op,
            detail: detail.into(),
        }
    }
}
