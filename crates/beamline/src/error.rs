//! Error types for the beam layer.

use beamline_protocol::ProtocolError;

/// Errors that can occur while constructing or driving a beam.
///
/// Construction-time failures abort beam creation entirely — no
/// partially constructed beam is ever returned. Failures inside a
/// running task terminate that task only; other tasks and other beams
/// are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum BeamError {
    /// The protocol layer failed (startup resolution or a packet build).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `start` was called on a beam that already ran. Beams are
    /// single-use; construct a new one instead.
    #[error("beam has already been started")]
    AlreadyStarted,

    /// The operation needs a started beam (`stop`, interpolated moves).
    #[error("beam has not been started")]
    NotStarted,

    /// A caller-supplied argument is out of contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BeamError {
    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }
}
