//! Observer registry and packet delivery for the Beamline workspace.
//!
//! This crate owns the boundary between beams and the host platform's
//! network stack: each connected observer is a registry entry with a
//! position and an unbounded packet channel. Beams snapshot the
//! registry per refresh and push payloads through the channels; the
//! host encodes and flushes on its side.

mod error;
mod registry;

pub use error::ViewerError;
pub use registry::{
    ObserverRegistry, ObserverSnapshot, PacketSender, TrackedEntity,
};
