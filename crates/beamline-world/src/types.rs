//! Identity newtypes shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a world (one coordinate space on the server).
///
/// Newtype wrapper over `u64`: you can't accidentally pass a `WorldId`
/// where an [`ObserverId`] is expected, even though both are `u64`
/// underneath. `#[serde(transparent)]` serializes it as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub u64);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W-{}", self.0)
    }
}

/// A unique identifier for a connected observer (a participant able to
/// perceive beams and receive packets).
///
/// Observers are managed by the host server; beamline only ever sees
/// their ids, live positions, and send channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O-{}", self.0)
    }
}
