//! Coordinate spaces and identity types for Beamline.
//!
//! This crate is the leaf of the workspace: everything else (protocol,
//! viewers, beams) speaks in terms of these types, and they depend on
//! nothing but `serde`.
//!
//! - **Identity** ([`WorldId`], [`ObserverId`]) — newtype wrappers so a
//!   world id can never be passed where an observer id is expected.
//! - **Geometry** ([`Position`], [`BlockPos`]) — a point in one world's
//!   coordinate space, plus the integer block grid that crystal beams
//!   snap to.
//!
//! A beam's start and end must live in the same world; cross-world
//! geometry is invalid. That invariant is enforced by the beam layer —
//! the math here assumes it and documents where.

mod position;
mod types;

pub use position::{BlockPos, Position};
pub use types::{ObserverId, WorldId};
