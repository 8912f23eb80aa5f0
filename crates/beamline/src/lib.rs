//! Beamline: laser-like visual beams drawn with raw packet injection.
//!
//! A beam is a purely client-side illusion: fake guardian or end-crystal
//! entities are spawned on observers' clients by sending hand-built
//! protocol payloads, and the clients render the entities' beam
//! animations between the two endpoints. Nothing exists in the
//! authoritative world state.
//!
//! # Getting started
//!
//! Resolve a [`BeamContext`] once at startup (this is where protocol
//! support for the detected server version is validated), then build
//! beams from it:
//!
//! ```no_run
//! use beamline::{BeamContext, GuardianBeam};
//! use beamline::tick::{Scheduler, TickConfig};
//! use beamline::viewer::ObserverRegistry;
//! use beamline::world::{Position, WorldId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(TickConfig::default());
//! scheduler.spawn_driver();
//! let observers = ObserverRegistry::new();
//! let ctx = BeamContext::resolve("1.20.4".parse()?, observers, scheduler)?;
//!
//! let start = Position::new(WorldId(1), 0.0, 64.0, 0.0);
//! let end = Position::new(WorldId(1), 20.0, 64.0, 0.0);
//! let beam = GuardianBeam::new(&ctx, start, end, 10, 64)?;
//! beam.on_complete(|| tracing::info!("beam finished"));
//! beam.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! The beam then runs for 10 seconds, showing and hiding itself for
//! observers within 64 units of either endpoint, and tears itself down.

mod beam;
mod beam_type;
mod context;
mod crystal;
mod error;
mod guardian;

pub use beam::{Beam, BeamKind, Geometry};
pub use beam_type::{AnyBeam, BeamType};
pub use context::BeamContext;
pub use crystal::{Crystal, CrystalBeam};
pub use error::BeamError;
pub use guardian::{Guardian, GuardianBeam};

// The sibling crates, re-exported so downstream callers need only one
// dependency.
pub use beamline_protocol as protocol;
pub use beamline_tick as tick;
pub use beamline_viewer as viewer;
pub use beamline_world as world;
