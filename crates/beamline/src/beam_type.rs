//! The beam kind selector and a kind-erased beam handle.

use beamline_world::Position;

use crate::{BeamContext, BeamError, CrystalBeam, GuardianBeam};

/// The two beam kinds, as a plain tag for instantiation from external
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeamType {
    /// A guardian's attack beam. Can point at precise coordinates and
    /// can follow live entities
    /// ([`GuardianBeam::attach_end_entity`]).
    Guardian,
    /// An end crystal's beam. Start and end are block-snapped.
    EnderCrystal,
}

impl BeamType {
    /// Constructs the beam kind this tag names.
    pub fn create(
        self,
        ctx: &BeamContext,
        start: Position,
        end: Position,
        duration: i32,
        distance: i32,
    ) -> Result<AnyBeam, BeamError> {
        match self {
            BeamType::Guardian => Ok(AnyBeam::Guardian(GuardianBeam::new(
                ctx, start, end, duration, distance,
            )?)),
            BeamType::EnderCrystal => Ok(AnyBeam::EnderCrystal(
                CrystalBeam::new(ctx, start, end, duration, distance)?,
            )),
        }
    }
}

/// A beam of either kind, for callers that pick the kind at runtime.
/// Delegates the kind-independent API; kind-specific operations (entity
/// following, color cycling) require matching out the concrete beam.
pub enum AnyBeam {
    Guardian(GuardianBeam),
    EnderCrystal(CrystalBeam),
}

macro_rules! delegate {
    ($self:ident, $beam:ident => $body:expr) => {
        match $self {
            AnyBeam::Guardian($beam) => $body,
            AnyBeam::EnderCrystal($beam) => $body,
        }
    };
}

impl AnyBeam {
    pub fn beam_type(&self) -> BeamType {
        delegate!(self, beam => beam.beam_type())
    }

    pub fn duration_in_ticks(self) -> Self {
        match self {
            AnyBeam::Guardian(beam) => {
                AnyBeam::Guardian(beam.duration_in_ticks())
            }
            AnyBeam::EnderCrystal(beam) => {
                AnyBeam::EnderCrystal(beam.duration_in_ticks())
            }
        }
    }

    pub fn on_complete(&self, callback: impl FnOnce() + Send + 'static) {
        delegate!(self, beam => beam.on_complete(callback))
    }

    pub fn start(&self) -> Result<(), BeamError> {
        delegate!(self, beam => beam.start())
    }

    pub fn stop(&self) -> Result<(), BeamError> {
        delegate!(self, beam => beam.stop())
    }

    pub fn is_started(&self) -> bool {
        delegate!(self, beam => beam.is_started())
    }

    pub fn start_position(&self) -> Position {
        delegate!(self, beam => beam.start_position())
    }

    pub fn end_position(&self) -> Position {
        delegate!(self, beam => beam.end_position())
    }

    pub fn viewer_count(&self) -> usize {
        delegate!(self, beam => beam.viewer_count())
    }

    pub fn move_start(&self, to: Position) -> Result<(), BeamError> {
        delegate!(self, beam => beam.move_start(to))
    }

    pub fn move_end(&self, to: Position) -> Result<(), BeamError> {
        delegate!(self, beam => beam.move_end(to))
    }

    pub fn move_start_over(
        &self,
        to: Position,
        ticks: u32,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), BeamError> {
        delegate!(self, beam => beam.move_start_over(to, ticks, on_done))
    }

    pub fn move_end_over(
        &self,
        to: Position,
        ticks: u32,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), BeamError> {
        delegate!(self, beam => beam.move_end_over(to, ticks, on_done))
    }
}
