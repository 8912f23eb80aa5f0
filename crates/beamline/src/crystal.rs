//! Crystal beams: a fake end crystal whose beam targets a block.
//!
//! Simpler than the guardian: one fake entity at the start point, and
//! the beam's end is expressed as a target block in the crystal's
//! metadata. End positions are block-snapped on every assignment, so a
//! crystal beam's end never has a fractional component.

use beamline_protocol::{
    FakeEntity, FakeEntityKind, Packet, ProtocolAdapter, ProtocolError,
};
use beamline_world::Position;

use crate::BeamType;
use crate::beam::{Beam, BeamKind, Geometry};

/// A beam rendered by a fake end crystal targeting a block.
pub type CrystalBeam = Beam<Crystal>;

/// Kind state for a crystal beam. See [`CrystalBeam`].
pub struct Crystal {
    crystal: FakeEntity,
    spawn: Option<Packet>,
    metadata: Packet,
    destroy: Vec<Packet>,
}

impl Crystal {
    fn crystal_spawn(
        &mut self,
        adapter: &dyn ProtocolAdapter,
    ) -> Result<Packet, ProtocolError> {
        if let Some(packet) = &self.spawn {
            return Ok(packet.clone());
        }
        let packet = adapter.build_spawn_packet(&self.crystal)?;
        self.spawn = Some(packet.clone());
        Ok(packet)
    }

    fn rebuild_metadata(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        end: Position,
    ) -> Result<(), ProtocolError> {
        self.metadata = adapter.build_metadata_packet(
            self.crystal.id,
            adapter.crystal_metadata(end.block_pos())?,
        )?;
        Ok(())
    }
}

impl BeamKind for Crystal {
    const BEAM_TYPE: BeamType = BeamType::EnderCrystal;

    fn normalize_end(end: Position) -> Position {
        end.block_snapped()
    }

    fn init(
        adapter: &dyn ProtocolAdapter,
        geo: &Geometry,
    ) -> Result<Self, ProtocolError> {
        let crystal =
            adapter.spawn_fake_entity(FakeEntityKind::EnderCrystal, geo.start)?;
        let metadata = adapter.build_metadata_packet(
            crystal.id,
            adapter.crystal_metadata(geo.end.block_pos())?,
        )?;
        let destroy = adapter.build_destroy_packets(&[crystal.id])?;
        Ok(Self {
            crystal,
            spawn: None,
            metadata,
            destroy,
        })
    }

    fn start_packets(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        _seen_before: bool,
    ) -> Result<Vec<Option<Packet>>, ProtocolError> {
        Ok(vec![
            Some(self.crystal_spawn(adapter)?),
            Some(self.metadata.clone()),
        ])
    }

    fn destroy_packets(&self) -> Vec<Packet> {
        self.destroy.clone()
    }

    fn apply_move_start(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        geo: &mut Geometry,
        to: Position,
    ) -> Result<Vec<Packet>, ProtocolError> {
        geo.start = to;
        self.spawn = None;
        adapter.move_fake_entity(&mut self.crystal, to);
        Ok(vec![adapter.build_teleport_packet(self.crystal.id, to)?])
    }

    fn apply_move_end(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        geo: &mut Geometry,
        to: Position,
    ) -> Result<Vec<Packet>, ProtocolError> {
        let snapped = to.block_snapped();
        // Same block as the current end: nothing changes, nothing is
        // sent. Interpolated end moves rely on this — only the ticks
        // that cross a block boundary produce traffic.
        if snapped == geo.end {
            return Ok(Vec::new());
        }
        geo.end = snapped;
        self.rebuild_metadata(adapter, snapped)?;
        Ok(vec![self.metadata.clone()])
    }
}
