//! Guardian beams: a fake guardian aiming its attack beam at a fake
//! squid (or at a real, followed entity).
//!
//! The guardian is the visible part; the squid is an invisible pointer
//! parked at the end point for the guardian to aim at. Both are grouped
//! in a collision-exempt team so the client doesn't shove them apart.
//! A beam can instead follow a live entity: the guardian is retargeted
//! at that entity's id and the squid goes unused until the end point is
//! moved explicitly, which detaches the follow and brings the squid
//! back.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

use beamline_protocol::{
    EntityId, FakeEntity, FakeEntityKind, Packet, ProtocolAdapter,
    ProtocolError,
};
use beamline_viewer::TrackedEntity;
use beamline_world::{ObserverId, Position};

use crate::beam::{Beam, BeamKind, Geometry};
use crate::{BeamContext, BeamError, BeamType};

/// A beam rendered by a fake guardian's attack animation.
pub type GuardianBeam = Beam<Guardian>;

// Team names only need to be unique per server session; a random seed
// keeps them from colliding with a previous session's teams that
// clients may still have cached.
static TEAM_SEQ: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::rng().random_range(0..u32::MAX / 2)));

fn next_team_name() -> String {
    format!("noclip{}", TEAM_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// The visual anchor points, nudged from the logical endpoints.
///
/// The guardian's beam originates from its eye, half a unit above its
/// position, so both anchors sit half a unit below the endpoints; the
/// squid is additionally pulled one unit back along the beam so the
/// beam visually reaches the end point instead of stopping inside the
/// squid. A degenerate beam (start == end) gets a zero pull-back
/// instead of NaN coordinates.
fn corrected(geo: &Geometry) -> (Position, Position) {
    let start = geo.start.offset(0.0, -0.5, 0.0);
    let mut end = geo.end.offset(0.0, -0.5, 0.0);
    let (dx, dy, dz) = start.direction_to(&end);
    end = end.offset(-dx, -dy, -dz);
    (start, end)
}

/// Kind state for a guardian beam. See [`GuardianBeam`].
pub struct Guardian {
    guardian: FakeEntity,
    squid: FakeEntity,
    /// False while the beam follows an entity that was attached at
    /// construction: those viewers were never shown the squid, and it
    /// is spawned for them on detach.
    squid_active: bool,
    follow: Option<TrackedEntity>,
    // Cached packets. Spawn caches are invalidated by endpoint moves;
    // the guardian metadata cache is rebuilt on every retarget.
    spawn_guardian: Option<Packet>,
    spawn_squid: Option<Packet>,
    metadata_guardian: Packet,
    metadata_squid: Packet,
    team_packet: Packet,
    destroy: Vec<Packet>,
}

impl Guardian {
    fn guardian_spawn(
        &mut self,
        adapter: &dyn ProtocolAdapter,
    ) -> Result<Packet, ProtocolError> {
        if let Some(packet) = &self.spawn_guardian {
            return Ok(packet.clone());
        }
        let packet = adapter.build_spawn_packet(&self.guardian)?;
        self.spawn_guardian = Some(packet.clone());
        Ok(packet)
    }

    fn squid_spawn(
        &mut self,
        adapter: &dyn ProtocolAdapter,
    ) -> Result<Packet, ProtocolError> {
        if let Some(packet) = &self.spawn_squid {
            return Ok(packet.clone());
        }
        let packet = adapter.build_spawn_packet(&self.squid)?;
        self.spawn_squid = Some(packet.clone());
        Ok(packet)
    }

    /// Points the guardian's attack at a new entity id and rebuilds the
    /// cached metadata packet.
    fn retarget(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        target: EntityId,
    ) -> Result<(), ProtocolError> {
        self.metadata_guardian = adapter.build_metadata_packet(
            self.guardian.id,
            adapter.guardian_metadata(target)?,
        )?;
        Ok(())
    }

    fn begin_following(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        target: TrackedEntity,
    ) -> Result<(), ProtocolError> {
        self.retarget(adapter, target.entity_id)?;
        self.follow = Some(target);
        self.squid_active = false;
        Ok(())
    }

    fn attach(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        target: TrackedEntity,
    ) -> Result<Packet, ProtocolError> {
        self.retarget(adapter, target.entity_id)?;
        self.follow = Some(target);
        Ok(self.metadata_guardian.clone())
    }
}

impl BeamKind for Guardian {
    const BEAM_TYPE: BeamType = BeamType::Guardian;

    fn init(
        adapter: &dyn ProtocolAdapter,
        geo: &Geometry,
    ) -> Result<Self, ProtocolError> {
        let (anchor_start, anchor_end) = corrected(geo);
        let guardian =
            adapter.spawn_fake_entity(FakeEntityKind::Guardian, anchor_start)?;
        let squid =
            adapter.spawn_fake_entity(FakeEntityKind::Squid, anchor_end)?;
        let metadata_guardian = adapter.build_metadata_packet(
            guardian.id,
            adapter.guardian_metadata(squid.id)?,
        )?;
        let metadata_squid = adapter
            .build_metadata_packet(squid.id, adapter.squid_metadata()?)?;
        let team_packet = adapter
            .build_team_packet(&next_team_name(), &[squid.uuid, guardian.uuid])?;
        let destroy = adapter.build_destroy_packets(&[squid.id, guardian.id])?;
        Ok(Self {
            guardian,
            squid,
            squid_active: true,
            follow: None,
            spawn_guardian: None,
            spawn_squid: None,
            metadata_guardian,
            metadata_squid,
            team_packet,
            destroy,
        })
    }

    fn live_end(&self, geo: &Geometry) -> Position {
        match &self.follow {
            Some(target) => target.live_position(),
            None => geo.end,
        }
    }

    fn always_visible_to(&self) -> Option<ObserverId> {
        self.follow.as_ref().and_then(|target| target.observer)
    }

    fn start_packets(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        seen_before: bool,
    ) -> Result<Vec<Option<Packet>>, ProtocolError> {
        let guardian_spawn = self.guardian_spawn(adapter)?;
        let squid_spawn = if self.squid_active {
            Some(self.squid_spawn(adapter)?)
        } else {
            None
        };
        Ok(vec![
            Some(guardian_spawn),
            squid_spawn,
            Some(self.metadata_guardian.clone()),
            self.squid_active.then(|| self.metadata_squid.clone()),
            (!seen_before).then(|| self.team_packet.clone()),
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
        // The end anchor's pull-back depends on the start, so both
        // anchors shift.
        let (anchor_start, anchor_end) = corrected(geo);
        self.spawn_guardian = None;
        adapter.move_fake_entity(&mut self.guardian, anchor_start);
        let mut packets =
            vec![adapter.build_teleport_packet(self.guardian.id, anchor_start)?];
        if self.squid_active {
            self.spawn_squid = None;
            adapter.move_fake_entity(&mut self.squid, anchor_end);
            packets
                .push(adapter.build_teleport_packet(self.squid.id, anchor_end)?);
        }
        Ok(packets)
    }

    fn apply_move_end(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        geo: &mut Geometry,
        to: Position,
    ) -> Result<Vec<Packet>, ProtocolError> {
        geo.end = to;
        let (_, anchor_end) = corrected(geo);
        self.spawn_squid = None;
        adapter.move_fake_entity(&mut self.squid, anchor_end);
        let mut packets = Vec::new();
        if self.squid_active {
            packets
                .push(adapter.build_teleport_packet(self.squid.id, anchor_end)?);
        } else {
            // Current viewers have never been shown the squid; spawn it
            // for them before aiming at it.
            self.squid_active = true;
            packets.push(self.squid_spawn(adapter)?);
            packets.push(self.metadata_squid.clone());
        }
        // Moving the end explicitly detaches any followed entity.
        if self.follow.take().is_some() {
            self.retarget(adapter, self.squid.id)?;
            packets.push(self.metadata_guardian.clone());
        }
        Ok(packets)
    }
}

impl GuardianBeam {
    /// Creates a guardian beam that follows a live entity: every
    /// refresh reads the target's position as the beam's end, and the
    /// guardian aims at the entity directly — the clients animate the
    /// tracking, at no per-tick cost here.
    pub fn following(
        ctx: &BeamContext,
        start: Position,
        target: TrackedEntity,
        duration: i32,
        distance: i32,
    ) -> Result<Self, BeamError> {
        if target.world != start.world {
            return Err(BeamError::invalid(
                "followed entity is not in the beam's world",
            ));
        }
        let end = target.live_position();
        let beam: Self = Beam::new(ctx, start, end, duration, distance)?;
        {
            let mut guard = beam.lock();
            guard
                .kind
                .begin_following(beam.ctx.adapter().as_ref(), target)?;
        }
        Ok(beam)
    }

    /// Makes the beam follow a live entity, overriding any static end
    /// position. The guardian is retargeted via a metadata re-send, not
    /// a respawn.
    pub fn attach_end_entity(
        &self,
        target: TrackedEntity,
    ) -> Result<(), BeamError> {
        let mut guard = self.lock();
        if target.world != guard.geo.start.world {
            return Err(BeamError::invalid(
                "attached entity is not in the beam's world",
            ));
        }
        let packet = guard
            .kind
            .attach(self.ctx.adapter().as_ref(), target)?;
        let recipients = Self::viewer_snapshots(&guard, &self.ctx);
        drop(guard);
        for snap in recipients {
            snap.deliver_one(packet.clone());
        }
        Ok(())
    }

    /// The entity the beam currently follows, if any.
    pub fn end_entity(&self) -> Option<TrackedEntity> {
        self.lock().kind.follow.clone()
    }

    /// Re-sends the guardian's metadata to every current viewer, which
    /// makes clients restart the beam animation (a visible color cycle).
    pub fn call_color_change(&self) {
        let guard = self.lock();
        let packet = guard.kind.metadata_guardian.clone();
        let recipients = Self::viewer_snapshots(&guard, &self.ctx);
        drop(guard);
        for snap in recipients {
            snap.deliver_one(packet.clone());
        }
    }
}
