//! Kind-specific behavior: crystal block snapping and guardian entity
//! following.

mod common;

use beamline::protocol::EntityId;
use beamline::viewer::TrackedEntity;
use beamline::world::{ObserverId, WorldId};
use beamline::{AnyBeam, BeamError, BeamType, CrystalBeam, GuardianBeam};
use common::*;

#[test]
fn test_crystal_end_is_block_snapped_at_construction() {
    let h = harness();
    let beam = CrystalBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.7, 64.2, 5.9),
        -1,
        -1,
    )
    .unwrap();
    let end = beam.end_position();
    assert_eq!((end.x, end.y, end.z), (10.0, 64.0, 5.0));
}

#[test]
fn test_crystal_move_end_same_block_is_a_noop() {
    let h = harness();
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = CrystalBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.2, 64.0, 5.7),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    let packets = drain(&mut rx);
    assert_eq!(spawns(&packets), 1);
    assert_eq!(metadata_updates(&packets), 1);

    // Different coordinates, same block: no packets, no state change.
    beam.move_end(pos(10.9, 64.4, 5.1)).unwrap();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(beam.end_position().x, 10.0);

    // A new block retargets the beam with a single metadata update.
    beam.move_end(pos(11.0, 64.0, 5.0)).unwrap();
    let packets = drain(&mut rx);
    assert_eq!(metadata_updates(&packets), 1);
    assert_eq!(spawns(&packets), 0);
    assert_eq!(beam.end_position().x, 11.0);
}

#[test]
fn test_crystal_move_start_teleports_the_crystal() {
    let h = harness();
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = CrystalBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.0, 64.0, 5.0),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    drain(&mut rx);

    beam.move_start(pos(3.0, 64.0, 0.0)).unwrap();
    assert_eq!(teleports(&drain(&mut rx)), 1);
    assert_eq!(beam.start_position().x, 3.0);
}

#[test]
fn test_beam_type_selector_builds_the_right_kind() {
    let h = harness();
    let beam = BeamType::EnderCrystal
        .create(&h.ctx, pos(0.0, 64.0, 0.0), pos(9.6, 64.0, 0.0), -1, -1)
        .unwrap();
    assert_eq!(beam.beam_type(), BeamType::EnderCrystal);
    assert_eq!(beam.end_position().x, 9.0);
    assert!(matches!(beam, AnyBeam::EnderCrystal(_)));

    let beam = BeamType::Guardian
        .create(&h.ctx, pos(0.0, 64.0, 0.0), pos(9.6, 64.0, 0.0), -1, -1)
        .unwrap();
    assert_eq!(beam.beam_type(), BeamType::Guardian);
    // Guardian ends are not snapped.
    assert_eq!(beam.end_position().x, 9.6);
}

#[test]
fn test_followed_entity_position_is_read_live() {
    let h = harness();
    let target = TrackedEntity::new(EntityId(900), pos(10.0, 64.0, 0.0), None);
    let beam = GuardianBeam::following(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        target.clone(),
        -1,
        8,
    )
    .unwrap();
    beam.start().unwrap();
    assert_eq!(beam.end_position().x, 10.0);

    // The host moves the entity between refreshes; the beam sees the
    // new position immediately, not a cached one.
    target.set_position(pos(200.0, 64.0, 0.0));
    assert_eq!(beam.end_position().x, 200.0);

    // Visibility follows the live end too.
    let mut rx = h.connect(1, pos(203.0, 64.0, 0.0));
    h.tick(1);
    assert!(spawns(&drain(&mut rx)) > 0);
    assert_eq!(beam.viewer_count(), 1);
}

#[test]
fn test_followed_observer_is_exempt_from_the_cutoff() {
    let h = harness();
    let avatar = TrackedEntity::new(
        EntityId(901),
        pos(1000.0, 64.0, 0.0),
        Some(ObserverId(7)),
    );
    let mut rx = h.connect(7, pos(1000.0, 64.0, 0.0));
    let beam = GuardianBeam::following(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        avatar,
        -1,
        8,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    // Far outside the 8-unit cutoff around the start, but the beam is
    // pointed at them.
    assert!(spawns(&drain(&mut rx)) > 0);
}

#[test]
fn test_follow_constructed_beam_spawns_no_squid_until_detach() {
    let h = harness();
    let target = TrackedEntity::new(EntityId(902), pos(10.0, 64.0, 0.0), None);
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = GuardianBeam::following(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        target,
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    let packets = drain(&mut rx);
    // Only the guardian: one spawn, its metadata, the team.
    assert_eq!(spawns(&packets), 1);
    assert_eq!(metadata_updates(&packets), 1);
    assert!(beam.end_entity().is_some());

    // Moving the end detaches the follow: the squid is spawned for
    // current viewers and the guardian retargets to it.
    beam.move_end(pos(15.0, 64.0, 0.0)).unwrap();
    let packets = drain(&mut rx);
    assert_eq!(spawns(&packets), 1);
    assert_eq!(metadata_updates(&packets), 2);
    assert!(beam.end_entity().is_none());
    assert_eq!(beam.end_position().x, 15.0);
}

#[test]
fn test_attach_end_entity_retargets_with_metadata_only() {
    let h = harness();
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = GuardianBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.0, 64.0, 0.0),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    drain(&mut rx);

    let target = TrackedEntity::new(EntityId(903), pos(30.0, 64.0, 0.0), None);
    beam.attach_end_entity(target).unwrap();
    let packets = drain(&mut rx);
    // A retarget is a metadata re-send, never a respawn.
    assert_eq!(metadata_updates(&packets), 1);
    assert_eq!(spawns(&packets), 0);
    assert_eq!(beam.end_position().x, 30.0);
}

#[test]
fn test_attach_rejects_entity_in_another_world() {
    let h = harness();
    let beam = GuardianBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.0, 64.0, 0.0),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    let elsewhere = TrackedEntity::new(
        EntityId(904),
        beamline::world::Position::new(WorldId(2), 0.0, 64.0, 0.0),
        None,
    );
    assert!(matches!(
        beam.attach_end_entity(elsewhere),
        Err(BeamError::InvalidArgument(_))
    ));
}

#[test]
fn test_color_change_resends_guardian_metadata() {
    let h = harness();
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = GuardianBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.0, 64.0, 0.0),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    drain(&mut rx);

    beam.call_color_change();
    assert_eq!(metadata_updates(&drain(&mut rx)), 1);
}

#[test]
fn test_guardian_move_start_shifts_both_fakes() {
    let h = harness();
    let mut rx = h.connect(1, pos(1.0, 64.0, 0.0));
    let beam = GuardianBeam::new(
        &h.ctx,
        pos(0.0, 64.0, 0.0),
        pos(10.0, 64.0, 0.0),
        -1,
        -1,
    )
    .unwrap();
    beam.start().unwrap();
    h.tick(1);
    drain(&mut rx);

    // The squid's anchor depends on the start (pull-back direction), so
    // both entities teleport.
    beam.move_start(pos(0.0, 70.0, 0.0)).unwrap();
    assert_eq!(teleports(&drain(&mut rx)), 2);
    assert_eq!(beam.start_position().y, 70.0);
}
