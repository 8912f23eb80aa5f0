//! The protocol adapter: version-specific packet construction.
//!
//! All protocol-version branching in the workspace lives behind
//! [`ProtocolAdapter`]. The beam layer states intents ("spawn this fake
//! guardian", "retarget that crystal") and the adapter turns them into
//! payloads the active server version's clients accept.
//!
//! Two implementations, one per version family, selected once at
//! startup by [`resolve_adapter`]:
//!
//! - [`LegacyAdapter`] — majors 9–16. Spawn packets carry raw type
//!   codes from the mapping; the living-spawn shape embeds metadata
//!   through 1.14.
//! - [`ModernAdapter`] — majors 17+. Spawn packets are derived from an
//!   in-memory [`FakeEntity`] and name types via registry identifiers;
//!   1.17.0 has a one-id-per-destroy-packet quirk; 1.19+ folds living
//!   spawns into the plain spawn shape.
//!
//! If the resolved mappings can't supply an identifier the family
//! needs, adapter construction fails with
//! [`ProtocolError::Unavailable`] and the whole subsystem stays
//! disabled — a half-working beam API is worse than none.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use beamline_world::{BlockPos, Position};

use crate::mappings::{ProtocolMappings, ServerVersion};
use crate::types::{
    EntityId, EntityTypeRef, FakeEntity, FakeEntityKind, MetadataEntry,
    Packet, WatcherValue, angle_to_byte, generate_entity_id,
};
use crate::ProtocolError;

/// Numeric end-crystal type code on versions before 1.13.
const LEGACY_CRYSTAL_TYPE_ID: i32 = 51;

/// Invisibility bit in the entity shared-flags byte.
const FLAG_INVISIBLE: u8 = 0x20;

// ---------------------------------------------------------------------------
// Capability interface
// ---------------------------------------------------------------------------

/// Builds protocol payloads for one server version family.
///
/// Implementations are stateless beyond their resolved mappings and are
/// shared (`Arc`) by every beam in the process.
pub trait ProtocolAdapter: Send + Sync {
    /// The server version this adapter was resolved for.
    fn version(&self) -> ServerVersion;

    /// The mapping table in effect.
    fn mappings(&self) -> &ProtocolMappings;

    /// Creates an in-memory fake entity at a position. No observer is
    /// notified; a spawn packet must be built and delivered separately.
    fn spawn_fake_entity(
        &self,
        kind: FakeEntityKind,
        position: Position,
    ) -> Result<FakeEntity, ProtocolError> {
        Ok(FakeEntity {
            id: generate_entity_id(),
            uuid: Uuid::new_v4(),
            kind,
            position,
        })
    }

    /// Updates the in-memory entity's position. Cached packets derived
    /// from the old position are the caller's to invalidate.
    fn move_fake_entity(&self, entity: &mut FakeEntity, position: Position) {
        entity.position = position;
    }

    /// Spawn packet for a fake entity.
    fn build_spawn_packet(
        &self,
        entity: &FakeEntity,
    ) -> Result<Packet, ProtocolError>;

    /// Destroy packet(s) for a set of entity ids. Usually one packet;
    /// some versions require one packet per id.
    fn build_destroy_packets(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<Packet>, ProtocolError>;

    /// Metadata packet from already-built entries.
    fn build_metadata_packet(
        &self,
        entity_id: EntityId,
        entries: Vec<MetadataEntry>,
    ) -> Result<Packet, ProtocolError> {
        Ok(Packet::SetMetadata { entity_id, entries })
    }

    /// Absolute teleport packet.
    fn build_teleport_packet(
        &self,
        entity_id: EntityId,
        position: Position,
    ) -> Result<Packet, ProtocolError> {
        Ok(Packet::Teleport {
            entity_id,
            x: position.x,
            y: position.y,
            z: position.z,
            yaw: angle_to_byte(position.yaw),
            pitch: angle_to_byte(position.pitch),
            on_ground: true,
        })
    }

    /// Team-create packet grouping entities under a never-collide rule.
    fn build_team_packet(
        &self,
        name: &str,
        members: &[Uuid],
    ) -> Result<Packet, ProtocolError> {
        Ok(Packet::CreateTeam {
            name: name.to_string(),
            collision_rule: "never".to_string(),
            members: members.to_vec(),
        })
    }

    /// Synced-data entries for a beam-firing guardian: invisible,
    /// spikes retracted, aiming at `target`.
    fn guardian_metadata(
        &self,
        target: EntityId,
    ) -> Result<Vec<MetadataEntry>, ProtocolError> {
        let m = self.mappings();
        Ok(vec![
            MetadataEntry::new(
                &m.watcher_flags,
                WatcherValue::Byte(FLAG_INVISIBLE),
            ),
            MetadataEntry::new(&m.watcher_spikes, WatcherValue::Bool(false)),
            MetadataEntry::new(
                &m.watcher_target_entity,
                WatcherValue::VarInt(target.0),
            ),
        ])
    }

    /// Synced-data entries for the invisible squid pointer.
    fn squid_metadata(&self) -> Result<Vec<MetadataEntry>, ProtocolError> {
        Ok(vec![MetadataEntry::new(
            &self.mappings().watcher_flags,
            WatcherValue::Byte(FLAG_INVISIBLE),
        )])
    }

    /// Synced-data entries for a crystal beaming at a block, base plate
    /// hidden.
    fn crystal_metadata(
        &self,
        target: BlockPos,
    ) -> Result<Vec<MetadataEntry>, ProtocolError> {
        let m = self.mappings();
        Ok(vec![
            MetadataEntry::new(
                &m.watcher_target_location,
                WatcherValue::OptBlockPos(Some(target)),
            ),
            MetadataEntry::new(&m.watcher_base_plate, WatcherValue::Bool(false)),
        ])
    }
}

/// Resolves the adapter for a detected server version.
///
/// This is the subsystem's single startup gate: called once, and on
/// failure every later beam construction fails fast with the same
/// [`ProtocolError::Unavailable`].
pub fn resolve_adapter(
    version: ServerVersion,
) -> Result<Arc<dyn ProtocolAdapter>, ProtocolError> {
    let resolved = ProtocolMappings::resolve(version);
    resolve_adapter_with(version, resolved.mappings)
}

/// Like [`resolve_adapter`] but with an externally supplied mapping
/// table (a deployment override, see [`ProtocolMappings::from_json`]).
pub fn resolve_adapter_with(
    version: ServerVersion,
    mappings: ProtocolMappings,
) -> Result<Arc<dyn ProtocolAdapter>, ProtocolError> {
    let adapter: Arc<dyn ProtocolAdapter> = if version.major >= 17 {
        Arc::new(ModernAdapter::new(version, mappings)?)
    } else {
        Arc::new(LegacyAdapter::new(version, mappings)?)
    };
    info!(
        %version,
        mappings_major = adapter.mappings().major,
        family = if version.major >= 17 { "modern" } else { "legacy" },
        "protocol adapter resolved"
    );
    Ok(adapter)
}

// ---------------------------------------------------------------------------
// Legacy family (1.9 – 1.16)
// ---------------------------------------------------------------------------

/// Adapter for majors 9–16: numeric type codes, inline spawn metadata
/// through 1.14, multi-id destroy packets.
pub struct LegacyAdapter {
    version: ServerVersion,
    mappings: ProtocolMappings,
}

impl LegacyAdapter {
    pub fn new(
        version: ServerVersion,
        mappings: ProtocolMappings,
    ) -> Result<Self, ProtocolError> {
        if mappings.squid_type_id <= 0 || mappings.guardian_type_id <= 0 {
            return Err(ProtocolError::Unavailable(format!(
                "mapping table {} has no usable numeric entity type codes \
                 for version {version}",
                mappings.major
            )));
        }
        Ok(Self { version, mappings })
    }

    fn living_type_ref(&self, kind: FakeEntityKind) -> EntityTypeRef {
        match kind {
            FakeEntityKind::Guardian => {
                EntityTypeRef::Numeric(self.mappings.guardian_type_id)
            }
            _ => EntityTypeRef::Numeric(self.mappings.squid_type_id),
        }
    }
}

impl ProtocolAdapter for LegacyAdapter {
    fn version(&self) -> ServerVersion {
        self.version
    }

    fn mappings(&self) -> &ProtocolMappings {
        &self.mappings
    }

    fn build_spawn_packet(
        &self,
        entity: &FakeEntity,
    ) -> Result<Packet, ProtocolError> {
        let p = entity.position;
        if entity.kind.is_living() {
            // Through 1.14 the living-spawn packet embeds the initial
            // synced data; the invisibility flag rides along so the
            // carrier never flashes visible before its metadata packet.
            let metadata = (self.version.major <= 14).then(|| {
                vec![MetadataEntry::new(
                    &self.mappings.watcher_flags,
                    WatcherValue::Byte(FLAG_INVISIBLE),
                )]
            });
            Ok(Packet::SpawnLivingEntity {
                entity_id: entity.id,
                uuid: entity.uuid,
                entity_type: self.living_type_ref(entity.kind),
                x: p.x,
                y: p.y,
                z: p.z,
                yaw: angle_to_byte(p.yaw),
                pitch: angle_to_byte(p.pitch),
                metadata,
            })
        } else {
            let entity_type = if self.version.major < 13 {
                EntityTypeRef::Numeric(LEGACY_CRYSTAL_TYPE_ID)
            } else {
                EntityTypeRef::Named(self.mappings.crystal_type_name.clone())
            };
            Ok(Packet::SpawnEntity {
                entity_id: entity.id,
                uuid: entity.uuid,
                entity_type,
                x: p.x,
                y: p.y,
                z: p.z,
                yaw: angle_to_byte(p.yaw),
                pitch: angle_to_byte(p.pitch),
            })
        }
    }

    fn build_destroy_packets(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<Packet>, ProtocolError> {
        Ok(vec![Packet::DestroyEntities {
            entity_ids: ids.to_vec(),
        }])
    }
}

// ---------------------------------------------------------------------------
// Modern family (1.17+)
// ---------------------------------------------------------------------------

/// Adapter for majors 17+: registry-named types, entity-derived spawn
/// packets, the 1.17.0 destroy quirk.
pub struct ModernAdapter {
    version: ServerVersion,
    mappings: ProtocolMappings,
}

impl ModernAdapter {
    pub fn new(
        version: ServerVersion,
        mappings: ProtocolMappings,
    ) -> Result<Self, ProtocolError> {
        // Fail fast on anything this family will ever need. Discovering
        // a hole later, mid-animation, would strand spawned fakes on
        // clients with no destroy path.
        for (field, present) in [
            ("guardian_type_name", mappings.guardian_type_name.is_some()),
            ("squid_type_name", mappings.squid_type_name.is_some()),
            ("team_collision_rule", mappings.team_collision_rule.is_some()),
            ("team_member_list", mappings.team_member_list.is_some()),
        ] {
            if !present {
                return Err(ProtocolError::Unavailable(format!(
                    "mapping table {} is missing `{field}`, required for \
                     version {version}",
                    mappings.major
                )));
            }
        }
        Ok(Self { version, mappings })
    }

    fn named_type_ref(
        &self,
        kind: FakeEntityKind,
    ) -> Result<EntityTypeRef, ProtocolError> {
        let name = match kind {
            FakeEntityKind::Guardian => self.mappings.guardian_type_name.as_ref(),
            FakeEntityKind::Squid => self.mappings.squid_type_name.as_ref(),
            FakeEntityKind::EnderCrystal => {
                Some(&self.mappings.crystal_type_name)
            }
        };
        name.map(|n| EntityTypeRef::Named(n.clone())).ok_or_else(|| {
            ProtocolError::operation(
                "build_spawn_packet",
                format!("no registry name for {kind:?}"),
            )
        })
    }
}

impl ProtocolAdapter for ModernAdapter {
    fn version(&self) -> ServerVersion {
        self.version
    }

    fn mappings(&self) -> &ProtocolMappings {
        &self.mappings
    }

    fn build_spawn_packet(
        &self,
        entity: &FakeEntity,
    ) -> Result<Packet, ProtocolError> {
        let p = entity.position;
        let entity_type = self.named_type_ref(entity.kind)?;
        // 1.19 folded living spawns into the plain spawn shape.
        let living_shape =
            entity.kind.is_living() && self.version.major < 19;
        if living_shape {
            Ok(Packet::SpawnLivingEntity {
                entity_id: entity.id,
                uuid: entity.uuid,
                entity_type,
                x: p.x,
                y: p.y,
                z: p.z,
                yaw: angle_to_byte(p.yaw),
                pitch: angle_to_byte(p.pitch),
                metadata: None,
            })
        } else {
            Ok(Packet::SpawnEntity {
                entity_id: entity.id,
                uuid: entity.uuid,
                entity_type,
                x: p.x,
                y: p.y,
                z: p.z,
                yaw: angle_to_byte(p.yaw),
                pitch: angle_to_byte(p.pitch),
            })
        }
    }

    fn build_destroy_packets(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<Packet>, ProtocolError> {
        // 1.17.0 shipped a destroy packet that takes a single id; every
        // other version takes the whole list at once.
        if self.version == ServerVersion::new(17, 0) {
            Ok(ids
                .iter()
                .map(|id| Packet::DestroyEntities {
                    entity_ids: vec![*id],
                })
                .collect())
        } else {
            Ok(vec![Packet::DestroyEntities {
                entity_ids: ids.to_vec(),
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamline_world::WorldId;

    fn pos() -> Position {
        Position::new(WorldId(1), 10.0, 64.0, -5.0)
    }

    fn adapter_for(major: u32, minor: u32) -> Arc<dyn ProtocolAdapter> {
        resolve_adapter(ServerVersion::new(major, minor)).unwrap()
    }

    #[test]
    fn test_family_selection() {
        assert!(resolve_adapter(ServerVersion::new(16, 5)).is_ok());
        assert!(resolve_adapter(ServerVersion::new(20, 4)).is_ok());
    }

    #[test]
    fn test_modern_fails_fast_on_missing_identifier() {
        let mut m = ProtocolMappings::for_version(20, 4).unwrap();
        m.squid_type_name = None;
        let err = resolve_adapter_with(ServerVersion::new(20, 4), m)
            .err()
            .expect("missing identifier must disable the subsystem");
        assert!(matches!(err, ProtocolError::Unavailable(_)));
        assert!(err.to_string().contains("squid_type_name"));
    }

    #[test]
    fn test_legacy_spawn_uses_numeric_type_codes() {
        let a = adapter_for(12, 2);
        let squid = a
            .spawn_fake_entity(FakeEntityKind::Squid, pos())
            .unwrap();
        let packet = a.build_spawn_packet(&squid).unwrap();
        match packet {
            Packet::SpawnLivingEntity {
                entity_type: EntityTypeRef::Numeric(94),
                metadata: Some(_),
                ..
            } => {}
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_crystal_numeric_before_thirteen_named_after() {
        let a12 = adapter_for(12, 0);
        let a14 = adapter_for(14, 4);
        let c12 = a12
            .spawn_fake_entity(FakeEntityKind::EnderCrystal, pos())
            .unwrap();
        let c14 = a14
            .spawn_fake_entity(FakeEntityKind::EnderCrystal, pos())
            .unwrap();
        match a12.build_spawn_packet(&c12).unwrap() {
            Packet::SpawnEntity {
                entity_type: EntityTypeRef::Numeric(id),
                ..
            } => assert_eq!(id, LEGACY_CRYSTAL_TYPE_ID),
            other => panic!("unexpected packet: {other:?}"),
        }
        match a14.build_spawn_packet(&c14).unwrap() {
            Packet::SpawnEntity {
                entity_type: EntityTypeRef::Named(name),
                ..
            } => assert_eq!(name, "END_CRYSTAL"),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_inline_spawn_metadata_stops_after_fourteen() {
        let a15 = adapter_for(15, 2);
        let squid = a15
            .spawn_fake_entity(FakeEntityKind::Squid, pos())
            .unwrap();
        match a15.build_spawn_packet(&squid).unwrap() {
            Packet::SpawnLivingEntity { metadata: None, .. } => {}
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_modern_living_spawn_folds_into_plain_shape_at_nineteen() {
        let a18 = adapter_for(18, 2);
        let a19 = adapter_for(19, 4);
        let g18 = a18
            .spawn_fake_entity(FakeEntityKind::Guardian, pos())
            .unwrap();
        let g19 = a19
            .spawn_fake_entity(FakeEntityKind::Guardian, pos())
            .unwrap();
        assert!(matches!(
            a18.build_spawn_packet(&g18).unwrap(),
            Packet::SpawnLivingEntity { .. }
        ));
        assert!(matches!(
            a19.build_spawn_packet(&g19).unwrap(),
            Packet::SpawnEntity { .. }
        ));
    }

    #[test]
    fn test_seventeen_zero_destroy_quirk() {
        let a = adapter_for(17, 0);
        let packets = a
            .build_destroy_packets(&[EntityId(1), EntityId(2)])
            .unwrap();
        assert_eq!(packets.len(), 2);

        let a171 = adapter_for(17, 1);
        let packets = a171
            .build_destroy_packets(&[EntityId(1), EntityId(2)])
            .unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_guardian_metadata_uses_mapping_keys() {
        let a = adapter_for(20, 4);
        let entries = a.guardian_metadata(EntityId(77)).unwrap();
        let keys: Vec<&str> =
            entries.iter().map(|e| e.key.0.as_str()).collect();
        let m = a.mappings();
        assert_eq!(
            keys,
            vec![
                m.watcher_flags.as_str(),
                m.watcher_spikes.as_str(),
                m.watcher_target_entity.as_str()
            ]
        );
        assert!(entries
            .iter()
            .any(|e| e.value == WatcherValue::VarInt(77)));
    }

    #[test]
    fn test_crystal_metadata_targets_block() {
        let a = adapter_for(20, 4);
        let target = BlockPos { x: 1, y: 2, z: 3 };
        let entries = a.crystal_metadata(target).unwrap();
        assert!(entries.iter().any(|e| {
            e.value == WatcherValue::OptBlockPos(Some(target))
        }));
    }

    #[test]
    fn test_teleport_quantizes_angles() {
        let a = adapter_for(20, 4);
        let mut p = pos();
        p.yaw = 90.0;
        p.pitch = -90.0;
        match a.build_teleport_packet(EntityId(5), p).unwrap() {
            Packet::Teleport { yaw, pitch, on_ground, .. } => {
                assert_eq!(yaw, 64);
                assert_eq!(pitch, 192);
                assert!(on_ground);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_team_packet_never_collides() {
        let a = adapter_for(20, 4);
        let u = Uuid::new_v4();
        match a.build_team_packet("noclip1", &[u]).unwrap() {
            Packet::CreateTeam { collision_rule, members, .. } => {
                assert_eq!(collision_rule, "never");
                assert_eq!(members, vec![u]);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }
}
