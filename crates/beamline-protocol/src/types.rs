//! Packet payloads and fake-entity representations.
//!
//! A [`Packet`] here is the opaque payload object handed to an
//! observer's send channel — the host platform owns the actual byte
//! encoding (this subsystem never listens, and never encodes). What we
//! guarantee is the *content*: field values, quantization, and the
//! per-version identifiers stamped in from the mapping table.
//!
//! A [`FakeEntity`] is an in-memory stand-in for an entity that never
//! exists in the authoritative world state. Clients that receive its
//! spawn packet render it; the server never ticks it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};
use uuid::Uuid;

use beamline_world::{BlockPos, Position};

// ---------------------------------------------------------------------------
// Entity identity
// ---------------------------------------------------------------------------

/// A synthetic network entity id.
///
/// Real entities get small ids from the server; fake ones are allocated
/// from the top of the id space to keep the two ranges from colliding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i32);

// Multiple beams allocate ids concurrently; a process-wide atomic is
// the whole synchronization story. Init-once, no teardown.
static LAST_ISSUED_ENTITY_ID: AtomicI32 = AtomicI32::new(2_000_000_000);

/// Allocates the next synthetic entity id.
pub fn generate_entity_id() -> EntityId {
    EntityId(LAST_ISSUED_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
}

/// The kinds of fake entity the beam subsystem spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FakeEntityKind {
    /// The beam carrier (a guardian's attack beam is the visual).
    Guardian,
    /// The invisible pointer the guardian aims at.
    Squid,
    /// An end crystal; its beam targets a block position.
    EnderCrystal,
}

impl FakeEntityKind {
    /// Whether spawn packets for this kind use the living-entity shape.
    pub fn is_living(&self) -> bool {
        matches!(self, Self::Guardian | Self::Squid)
    }
}

/// An in-memory protocol-level entity. Never part of the server world;
/// exists only so spawn/teleport packets can be derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeEntity {
    pub id: EntityId,
    pub uuid: Uuid,
    pub kind: FakeEntityKind,
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Metadata (synced-data / "watcher" entries)
// ---------------------------------------------------------------------------

/// An opaque per-version synced-data field identifier, straight from
/// the mapping table. Never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherKey(pub String);

/// A value for a synced-data field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WatcherValue {
    Byte(u8),
    Bool(bool),
    VarInt(i32),
    OptBlockPos(Option<BlockPos>),
}

/// One synced-data entry in a metadata packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: WatcherKey,
    pub value: WatcherValue,
}

impl MetadataEntry {
    pub fn new(key: &str, value: WatcherValue) -> Self {
        Self {
            key: WatcherKey(key.to_string()),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity type references
// ---------------------------------------------------------------------------

/// How a spawn packet names the entity's type: a raw numeric code on
/// old versions, a registry field name on newer ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityTypeRef {
    Numeric(i32),
    Named(String),
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// An outbound protocol payload.
///
/// Variants mirror the handful of clientbound packets the beam
/// subsystem ever sends. This system only sends — there is no inbound
/// counterpart anywhere in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Spawn a living entity (guardian, squid).
    SpawnLivingEntity {
        entity_id: EntityId,
        uuid: Uuid,
        entity_type: EntityTypeRef,
        x: f64,
        y: f64,
        z: f64,
        /// Fixed-point angle byte, see [`angle_to_byte`].
        yaw: u8,
        pitch: u8,
        /// Inline metadata; only present on versions whose living-spawn
        /// packet still embeds it (through 1.14).
        metadata: Option<Vec<MetadataEntry>>,
    },

    /// Spawn a non-living entity (end crystal).
    SpawnEntity {
        entity_id: EntityId,
        uuid: Uuid,
        entity_type: EntityTypeRef,
        x: f64,
        y: f64,
        z: f64,
        yaw: u8,
        pitch: u8,
    },

    /// Remove entities from the client's world.
    DestroyEntities { entity_ids: Vec<EntityId> },

    /// Update synced-data on an already-spawned entity.
    SetMetadata {
        entity_id: EntityId,
        entries: Vec<MetadataEntry>,
    },

    /// Absolute-position teleport.
    Teleport {
        entity_id: EntityId,
        x: f64,
        y: f64,
        z: f64,
        yaw: u8,
        pitch: u8,
        on_ground: bool,
    },

    /// Create a scoreboard team. Used solely to put the two guardian
    /// fakes in a collision-exempt group so the carrier doesn't shove
    /// its own pointer around on the client.
    CreateTeam {
        name: String,
        /// Always `"never"`; kept explicit because it's the entire
        /// reason the packet exists.
        collision_rule: String,
        members: Vec<Uuid>,
    },
}

impl Packet {
    /// The entity ids this packet spawns, if any. Handy in tests.
    pub fn spawned_entity(&self) -> Option<EntityId> {
        match self {
            Packet::SpawnLivingEntity { entity_id, .. }
            | Packet::SpawnEntity { entity_id, .. } => Some(*entity_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Angle quantization
// ---------------------------------------------------------------------------

/// Encodes an angle in degrees as the protocol's fixed-point byte:
/// `round(deg * 256 / 360)`, wrapped into one byte.
///
/// This exact quantization is a compatibility requirement, not an
/// approximation choice — clients reject or misrender anything else.
pub fn angle_to_byte(deg: f32) -> u8 {
    ((f64::from(deg) * 256.0 / 360.0).round() as i64).rem_euclid(256) as u8
}
