//! Protocol layer for the Beamline workspace.
//!
//! Everything version-specific lives here: the per-version mapping
//! tables ([`ProtocolMappings`]), the packet payload model ([`Packet`]),
//! and the [`ProtocolAdapter`] that turns beam intents into payloads a
//! given server version's clients accept.
//!
//! The rest of the workspace resolves one adapter at startup
//! ([`resolve_adapter`]) and never looks at a version number again.

mod adapter;
mod error;
mod mappings;
mod types;

pub use adapter::{
    LegacyAdapter, ModernAdapter, ProtocolAdapter, resolve_adapter,
    resolve_adapter_with,
};
pub use error::ProtocolError;
pub use mappings::{
    NEWEST_KNOWN_MAJOR, OLDEST_KNOWN_MAJOR, ProtocolMappings, Resolved,
    ServerVersion,
};
pub use types::{
    EntityId, EntityTypeRef, FakeEntity, FakeEntityKind, MetadataEntry,
    Packet, WatcherKey, WatcherValue, angle_to_byte, generate_entity_id,
};
