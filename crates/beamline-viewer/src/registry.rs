//! The observer registry: who is connected, where they are, and how to
//! reach them.
//!
//! The host platform registers an observer when a connection finishes
//! login and removes it on disconnect. Beams consult the registry on
//! every refresh — an observer that is gone from here is gone from
//! every beam's viewer set on its next tick, which is what keeps viewer
//! sets a subset of connected observers without any cross-notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use beamline_protocol::{EntityId, Packet};
use beamline_world::{ObserverId, Position, WorldId};

use crate::ViewerError;

/// The outbound half of an observer's packet channel. The host platform
/// owns the receiving half and the byte encoding behind it.
pub type PacketSender = mpsc::UnboundedSender<Packet>;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A point-in-time view of one registered observer.
///
/// Snapshots are cheap clones taken under the registry lock and used
/// outside it; the observer may disconnect while a snapshot is live,
/// in which case delivery through it becomes a no-op.
#[derive(Debug, Clone)]
pub struct ObserverSnapshot {
    pub id: ObserverId,
    pub position: Position,
    sender: PacketSender,
}

impl ObserverSnapshot {
    /// Delivers a batch of packets, skipping `None` entries.
    ///
    /// A closed channel means the observer disconnected between the
    /// snapshot and now; the remaining packets are dropped silently,
    /// matching what the network stack would do anyway.
    pub fn deliver<I>(&self, packets: I)
    where
        I: IntoIterator<Item = Option<Packet>>,
    {
        for packet in packets.into_iter().flatten() {
            if self.sender.send(packet).is_err() {
                trace!(observer = %self.id, "packet channel closed, dropping batch");
                return;
            }
        }
    }

    /// Delivers a single packet. Same closed-channel semantics as
    /// [`deliver`](Self::deliver).
    pub fn deliver_one(&self, packet: Packet) {
        self.deliver([Some(packet)]);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct ObserverEntry {
    position: Position,
    sender: PacketSender,
}

/// Registry of connected observers. Cheap to clone; all clones share
/// state.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<HashMap<ObserverId, ObserverEntry>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ObserverId, ObserverEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a newly connected observer.
    pub fn register(
        &self,
        id: ObserverId,
        position: Position,
        sender: PacketSender,
    ) -> Result<(), ViewerError> {
        let mut entries = self.entries();
        if entries.contains_key(&id) {
            return Err(ViewerError::AlreadyRegistered(id));
        }
        entries.insert(id, ObserverEntry { position, sender });
        debug!(observer = %id, world = %position.world, "observer registered");
        Ok(())
    }

    /// Removes a disconnected observer. Returns whether it was present.
    pub fn remove(&self, id: ObserverId) -> bool {
        let removed = self.entries().remove(&id).is_some();
        if removed {
            debug!(observer = %id, "observer removed");
        }
        removed
    }

    /// Updates an observer's position. Returns `false` for unknown ids.
    pub fn update_position(&self, id: ObserverId, position: Position) -> bool {
        match self.entries().get_mut(&id) {
            Some(entry) => {
                entry.position = position;
                true
            }
            None => false,
        }
    }

    /// Whether an observer is currently connected.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries().contains_key(&id)
    }

    /// A snapshot of one observer, if connected.
    pub fn snapshot(&self, id: ObserverId) -> Option<ObserverSnapshot> {
        self.entries().get(&id).map(|entry| ObserverSnapshot {
            id,
            position: entry.position,
            sender: entry.sender.clone(),
        })
    }

    /// Snapshots of every observer currently in a world.
    pub fn observers_in(&self, world: WorldId) -> Vec<ObserverSnapshot> {
        self.entries()
            .iter()
            .filter(|(_, entry)| entry.position.world == world)
            .map(|(id, entry)| ObserverSnapshot {
                id: *id,
                position: entry.position,
                sender: entry.sender.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tracked entities
// ---------------------------------------------------------------------------

/// A live, host-owned entity a beam endpoint can follow.
///
/// The position cell is shared with the host platform, which updates it
/// as the entity moves; beams read it fresh on every refresh tick. If
/// the entity is an observer's own avatar, `observer` names them so
/// beams can special-case what that one client is shown.
#[derive(Clone)]
pub struct TrackedEntity {
    pub entity_id: EntityId,
    pub world: WorldId,
    position: Arc<Mutex<Position>>,
    pub observer: Option<ObserverId>,
}

impl TrackedEntity {
    pub fn new(
        entity_id: EntityId,
        position: Position,
        observer: Option<ObserverId>,
    ) -> Self {
        Self {
            entity_id,
            world: position.world,
            position: Arc::new(Mutex::new(position)),
            observer,
        }
    }

    /// The entity's position right now.
    pub fn live_position(&self) -> Position {
        *self
            .position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the shared position cell (host platform side).
    pub fn set_position(&self, position: Position) {
        *self
            .position
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = position;
    }
}
