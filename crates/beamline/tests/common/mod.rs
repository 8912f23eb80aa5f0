//! Shared harness for beam integration tests: a manually ticked
//! scheduler, an observer registry, and packet-channel inspection
//! helpers. No driver task is spawned — tests advance logical time
//! themselves for full determinism.
#![allow(dead_code)]

use tokio::sync::mpsc::{self, UnboundedReceiver};

use beamline::BeamContext;
use beamline::protocol::{Packet, ServerVersion, resolve_adapter};
use beamline::tick::{Scheduler, TickConfig};
use beamline::viewer::ObserverRegistry;
use beamline::world::{ObserverId, Position, WorldId};

pub const WORLD: WorldId = WorldId(1);

pub struct Harness {
    pub ctx: BeamContext,
    pub scheduler: Scheduler,
    pub observers: ObserverRegistry,
}

pub fn harness() -> Harness {
    let scheduler = Scheduler::new(TickConfig::default());
    let observers = ObserverRegistry::new();
    let adapter =
        resolve_adapter(ServerVersion::new(20, 4)).expect("known version");
    Harness {
        ctx: BeamContext::new(adapter, observers.clone(), scheduler.clone()),
        scheduler,
        observers,
    }
}

impl Harness {
    /// Registers an observer and returns the receiving end of its
    /// packet channel.
    pub fn connect(
        &self,
        id: u64,
        position: Position,
    ) -> UnboundedReceiver<Packet> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers
            .register(ObserverId(id), position, tx)
            .expect("unique observer id");
        rx
    }

    pub fn move_observer(&self, id: u64, position: Position) {
        assert!(self.observers.update_position(ObserverId(id), position));
    }

    pub fn tick(&self, n: u64) {
        for _ in 0..n {
            self.scheduler.tick();
        }
    }
}

pub fn pos(x: f64, y: f64, z: f64) -> Position {
    Position::new(WORLD, x, y, z)
}

/// Everything currently buffered on an observer's channel.
pub fn drain(rx: &mut UnboundedReceiver<Packet>) -> Vec<Packet> {
    let mut out = Vec::new();
    while let Ok(packet) = rx.try_recv() {
        out.push(packet);
    }
    out
}

pub fn spawns(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| {
            matches!(
                p,
                Packet::SpawnEntity { .. } | Packet::SpawnLivingEntity { .. }
            )
        })
        .count()
}

pub fn destroys(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| matches!(p, Packet::DestroyEntities { .. }))
        .count()
}

pub fn teleports(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| matches!(p, Packet::Teleport { .. }))
        .count()
}

pub fn metadata_updates(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| matches!(p, Packet::SetMetadata { .. }))
        .count()
}

pub fn team_creates(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| matches!(p, Packet::CreateTeam { .. }))
        .count()
}
