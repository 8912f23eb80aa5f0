//! A small stand-in for a host server: registers two simulated
//! observers, runs a guardian beam and a crystal beam for a few
//! seconds, and prints every packet the observers' channels receive.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use beamline::protocol::{Packet, ServerVersion};
use beamline::tick::{Scheduler, TickConfig};
use beamline::viewer::ObserverRegistry;
use beamline::world::{ObserverId, Position, WorldId};
use beamline::{BeamContext, CrystalBeam, GuardianBeam};

const WORLD: WorldId = WorldId(1);

fn watch(name: &'static str, mut rx: mpsc::UnboundedReceiver<Packet>) {
    tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            info!(observer = name, ?packet, "received");
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let version: ServerVersion = "1.20.4".parse()?;
    let scheduler = Scheduler::new(TickConfig::default());
    scheduler.spawn_driver();
    let observers = ObserverRegistry::new();
    let ctx = BeamContext::resolve(version, observers.clone(), scheduler)?;

    let (alice_tx, alice_rx) = mpsc::unbounded_channel();
    observers.register(ObserverId(1), Position::new(WORLD, 2.0, 64.0, 0.0), alice_tx)?;
    watch("alice", alice_rx);

    // Bob starts out of range and wanders in after two seconds.
    let (bob_tx, bob_rx) = mpsc::unbounded_channel();
    observers.register(ObserverId(2), Position::new(WORLD, 400.0, 64.0, 0.0), bob_tx)?;
    watch("bob", bob_rx);

    let guardian = GuardianBeam::new(
        &ctx,
        Position::new(WORLD, 0.0, 64.0, 0.0),
        Position::new(WORLD, 20.0, 70.0, 0.0),
        6,
        64,
    )?;
    guardian.on_complete(|| info!("guardian beam finished"));
    guardian.start()?;

    let crystal = CrystalBeam::new(
        &ctx,
        Position::new(WORLD, -10.0, 64.0, 0.0),
        Position::new(WORLD, -10.0, 80.0, 0.0),
        6,
        64,
    )?;
    crystal.start()?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    observers.update_position(ObserverId(2), Position::new(WORLD, 5.0, 64.0, 0.0));
    info!("bob moved into range");

    // Sweep the guardian beam's end over a second and a half.
    guardian.move_end_over(
        Position::new(WORLD, 20.0, 90.0, 10.0),
        30,
        Some(Box::new(|| info!("sweep complete"))),
    )?;

    tokio::time::sleep(Duration::from_secs(5)).await;
    info!(
        guardian_running = guardian.is_started(),
        crystal_running = crystal.is_started(),
        "shutting down"
    );
    Ok(())
}
