//! Beam lifecycle: the state machine, visibility refresh, and
//! interpolated endpoint moves shared by every beam kind.
//!
//! A [`Beam`] goes `Created → Running → Stopped`, terminal. `start` is
//! the only way in to Running, `stop` (explicit, or automatic when the
//! duration is exhausted) the only way out, and a stopped beam cannot
//! be restarted.
//!
//! While Running, a recurring scheduler job refreshes visibility: every
//! observer in the beam's world is checked against the distance cutoff,
//! newcomers get the kind's start packets, leavers get destroy packets.
//! Up to two more jobs per beam interpolate endpoint moves. All three
//! serialize on one mutex per beam; beams never share locks with each
//! other. The jobs hold weak references back to the beam — dropping the
//! last [`Beam`] handle lets each job notice and retire itself.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use beamline_protocol::{Packet, ProtocolAdapter, ProtocolError};
use beamline_tick::TaskHandle;
use beamline_viewer::ObserverSnapshot;
use beamline_world::{ObserverId, Position};

use crate::{BeamContext, BeamError, BeamType};

/// Scheduler ticks per second-granularity duration unit. Also the
/// refresh period for beams whose duration is counted in seconds —
/// second-granularity timers don't need per-tick visibility checks.
const TICKS_PER_SECOND: u64 = 20;

// ---------------------------------------------------------------------------
// Kind seam
// ---------------------------------------------------------------------------

/// The two beam endpoints, in one world.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub start: Position,
    pub end: Position,
}

/// What a concrete beam kind contributes: fake-entity setup and the
/// packets for showing, hiding, and moving the beam. The lifecycle
/// machinery in [`Beam`] owns everything else.
///
/// Implementations cache built packets and invalidate them when the
/// corresponding endpoint moves; `start_packets` takes `&mut self` for
/// exactly that reason.
pub trait BeamKind: Send + Sized + 'static {
    const BEAM_TYPE: BeamType;

    /// Applied to the end position on every assignment, before the kind
    /// sees it. Crystal beams snap to block coordinates here.
    fn normalize_end(end: Position) -> Position {
        end
    }

    /// Spawns the kind's fake entities and builds its one-time packets.
    /// Failure aborts beam construction.
    fn init(
        adapter: &dyn ProtocolAdapter,
        geo: &Geometry,
    ) -> Result<Self, ProtocolError>;

    /// The effective end position this refresh. Guardian beams override
    /// this to read a followed entity's live position.
    fn live_end(&self, geo: &Geometry) -> Position {
        geo.end
    }

    /// An observer exempt from the distance cutoff, if any.
    fn always_visible_to(&self) -> Option<ObserverId> {
        None
    }

    /// Packets that introduce the beam to one observer. `None` entries
    /// are skipped at delivery. `seen_before` suppresses one-time setup
    /// packets for observers re-entering range.
    fn start_packets(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        seen_before: bool,
    ) -> Result<Vec<Option<Packet>>, ProtocolError>;

    /// Packets that remove the beam from an observer's client. Built at
    /// init and cached, so teardown cannot fail.
    fn destroy_packets(&self) -> Vec<Packet>;

    /// Moves the start endpoint. Returns the packets current viewers
    /// need to see the move.
    fn apply_move_start(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        geo: &mut Geometry,
        to: Position,
    ) -> Result<Vec<Packet>, ProtocolError>;

    /// Moves the end endpoint. An empty return means the move was a
    /// no-op (crystal snap idempotence) and nothing is sent.
    fn apply_move_end(
        &mut self,
        adapter: &dyn ProtocolAdapter,
        geo: &mut Geometry,
        to: Position,
    ) -> Result<Vec<Packet>, ProtocolError>;
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Start,
    End,
}

pub(crate) struct Shared<K: BeamKind> {
    pub(crate) kind: K,
    pub(crate) geo: Geometry,
    /// Duration in seconds, or in ticks when `ticks_mode`. -1 = forever.
    duration: i32,
    ticks_mode: bool,
    /// Cutoff distance squared; -1.0 = unlimited.
    distance_squared: f64,
    phase: Phase,
    /// Set once by the first `start` and never cleared; interpolated
    /// moves need the scheduler wiring that `start` establishes.
    started_once: bool,
    /// Refresh runs elapsed, in duration units.
    elapsed: i32,
    viewers: HashSet<ObserverId>,
    seen: HashSet<ObserverId>,
    on_complete: Vec<Box<dyn FnOnce() + Send>>,
    refresh_task: Option<TaskHandle>,
    start_move: Option<TaskHandle>,
    end_move: Option<TaskHandle>,
}

impl<K: BeamKind> Shared<K> {
    fn within_range(&self, snap: &ObserverSnapshot, live_end: Position) -> bool {
        if self.kind.always_visible_to() == Some(snap.id) {
            return true;
        }
        if self.distance_squared < 0.0 {
            return true;
        }
        snap.position.distance_squared(&self.geo.start) <= self.distance_squared
            || snap.position.distance_squared(&live_end) <= self.distance_squared
    }
}

/// Everything needed to finish a beam, collected under the lock and
/// executed outside it: destroy packets go out and completion callbacks
/// run with no beam lock held, so a callback may freely construct or
/// inspect beams.
struct Teardown {
    recipients: Vec<ObserverSnapshot>,
    destroy: Vec<Packet>,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

impl Teardown {
    fn collect<K: BeamKind>(shared: &mut Shared<K>, ctx: &BeamContext) -> Self {
        shared.phase = Phase::Stopped;
        if let Some(task) = shared.refresh_task.take() {
            task.cancel();
        }
        let recipients = shared
            .viewers
            .drain()
            .filter_map(|id| ctx.observers().snapshot(id))
            .collect();
        Self {
            recipients,
            destroy: shared.kind.destroy_packets(),
            callbacks: std::mem::take(&mut shared.on_complete),
        }
    }

    fn run(self) {
        for snap in &self.recipients {
            snap.deliver(self.destroy.iter().cloned().map(Some));
        }
        for callback in self.callbacks {
            callback();
        }
    }
}

// ---------------------------------------------------------------------------
// Beam
// ---------------------------------------------------------------------------

/// A packet-only laser beam between two points.
///
/// Generic over its [`BeamKind`]; use the [`GuardianBeam`] and
/// [`CrystalBeam`] aliases. The handle is the beam's identity — clones
/// of the internal state are never exposed, and dropping the last
/// handle retires the beam's scheduler jobs.
///
/// [`GuardianBeam`]: crate::GuardianBeam
/// [`CrystalBeam`]: crate::CrystalBeam
pub struct Beam<K: BeamKind> {
    pub(crate) ctx: BeamContext,
    pub(crate) shared: Arc<Mutex<Shared<K>>>,
}

impl<K: BeamKind> Beam<K> {
    /// Creates a beam between two points in the same world.
    ///
    /// `duration` is in seconds (see [`duration_in_ticks`]); -1 means
    /// the beam runs until stopped. `distance` is the visibility cutoff
    /// in world units; negative means unlimited.
    ///
    /// The beam is not visible to anyone until [`start`] is called.
    ///
    /// [`duration_in_ticks`]: Self::duration_in_ticks
    /// [`start`]: Self::start
    pub fn new(
        ctx: &BeamContext,
        start: Position,
        end: Position,
        duration: i32,
        distance: i32,
    ) -> Result<Self, BeamError> {
        if start.world != end.world {
            return Err(BeamError::invalid(
                "start and end are in different worlds",
            ));
        }
        let geo = Geometry {
            start,
            end: K::normalize_end(end),
        };
        let kind = K::init(ctx.adapter().as_ref(), &geo)?;
        Ok(Self {
            ctx: ctx.clone(),
            shared: Arc::new(Mutex::new(Shared {
                kind,
                geo,
                duration,
                ticks_mode: false,
                distance_squared: if distance < 0 {
                    -1.0
                } else {
                    f64::from(distance) * f64::from(distance)
                },
                phase: Phase::Created,
                started_once: false,
                elapsed: 0,
                viewers: HashSet::new(),
                seen: HashSet::new(),
                on_complete: Vec::new(),
                refresh_task: None,
                start_move: None,
                end_move: None,
            })),
        })
    }

    /// Reinterprets the constructor's `duration` as ticks instead of
    /// seconds. Call before [`start`](Self::start); the unit is read
    /// when the refresh job is scheduled.
    pub fn duration_in_ticks(self) -> Self {
        self.lock().ticks_mode = true;
        self
    }

    /// Registers a callback to run when the beam terminates, after
    /// every viewer has received destroy packets. Callbacks run exactly
    /// once, in registration order, whether the beam expires naturally
    /// or is stopped.
    pub fn on_complete(&self, callback: impl FnOnce() + Send + 'static) {
        self.lock().on_complete.push(Box::new(callback));
    }

    /// Starts the beam: begins the visibility refresh and the duration
    /// countdown. A beam can be started once, ever.
    pub fn start(&self) -> Result<(), BeamError> {
        let mut shared = self.lock();
        if shared.phase != Phase::Created {
            return Err(BeamError::AlreadyStarted);
        }
        shared.phase = Phase::Running;
        shared.started_once = true;
        shared.elapsed = 0;

        let period = if shared.ticks_mode { 1 } else { TICKS_PER_SECOND };
        let ctx = self.ctx.clone();
        let weak = Arc::downgrade(&self.shared);
        let handle = self.ctx.scheduler().run_repeating(0, period, move || {
            match weak.upgrade() {
                Some(shared) => refresh_tick(&ctx, &shared),
                None => ControlFlow::Break(()),
            }
        });
        shared.refresh_task = Some(handle);
        debug!(beam = ?K::BEAM_TYPE, period, "beam started");
        Ok(())
    }

    /// Stops a running beam: destroys it for every current viewer and
    /// fires completion callbacks.
    ///
    /// In-flight interpolated moves are left to finish on their own —
    /// they are independently owned, and with the beam stopped their
    /// position updates no longer reach anyone.
    pub fn stop(&self) -> Result<(), BeamError> {
        let mut shared = self.lock();
        if shared.phase != Phase::Running {
            return Err(BeamError::NotStarted);
        }
        let teardown = Teardown::collect(&mut shared, &self.ctx);
        drop(shared);
        teardown.run();
        Ok(())
    }

    /// Whether the beam is currently running.
    pub fn is_started(&self) -> bool {
        self.lock().phase == Phase::Running
    }

    pub fn beam_type(&self) -> BeamType {
        K::BEAM_TYPE
    }

    pub fn start_position(&self) -> Position {
        self.lock().geo.start
    }

    /// The effective end position: the followed entity's live position
    /// for a following guardian beam, the stored endpoint otherwise.
    pub fn end_position(&self) -> Position {
        let shared = self.lock();
        shared.kind.live_end(&shared.geo)
    }

    /// Observers currently shown the beam.
    pub fn viewer_count(&self) -> usize {
        self.lock().viewers.len()
    }

    /// Instantly moves the beam's start point.
    pub fn move_start(&self, to: Position) -> Result<(), BeamError> {
        self.move_endpoint(Endpoint::Start, to)
    }

    /// Instantly moves the beam's end point.
    pub fn move_end(&self, to: Position) -> Result<(), BeamError> {
        self.move_endpoint(Endpoint::End, to)
    }

    /// Smoothly moves the start point to `to` over `ticks` ticks.
    /// See [`move_end_over`](Self::move_end_over).
    pub fn move_start_over(
        &self,
        to: Position,
        ticks: u32,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), BeamError> {
        self.move_endpoint_over(Endpoint::Start, to, ticks, on_done)
    }

    /// Smoothly moves the end point to `to` over `ticks` ticks.
    ///
    /// A constant per-tick delta is applied each tick; `on_done` runs
    /// exactly once, after the final update. Starting a new move for
    /// the same endpoint cancels the in-flight one (whose callback then
    /// never fires). Requires the beam to have been started at least
    /// once.
    pub fn move_end_over(
        &self,
        to: Position,
        ticks: u32,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), BeamError> {
        self.move_endpoint_over(Endpoint::End, to, ticks, on_done)
    }

    fn move_endpoint(&self, endpoint: Endpoint, to: Position) -> Result<(), BeamError> {
        {
            let shared = self.lock();
            if to.world != shared.geo.start.world {
                return Err(BeamError::invalid(
                    "target position is in a different world",
                ));
            }
        }
        move_step(&self.ctx, &self.shared, endpoint, to)?;
        Ok(())
    }

    fn move_endpoint_over(
        &self,
        endpoint: Endpoint,
        to: Position,
        ticks: u32,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), BeamError> {
        if ticks == 0 {
            return Err(BeamError::invalid(
                "interpolation tick count must be positive",
            ));
        }
        let mut guard = self.lock();
        let shared = &mut *guard;
        if !shared.started_once {
            return Err(BeamError::NotStarted);
        }
        if to.world != shared.geo.start.world {
            return Err(BeamError::invalid(
                "target position is in a different world",
            ));
        }
        let from = match endpoint {
            Endpoint::Start => shared.geo.start,
            Endpoint::End => shared.kind.live_end(&shared.geo),
        };
        let n = f64::from(ticks);
        let (dx, dy, dz) = (
            (to.x - from.x) / n,
            (to.y - from.y) / n,
            (to.z - from.z) / n,
        );

        let slot = match endpoint {
            Endpoint::Start => &mut shared.start_move,
            Endpoint::End => &mut shared.end_move,
        };
        if let Some(old) = slot.take() {
            old.cancel();
        }

        let ctx = self.ctx.clone();
        let weak = Arc::downgrade(&self.shared);
        let mut cursor = from;
        let mut elapsed = 0u32;
        let mut on_done = on_done;
        let handle = self.ctx.scheduler().run_repeating(0, 1, move || {
            let Some(shared) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            cursor = cursor.offset(dx, dy, dz);
            if let Err(err) = move_step(&ctx, &shared, endpoint, cursor) {
                warn!(%err, ?endpoint, "interpolated move failed, cancelling");
                return ControlFlow::Break(());
            }
            elapsed += 1;
            if elapsed == ticks {
                if let Some(callback) = on_done.take() {
                    callback();
                }
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        *slot = Some(handle);
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared<K>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshots of the current viewers, resolved against the registry.
    pub(crate) fn viewer_snapshots(
        shared: &Shared<K>,
        ctx: &BeamContext,
    ) -> Vec<ObserverSnapshot> {
        shared
            .viewers
            .iter()
            .filter_map(|id| ctx.observers().snapshot(*id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Refresh and move jobs
// ---------------------------------------------------------------------------

/// One visibility refresh run. Distance checks and viewer-set mutation
/// happen under the beam lock; packet delivery happens after it is
/// released.
fn refresh_tick<K: BeamKind>(
    ctx: &BeamContext,
    shared: &Arc<Mutex<Shared<K>>>,
) -> ControlFlow<()> {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.phase != Phase::Running {
        return ControlFlow::Break(());
    }
    if guard.elapsed == guard.duration {
        let teardown = Teardown::collect(&mut guard, ctx);
        drop(guard);
        teardown.run();
        return ControlFlow::Break(());
    }

    let world = guard.geo.start.world;
    let live_end = guard.kind.live_end(&guard.geo);
    let observers = ctx.observers().observers_in(world);

    // Disconnected observers simply vanish from the viewer set; there
    // is no channel left to send a destroy packet through.
    let connected: HashSet<ObserverId> =
        observers.iter().map(|snap| snap.id).collect();
    guard.viewers.retain(|id| connected.contains(id));

    let mut introductions: Vec<(ObserverSnapshot, Vec<Option<Packet>>)> =
        Vec::new();
    let mut departures: Vec<ObserverSnapshot> = Vec::new();
    for snap in observers {
        let within = guard.within_range(&snap, live_end);
        if within && !guard.viewers.contains(&snap.id) {
            guard.viewers.insert(snap.id);
            let seen_before = !guard.seen.insert(snap.id);
            match guard
                .kind
                .start_packets(ctx.adapter().as_ref(), seen_before)
            {
                Ok(packets) => introductions.push((snap, packets)),
                Err(err) => {
                    error!(%err, "visibility refresh failed, terminating beam");
                    let teardown = Teardown::collect(&mut guard, ctx);
                    drop(guard);
                    teardown.run();
                    return ControlFlow::Break(());
                }
            }
        } else if !within && guard.viewers.remove(&snap.id) {
            departures.push(snap);
        }
    }
    guard.elapsed += 1;
    let destroy =
        (!departures.is_empty()).then(|| guard.kind.destroy_packets());
    drop(guard);

    for (snap, packets) in introductions {
        snap.deliver(packets);
    }
    if let Some(destroy) = destroy {
        for snap in departures {
            snap.deliver(destroy.iter().cloned().map(Some));
        }
    }
    ControlFlow::Continue(())
}

/// Applies one endpoint move and forwards the resulting packets to
/// current viewers (only while running; a not-yet-started or stopped
/// beam just updates its state).
fn move_step<K: BeamKind>(
    ctx: &BeamContext,
    shared: &Arc<Mutex<Shared<K>>>,
    endpoint: Endpoint,
    to: Position,
) -> Result<(), ProtocolError> {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    let sh = &mut *guard;
    let adapter = ctx.adapter().as_ref();
    let packets = match endpoint {
        Endpoint::Start => sh.kind.apply_move_start(adapter, &mut sh.geo, to)?,
        Endpoint::End => sh.kind.apply_move_end(adapter, &mut sh.geo, to)?,
    };
    let recipients = if sh.phase == Phase::Running && !packets.is_empty() {
        Beam::<K>::viewer_snapshots(sh, ctx)
    } else {
        Vec::new()
    };
    drop(guard);
    for snap in recipients {
        snap.deliver(packets.iter().cloned().map(Some));
    }
    Ok(())
}
