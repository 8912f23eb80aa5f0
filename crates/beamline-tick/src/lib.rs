//! Tick-counted task scheduler for Beamline.
//!
//! Beams never use wall-clock timers: a beam with a 5-second duration
//! expires after 100 scheduler ticks at 20 Hz, however long those ticks
//! actually took. That makes durations invariant to server stalls — a
//! lagging server shows the beam longer instead of cutting it short.
//!
//! The scheduler therefore counts **logical ticks**. [`Scheduler::tick`]
//! advances the counter by one and runs every due job; in production a
//! background driver task ([`Scheduler::spawn_driver`]) calls it on a
//! fixed interval, and in tests you call it yourself for full
//! determinism.
//!
//! # Jobs
//!
//! Two kinds, mirroring the host-scheduler contract beams rely on:
//!
//! - [`Scheduler::run_repeating`] — runs every `period` ticks until the
//!   callback returns [`ControlFlow::Break`] (self-completion) or the
//!   [`TaskHandle`] is cancelled.
//! - [`Scheduler::run_once`] — runs a single time after `delay` ticks.
//!
//! Callbacks may schedule further jobs; the job table lock is never
//! held while a callback runs.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the scheduler's production driver.
///
/// Only the driver cares about the rate; the logical tick counter and
/// all job bookkeeping are rate-agnostic.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz for [`Scheduler::spawn_driver`]. Default: 20,
    /// the conventional voxel-server tick rate.
    pub tick_rate_hz: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 20 }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Scheduler::new`]. A zero rate makes no
    /// sense for a driver (nothing would ever run), so it is raised to 1.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum — clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        if self.tick_rate_hz == 0 {
            warn!("tick_rate_hz of 0 is invalid — raising to 1");
            self.tick_rate_hz = 1;
        }
        self
    }

    /// Duration of a single driver tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64)
    }
}

// ---------------------------------------------------------------------------
// Task handles
// ---------------------------------------------------------------------------

/// Handle to a scheduled job. Cheap to clone.
///
/// Cancellation is cooperative: a cancelled job is dropped the next
/// time the scheduler looks at it and never runs again. Cancelling an
/// already-completed or already-cancelled job is a no-op.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Marks the job cancelled. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            trace!(job = self.id, "task cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called (or the job
    /// completed on its own).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

type JobFn = Box<dyn FnMut() -> ControlFlow<()> + Send>;

struct Job {
    id: u64,
    /// Tick at which this job next runs.
    due: u64,
    /// `None` for one-shot jobs.
    period: Option<u64>,
    cancelled: Arc<AtomicBool>,
    run: JobFn,
}

struct Inner {
    config: TickConfig,
    tick: AtomicU64,
    next_id: AtomicU64,
    jobs: Mutex<Vec<Job>>,
}

/// Tick-counted scheduler. Cheap to clone — all clones share one job
/// table and one tick counter.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(TickConfig::default())
    }
}

impl Scheduler {
    /// Creates a scheduler. No driver is started; call
    /// [`spawn_driver`](Self::spawn_driver) for production use or
    /// [`tick`](Self::tick) directly in tests.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(rate_hz = config.tick_rate_hz, "scheduler created");
        Self {
            inner: Arc::new(Inner {
                config,
                tick: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
                jobs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Schedules a repeating job.
    ///
    /// First run happens `delay + 1` ticks from now (a `delay` of 0
    /// means "on the next tick"), then every `period` ticks. A period
    /// of 0 is clamped to 1.
    ///
    /// The job runs until the callback returns `ControlFlow::Break` or
    /// the returned handle is cancelled.
    pub fn run_repeating<F>(&self, delay: u64, period: u64, f: F) -> TaskHandle
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.push(delay, Some(period.max(1)), Box::new(f))
    }

    /// Schedules a one-shot job `delay + 1` ticks from now.
    pub fn run_once<F>(&self, delay: u64, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);
        self.push(
            delay,
            None,
            Box::new(move || {
                if let Some(f) = f.take() {
                    f();
                }
                ControlFlow::Break(())
            }),
        )
    }

    fn push(&self, delay: u64, period: Option<u64>, run: JobFn) -> TaskHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let due = self.tick_count() + 1 + delay;
        self.jobs().push(Job {
            id,
            due,
            period,
            cancelled: cancelled.clone(),
            run,
        });
        trace!(job = id, due, ?period, "job scheduled");
        TaskHandle { id, cancelled }
    }

    /// Advances the logical clock by one tick and runs every due job.
    ///
    /// Jobs run outside the job-table lock, so a callback may schedule
    /// or cancel other jobs freely. A job scheduled from inside a
    /// callback first runs on a *later* tick, never the current one.
    pub fn tick(&self) {
        let now = self.inner.tick.fetch_add(1, Ordering::SeqCst) + 1;

        // Pull out everything due; leave the rest in place.
        let mut due = Vec::new();
        {
            let mut jobs = self.jobs();
            let mut i = 0;
            while i < jobs.len() {
                if jobs[i].cancelled.load(Ordering::SeqCst) {
                    jobs.swap_remove(i);
                } else if jobs[i].due <= now {
                    due.push(jobs.swap_remove(i));
                } else {
                    i += 1;
                }
            }
        }

        for mut job in due {
            // Cancelled between the drain and now (by another job this
            // same tick, or another thread).
            if job.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            let flow = (job.run)();
            match (flow, job.period) {
                (ControlFlow::Continue(()), Some(period))
                    if !job.cancelled.load(Ordering::SeqCst) =>
                {
                    job.due = now + period;
                    self.jobs().push(job);
                }
                _ => {
                    // Completed: flag the handle so is_cancelled()
                    // reports the job will never run again.
                    job.cancelled.store(true, Ordering::SeqCst);
                    trace!(job = job.id, "job completed");
                }
            }
        }
    }

    /// Ticks elapsed since creation.
    pub fn tick_count(&self) -> u64 {
        self.inner.tick.load(Ordering::SeqCst)
    }

    /// Number of jobs currently scheduled (including not-yet-due ones).
    pub fn job_count(&self) -> usize {
        self.jobs().len()
    }

    /// The configured driver rate in Hz.
    pub fn tick_rate_hz(&self) -> u32 {
        self.inner.config.tick_rate_hz
    }

    /// Spawns a Tokio task that calls [`tick`](Self::tick) at the
    /// configured rate until aborted.
    ///
    /// `MissedTickBehavior::Delay` means a stalled driver stretches
    /// ticks instead of firing a burst — tick-counted durations stall
    /// with the server rather than expiring early.
    pub fn spawn_driver(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let period = self.inner.config.tick_duration();
        debug!(rate_hz = self.inner.config.tick_rate_hz, "driver started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                interval.tick().await;
                scheduler.tick();
            }
        })
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, Vec<Job>> {
        // A panicking job must not wedge the whole scheduler.
        self.inner.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
