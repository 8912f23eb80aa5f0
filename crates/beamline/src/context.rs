//! Shared environment every beam runs in.

use std::sync::Arc;

use beamline_protocol::{ProtocolAdapter, ProtocolError, ServerVersion, resolve_adapter};
use beamline_tick::Scheduler;
use beamline_viewer::ObserverRegistry;

/// The three collaborators a beam needs: a protocol adapter for the
/// active server version, the observer registry, and the tick
/// scheduler. Cheap to clone; one context is typically built at startup
/// and handed to every beam constructor.
///
/// If adapter resolution fails at startup there is no context, and so
/// no way to construct any beam — the whole subsystem stays disabled.
#[derive(Clone)]
pub struct BeamContext {
    adapter: Arc<dyn ProtocolAdapter>,
    observers: ObserverRegistry,
    scheduler: Scheduler,
}

impl BeamContext {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        observers: ObserverRegistry,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            adapter,
            observers,
            scheduler,
        }
    }

    /// Resolves the adapter for a detected server version and wraps it
    /// in a context.
    pub fn resolve(
        version: ServerVersion,
        observers: ObserverRegistry,
        scheduler: Scheduler,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(resolve_adapter(version)?, observers, scheduler))
    }

    pub fn adapter(&self) -> &Arc<dyn ProtocolAdapter> {
        &self.adapter
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
