use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gate::StateGate;
use crate::lifecycle::{ShutdownCause, ShutdownHandle};
use crate::media::{ControllerEvent, ControllerListener, LifecycleState};

/// Translates pipeline notifications into state-gate updates and shutdown
/// requests.
///
/// Runs on whatever thread the pipeline notifies from, so it only touches
/// the gate and the shutdown channel. It never closes the pipeline.
pub struct NotificationBridge {
    gate: Arc<StateGate>,
    shutdown: ShutdownHandle,
}

impl NotificationBridge {
    pub fn new(gate: Arc<StateGate>, shutdown: ShutdownHandle) -> Self {
        Self { gate, shutdown }
    }

    pub fn gate(&self) -> &Arc<StateGate> {
        &self.gate
    }
}

impl ControllerListener for NotificationBridge {
    fn controller_update(&self, event: &ControllerEvent) {
        debug!(%event, "controller event");
        match event {
            ControllerEvent::ConfigureComplete => self.gate.complete(LifecycleState::Configured),
            ControllerEvent::RealizeComplete => self.gate.complete(LifecycleState::Realized),
            ControllerEvent::PrefetchComplete => self.gate.complete(LifecycleState::Prefetched),
            ControllerEvent::ResourceUnavailable { reason } => {
                warn!(reason, "pipeline resources unavailable");
                self.gate.fail(format!("resource unavailable: {reason}"));
            }
            ControllerEvent::EndOfMedia => {
                info!("end of media reached, requesting shutdown");
                self.shutdown.request(ShutdownCause::EndOfMedia);
            }
            ControllerEvent::Started | ControllerEvent::Stopped | ControllerEvent::Closed => {}
        }
    }
}
