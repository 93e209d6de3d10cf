use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use motion_harness_common::config::{Config, HarnessConfig, StageConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bridge::NotificationBridge;
use crate::configurer::PipelineConfigurer;
use crate::gate::{StateGate, StateWaiter};
use crate::media::{HostWindow, MediaLocator, Pipeline, PipelineBuilder};

/// Why the harness is tearing the pipeline down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    WindowClosed,
    EndOfMedia,
    ConfigurationFailed,
}

/// Cloneable, non-blocking trigger for pipeline teardown. Safe to fire from
/// any thread, any number of times; only the first request is acted on.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ShutdownCause>,
}

impl ShutdownHandle {
    pub fn request(&self, cause: ShutdownCause) {
        if self.tx.send(cause).is_err() {
            debug!(?cause, "shutdown already handled, ignoring request");
        }
    }
}

pub fn shutdown_channel() -> (ShutdownHandle, mpsc::UnboundedReceiver<ShutdownCause>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ShutdownHandle { tx }, rx)
}

/// Closes a pipeline at most once, whoever asks first.
pub struct PipelineCloser {
    pipeline: Arc<dyn Pipeline>,
    closing: AtomicBool,
}

impl PipelineCloser {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            pipeline,
            closing: AtomicBool::new(false),
        }
    }

    /// Returns true if this call performed the close.
    pub fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let state = self.pipeline.state();
        self.pipeline.close();
        info!(?state, "pipeline closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Owns the pipeline from creation to close.
///
/// Window-close and end-of-media requests both land on one channel that
/// only the owner drains, so teardown happens on the owner's thread and
/// never inside a pipeline callback.
pub struct LifecycleOwner {
    builder: Box<dyn PipelineBuilder>,
    harness: HarnessConfig,
    stages: StageConfig,
    closer: Option<PipelineCloser>,
    shutdown: ShutdownHandle,
    causes: mpsc::UnboundedReceiver<ShutdownCause>,
}

impl LifecycleOwner {
    pub fn new(builder: Box<dyn PipelineBuilder>, config: &Config) -> Self {
        let (shutdown, causes) = shutdown_channel();
        Self {
            builder,
            harness: config.harness.clone(),
            stages: config.stages.clone(),
            closer: None,
            shutdown,
            causes,
        }
    }

    /// Creates the pipeline for `locator` and drives it to playback.
    /// Failures are logged here; callers only learn whether it worked.
    pub fn open(&mut self, locator: &MediaLocator, window: &mut dyn HostWindow) -> bool {
        let pipeline = match self.builder.create(locator) {
            Ok(p) => p,
            Err(e) => {
                error!(%locator, error = %e, "failed to create a pipeline from the given locator");
                return false;
            }
        };
        info!(%locator, "pipeline created");
        self.closer = Some(PipelineCloser::new(Arc::clone(&pipeline)));

        let gate = Arc::new(StateGate::new());
        let bridge = Arc::new(NotificationBridge::new(
            Arc::clone(&gate),
            self.shutdown.clone(),
        ));
        let waiter = StateWaiter::new(gate, self.harness.wait_timeout());
        let configurer = PipelineConfigurer::new(self.stages.clone(), waiter);

        match configurer.configure(pipeline.as_ref(), &bridge, window) {
            Ok(()) => {
                window.on_close(self.shutdown.clone());
                true
            }
            Err(e) => {
                error!(error = %e, "failed to open pipeline");
                false
            }
        }
    }

    /// Blocks until the first shutdown request, then closes the pipeline.
    pub fn wait_for_shutdown(&mut self) -> ShutdownCause {
        // `self.shutdown` keeps a sender alive, so the channel cannot close.
        let cause = self
            .causes
            .blocking_recv()
            .unwrap_or(ShutdownCause::WindowClosed);
        info!(?cause, "shutdown requested");
        self.close();
        while let Ok(extra) = self.causes.try_recv() {
            debug!(cause = ?extra, "ignoring additional shutdown request");
        }
        cause
    }

    /// Closes the pipeline if one was created. Idempotent.
    pub fn close(&self) -> bool {
        self.closer.as_ref().map(|c| c.close()).unwrap_or(false)
    }

    pub fn run(&mut self, locator: &MediaLocator, window: &mut dyn HostWindow) -> ShutdownCause {
        if !self.open(locator, window) {
            self.close();
            return ShutdownCause::ConfigurationFailed;
        }
        self.wait_for_shutdown()
    }
}
