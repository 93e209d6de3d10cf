use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use motion_harness_common::frame::{FormatDescriptor, VideoFrame};

use crate::lifecycle::ShutdownHandle;
use crate::stage::StageChain;

/// Ordered lifecycle of a pipeline. Variants are declared in the order a
/// pipeline passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Unrealized,
    Configuring,
    Configured,
    Realizing,
    Realized,
    Prefetching,
    Prefetched,
    Started,
}

/// Asynchronous transition requests understood by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Configure,
    Realize,
    Prefetch,
    Start,
}

impl Transition {
    /// State the pipeline reports once this request completes.
    pub fn target(self) -> LifecycleState {
        match self {
            Transition::Configure => LifecycleState::Configured,
            Transition::Realize => LifecycleState::Realized,
            Transition::Prefetch => LifecycleState::Prefetched,
            Transition::Start => LifecycleState::Started,
        }
    }
}

/// Notifications a pipeline delivers to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    ConfigureComplete,
    RealizeComplete,
    PrefetchComplete,
    ResourceUnavailable { reason: String },
    EndOfMedia,
    Started,
    Stopped,
    Closed,
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEvent::ConfigureComplete => f.write_str("configure complete"),
            ControllerEvent::RealizeComplete => f.write_str("realize complete"),
            ControllerEvent::PrefetchComplete => f.write_str("prefetch complete"),
            ControllerEvent::ResourceUnavailable { reason } => {
                write!(f, "resource unavailable: {reason}")
            }
            ControllerEvent::EndOfMedia => f.write_str("end of media"),
            ControllerEvent::Started => f.write_str("started"),
            ControllerEvent::Stopped => f.write_str("stopped"),
            ControllerEvent::Closed => f.write_str("closed"),
        }
    }
}

/// Receives pipeline notifications, possibly on a pipeline-owned thread.
/// Implementations must return quickly.
pub trait ControllerListener: Send + Sync {
    fn controller_update(&self, event: &ControllerEvent);
}

/// Output content type requested from a pipeline. `None` means plain
/// playback with no re-multiplexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor(pub String);

/// A `<scheme>:<resource>` source locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLocator {
    scheme: String,
    resource: String,
}

impl MediaLocator {
    pub fn parse(url: &str) -> Result<Self, PipelineError> {
        let (scheme, resource) = url
            .split_once(':')
            .ok_or_else(|| PipelineError::InvalidLocator(url.to_string()))?;
        if scheme.is_empty() {
            return Err(PipelineError::InvalidLocator(url.to_string()));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            resource: resource.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.resource)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot build media locator from: {0}")]
    InvalidLocator(String),
    #[error("no pipeline builder for scheme {scheme:?}")]
    NoBuilder { scheme: String },
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),
    #[error("failed to start pipeline worker: {0}")]
    Worker(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("track does not support processing stages")]
    Unsupported,
}

/// One media track exposed by a configured pipeline.
pub trait Track: Send + Sync {
    fn format(&self) -> FormatDescriptor;

    /// Installs `chain` on this track's data path. The chain is consumed
    /// on success and dropped on failure.
    fn attach_stage_chain(&self, chain: StageChain) -> Result<(), AttachError>;
}

/// The asynchronous media pipeline driven by the harness.
pub trait Pipeline: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn ControllerListener>);

    /// Starts a transition in the background. Completion or failure is
    /// reported through the listeners.
    fn request_transition(&self, transition: Transition);

    fn state(&self) -> LifecycleState;

    fn set_content_descriptor(&self, descriptor: Option<ContentDescriptor>);

    /// Track handles, or `None` when the pipeline cannot expose them yet.
    fn tracks(&self) -> Option<Vec<Arc<dyn Track>>>;

    fn visual_surface(&self) -> Option<Surface>;

    fn control_surface(&self) -> Option<Surface>;

    fn close(&self);
}

/// Creates pipelines from locators.
pub trait PipelineBuilder: Send + Sync {
    fn create(&self, locator: &MediaLocator) -> Result<Arc<dyn Pipeline>, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Visual,
    Control,
}

/// Placement of a surface inside the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Center,
    South,
}

/// Counters shared between a pipeline's renderer and whoever hosts its
/// surfaces.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames: AtomicU64,
    motion_frames: AtomicU64,
}

impl PlaybackStats {
    pub fn present(&self, frame: &VideoFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if frame.has_motion() {
            self.motion_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn motion_frames(&self) -> u64 {
        self.motion_frames.load(Ordering::Relaxed)
    }
}

/// A component a pipeline offers for display.
#[derive(Debug, Clone)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub label: String,
    pub stats: Arc<PlaybackStats>,
}

/// Whatever hosts the pipeline's surfaces.
pub trait HostWindow {
    fn attach(&mut self, surface: Surface, region: Region);

    fn show(&mut self);

    /// Registers the handle the window fires when it is being closed.
    fn on_close(&mut self, hook: ShutdownHandle);
}
