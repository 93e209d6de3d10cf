use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use motion_harness_common::frame::FormatDescriptor;

use crate::lifecycle::ShutdownHandle;
use crate::media::{
    AttachError, ContentDescriptor, ControllerEvent, ControllerListener, HostWindow,
    LifecycleState, MediaLocator, Pipeline, PipelineBuilder, PipelineError, PlaybackStats, Region,
    Surface, SurfaceKind, Track, Transition,
};
use crate::stage::StageChain;

/// How the fake answers a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    Complete,
    Unavailable,
    Silent,
}

pub(crate) struct FakeTrack {
    format: FormatDescriptor,
    supports_stages: bool,
    attempts: AtomicUsize,
    attached: Mutex<Vec<String>>,
}

impl FakeTrack {
    fn with(format: FormatDescriptor, supports_stages: bool) -> Arc<Self> {
        Arc::new(Self {
            format,
            supports_stages,
            attempts: AtomicUsize::new(0),
            attached: Mutex::new(Vec::new()),
        })
    }

    fn video_format(encoding: &str) -> FormatDescriptor {
        FormatDescriptor::Video {
            encoding: encoding.into(),
            width: 320,
            height: 240,
            fps: 15.0,
        }
    }

    pub(crate) fn video(encoding: &str) -> Arc<Self> {
        Self::with(Self::video_format(encoding), true)
    }

    pub(crate) fn video_without_stages(encoding: &str) -> Arc<Self> {
        Self::with(Self::video_format(encoding), false)
    }

    pub(crate) fn audio(encoding: &str) -> Arc<Self> {
        Self::with(
            FormatDescriptor::Audio {
                encoding: encoding.into(),
                sample_rate: 44_100,
                channels: 2,
            },
            true,
        )
    }

    pub(crate) fn attach_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn attached(&self) -> Vec<String> {
        self.attached.lock().unwrap().clone()
    }
}

impl Track for FakeTrack {
    fn format(&self) -> FormatDescriptor {
        self.format.clone()
    }

    fn attach_stage_chain(&self, chain: StageChain) -> Result<(), AttachError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.supports_stages {
            return Err(AttachError::Unsupported);
        }
        *self.attached.lock().unwrap() = chain.names();
        Ok(())
    }
}

/// Pipeline that completes transitions instantly, notifying from a
/// separate thread like a real engine would.
pub(crate) struct FakePipeline {
    tracks: Vec<Arc<FakeTrack>>,
    scripts: Vec<(Transition, Script)>,
    control_surface: bool,
    listeners: Mutex<Vec<Arc<dyn ControllerListener>>>,
    requests: Mutex<Vec<Transition>>,
    state: Mutex<LifecycleState>,
    descriptor_cleared: AtomicBool,
    closes: AtomicUsize,
}

impl FakePipeline {
    pub(crate) fn new(tracks: Vec<Arc<FakeTrack>>) -> Self {
        Self {
            tracks,
            scripts: Vec::new(),
            control_surface: false,
            listeners: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            state: Mutex::new(LifecycleState::Unrealized),
            descriptor_cleared: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_script(mut self, transition: Transition, script: Script) -> Self {
        self.scripts.push((transition, script));
        self
    }

    pub(crate) fn with_control_surface(mut self) -> Self {
        self.control_surface = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<Transition> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn content_descriptor_cleared(&self) -> bool {
        self.descriptor_cleared.load(Ordering::SeqCst)
    }

    pub(crate) fn emit_end_of_media(&self) {
        for listener in self.listeners.lock().unwrap().clone() {
            listener.controller_update(&ControllerEvent::EndOfMedia);
        }
    }

    fn script_for(&self, transition: Transition) -> Script {
        self.scripts
            .iter()
            .find(|(t, _)| *t == transition)
            .map(|(_, s)| *s)
            .unwrap_or(Script::Complete)
    }
}

impl Pipeline for FakePipeline {
    fn add_listener(&self, listener: Arc<dyn ControllerListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn request_transition(&self, transition: Transition) {
        self.requests.lock().unwrap().push(transition);

        let events = match self.script_for(transition) {
            Script::Silent => Vec::new(),
            Script::Unavailable => vec![ControllerEvent::ResourceUnavailable {
                reason: "scripted failure".into(),
            }],
            Script::Complete => {
                *self.state.lock().unwrap() = transition.target();
                match transition {
                    Transition::Configure => vec![ControllerEvent::ConfigureComplete],
                    Transition::Realize => vec![ControllerEvent::RealizeComplete],
                    Transition::Prefetch => vec![
                        ControllerEvent::RealizeComplete,
                        ControllerEvent::PrefetchComplete,
                    ],
                    Transition::Start => vec![ControllerEvent::Started],
                }
            }
        };

        let listeners = self.listeners.lock().unwrap().clone();
        thread::spawn(move || {
            for event in &events {
                for listener in &listeners {
                    listener.controller_update(event);
                }
            }
        });
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    fn set_content_descriptor(&self, descriptor: Option<ContentDescriptor>) {
        self.descriptor_cleared
            .store(descriptor.is_none(), Ordering::SeqCst);
    }

    fn tracks(&self) -> Option<Vec<Arc<dyn Track>>> {
        Some(
            self.tracks
                .iter()
                .map(|t| Arc::clone(t) as Arc<dyn Track>)
                .collect(),
        )
    }

    fn visual_surface(&self) -> Option<Surface> {
        Some(Surface {
            kind: SurfaceKind::Visual,
            label: "fake video".into(),
            stats: Arc::new(PlaybackStats::default()),
        })
    }

    fn control_surface(&self) -> Option<Surface> {
        self.control_surface.then(|| Surface {
            kind: SurfaceKind::Control,
            label: "fake controls".into(),
            stats: Arc::new(PlaybackStats::default()),
        })
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeBuilder {
    pipeline: Option<Arc<FakePipeline>>,
}

impl FakeBuilder {
    pub(crate) fn serving(pipeline: Arc<FakePipeline>) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }

    pub(crate) fn refusing() -> Self {
        Self { pipeline: None }
    }
}

impl PipelineBuilder for FakeBuilder {
    fn create(&self, locator: &MediaLocator) -> Result<Arc<dyn Pipeline>, PipelineError> {
        match &self.pipeline {
            Some(p) => Ok(Arc::clone(p) as Arc<dyn Pipeline>),
            None => Err(PipelineError::NoBuilder {
                scheme: locator.scheme().to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeWindow {
    pub(crate) attached: Vec<(SurfaceKind, Region)>,
    pub(crate) shown: bool,
    pub(crate) close_hook: Option<ShutdownHandle>,
}

impl HostWindow for FakeWindow {
    fn attach(&mut self, surface: Surface, region: Region) {
        self.attached.push((surface.kind, region));
    }

    fn show(&mut self) {
        self.shown = true;
    }

    fn on_close(&mut self, hook: ShutdownHandle) {
        self.close_hook = Some(hook);
    }
}
