mod worker;

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use motion_harness_common::config::SyntheticConfig;
use motion_harness_common::frame::FormatDescriptor;
use tracing::{debug, error, info, warn};

use crate::media::{
    AttachError, ContentDescriptor, ControllerEvent, ControllerListener, LifecycleState,
    MediaLocator, Pipeline, PipelineBuilder, PipelineError, PlaybackStats, Surface, SurfaceKind,
    Track, Transition,
};
use crate::stage::StageChain;

use self::worker::Command;

const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "avi", "mkv", "mpg", "mpeg", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "au", "aiff", "ogg", "flac"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaLayout {
    VideoOnly,
    VideoAndAudio,
    AudioOnly,
}

fn classify(locator: &MediaLocator) -> Result<MediaLayout, PipelineError> {
    if locator.scheme() == "synthetic" {
        return Ok(MediaLayout::VideoOnly);
    }
    let ext = Path::new(locator.resource())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some(e) if VIDEO_EXTENSIONS.contains(&e) => Ok(MediaLayout::VideoAndAudio),
        Some(e) if AUDIO_EXTENSIONS.contains(&e) => Ok(MediaLayout::AudioOnly),
        _ => Err(PipelineError::UnsupportedMedia(locator.to_string())),
    }
}

/// Builds [`SyntheticPipeline`]s for the configured schemes.
pub struct SyntheticBuilder {
    config: SyntheticConfig,
}

impl SyntheticBuilder {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

impl PipelineBuilder for SyntheticBuilder {
    fn create(&self, locator: &MediaLocator) -> Result<Arc<dyn Pipeline>, PipelineError> {
        if !self
            .config
            .schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(locator.scheme()))
        {
            return Err(PipelineError::NoBuilder {
                scheme: locator.scheme().to_string(),
            });
        }
        let layout = classify(locator)?;
        let pipeline = SyntheticPipeline::spawn(locator, layout, self.config.clone())?;
        Ok(Arc::new(pipeline))
    }
}

pub(crate) struct SyntheticTrack {
    format: FormatDescriptor,
    accepts_stages: bool,
    chain: Mutex<Option<StageChain>>,
}

impl SyntheticTrack {
    fn new(format: FormatDescriptor, accepts_stages: bool) -> Self {
        Self {
            format,
            accepts_stages,
            chain: Mutex::new(None),
        }
    }

    pub(crate) fn take_chain(&self) -> Option<StageChain> {
        lock(&self.chain).take()
    }
}

impl Track for SyntheticTrack {
    fn format(&self) -> FormatDescriptor {
        self.format.clone()
    }

    fn attach_stage_chain(&self, chain: StageChain) -> Result<(), AttachError> {
        if !self.accepts_stages || !self.format.is_video() {
            return Err(AttachError::Unsupported);
        }
        debug!(stages = ?chain.names(), "stage chain installed");
        *lock(&self.chain) = Some(chain);
        Ok(())
    }
}

/// State shared between the pipeline handle and its worker thread.
pub(crate) struct Shared {
    config: SyntheticConfig,
    state: Mutex<LifecycleState>,
    listeners: Mutex<Vec<Arc<dyn ControllerListener>>>,
    tracks: Vec<Arc<SyntheticTrack>>,
    stats: Arc<PlaybackStats>,
}

impl Shared {
    pub(crate) fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        *lock(&self.state) = state;
    }

    /// Delivers `event` to every listener, outside the listener lock.
    pub(crate) fn notify(&self, event: ControllerEvent) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.controller_update(&event);
        }
    }
}

/// In-process pipeline that fabricates its media. Transitions run on a
/// worker thread and are reported to listeners as controller events.
pub struct SyntheticPipeline {
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticPipeline {
    fn spawn(
        locator: &MediaLocator,
        layout: MediaLayout,
        config: SyntheticConfig,
    ) -> Result<Self, PipelineError> {
        let video = FormatDescriptor::Video {
            encoding: "gray8".into(),
            width: config.width,
            height: config.height,
            fps: config.fps,
        };
        let audio = FormatDescriptor::Audio {
            encoding: "lpcm".into(),
            sample_rate: 44_100,
            channels: 2,
        };
        let formats = match layout {
            MediaLayout::VideoOnly => vec![video],
            MediaLayout::VideoAndAudio => vec![video, audio],
            MediaLayout::AudioOnly => vec![audio],
        };
        let tracks = formats
            .into_iter()
            .map(|f| Arc::new(SyntheticTrack::new(f, config.stage_insertion)))
            .collect();

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(LifecycleState::Unrealized),
            listeners: Mutex::new(Vec::new()),
            tracks,
            stats: Arc::new(PlaybackStats::default()),
        });

        let (tx, rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("synthetic-pipeline".into())
            .spawn(move || worker::run(worker_shared, rx))?;

        info!(%locator, ?layout, "synthetic pipeline created");
        Ok(Self {
            shared,
            commands: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn stats(&self) -> Arc<PlaybackStats> {
        Arc::clone(&self.shared.stats)
    }
}

impl Pipeline for SyntheticPipeline {
    fn add_listener(&self, listener: Arc<dyn ControllerListener>) {
        lock(&self.shared.listeners).push(listener);
    }

    fn request_transition(&self, transition: Transition) {
        match lock(&self.commands).as_ref() {
            Some(tx) if tx.send(Command::Transition(transition)).is_ok() => {}
            _ => warn!(?transition, "pipeline is closed, ignoring transition request"),
        }
    }

    fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    fn set_content_descriptor(&self, descriptor: Option<ContentDescriptor>) {
        // Synthetic media is only ever played back.
        if let Some(ContentDescriptor(kind)) = descriptor {
            warn!(kind, "output content types are not supported, playing back instead");
        }
    }

    fn tracks(&self) -> Option<Vec<Arc<dyn Track>>> {
        if self.shared.state() < LifecycleState::Configured {
            return None;
        }
        Some(
            self.shared
                .tracks
                .iter()
                .map(|t| Arc::clone(t) as Arc<dyn Track>)
                .collect(),
        )
    }

    fn visual_surface(&self) -> Option<Surface> {
        let has_video = self.shared.tracks.iter().any(|t| t.format.is_video());
        has_video.then(|| Surface {
            kind: SurfaceKind::Visual,
            label: format!(
                "synthetic video {}x{}",
                self.shared.config.width, self.shared.config.height
            ),
            stats: Arc::clone(&self.shared.stats),
        })
    }

    fn control_surface(&self) -> Option<Surface> {
        self.shared.config.control_panel.then(|| Surface {
            kind: SurfaceKind::Control,
            label: "playback controls".into(),
            stats: Arc::clone(&self.shared.stats),
        })
    }

    fn close(&self) {
        if let Some(tx) = lock(&self.commands).take() {
            // The worker may already be gone; dropping the sender stops it too.
            let _ = tx.send(Command::Close);
        }
        let Some(handle) = lock(&self.worker).take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            warn!("close requested from the pipeline worker, not joining");
            return;
        }
        if handle.join().is_err() {
            error!("synthetic pipeline worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NotificationBridge;
    use crate::gate::{StateGate, StateWaiter};
    use crate::lifecycle::{shutdown_channel, LifecycleOwner, ShutdownCause};
    use crate::media::Region;
    use crate::stage::traits::ProcessingStage;
    use crate::testing::FakeWindow;
    use motion_harness_common::frame::VideoFrame;
    use motion_harness_common::config::{Config, FailurePoint};
    use std::time::Duration;

    fn quick() -> SyntheticConfig {
        SyntheticConfig {
            width: 64,
            height: 48,
            fps: 0.0,
            frame_count: 12,
            transition_delay_ms: 1,
            ..SyntheticConfig::default()
        }
    }

    fn config(synthetic: SyntheticConfig) -> Config {
        let mut config = Config::default();
        config.harness.wait_timeout_secs = 5;
        config.stages.motion_threshold = 4;
        config.synthetic = synthetic;
        config
    }

    fn locator(url: &str) -> MediaLocator {
        MediaLocator::parse(url).unwrap()
    }

    #[test]
    fn refuses_unknown_scheme() {
        let builder = SyntheticBuilder::new(quick());
        assert!(matches!(
            builder.create(&locator("vfw://0")),
            Err(PipelineError::NoBuilder { .. })
        ));
    }

    #[test]
    fn refuses_unclassified_media() {
        let builder = SyntheticBuilder::new(quick());
        assert!(matches!(
            builder.create(&locator("file:notes.txt")),
            Err(PipelineError::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(
            classify(&locator("file:clip.MOV")).unwrap(),
            MediaLayout::VideoAndAudio
        );
        assert_eq!(
            classify(&locator("http://host/song.mp3")).unwrap(),
            MediaLayout::AudioOnly
        );
        assert_eq!(
            classify(&locator("synthetic:anything")).unwrap(),
            MediaLayout::VideoOnly
        );
    }

    #[test]
    fn tracks_hidden_until_configured() {
        let pipeline = SyntheticBuilder::new(quick())
            .create(&locator("file:sample.mov"))
            .unwrap();
        assert!(pipeline.tracks().is_none());

        let (handle, _rx) = shutdown_channel();
        let gate = Arc::new(StateGate::new());
        pipeline.add_listener(Arc::new(NotificationBridge::new(Arc::clone(&gate), handle)));
        gate.arm();
        pipeline.request_transition(Transition::Configure);
        let waiter = StateWaiter::new(gate, Some(Duration::from_secs(5)));
        assert!(waiter.wait_for_state(LifecycleState::Configured));

        let tracks = pipeline.tracks().unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].format().is_video());
        assert!(tracks[1].format().is_audio());
        assert!(matches!(
            tracks[1].attach_stage_chain(StageChain::default()),
            Err(AttachError::Unsupported)
        ));
        pipeline.close();
    }

    #[test]
    fn plays_clip_to_end_of_media() {
        let mut owner = LifecycleOwner::new(
            Box::new(SyntheticBuilder::new(quick())),
            &config(quick()),
        );

        let mut window = FakeWindow::default();
        let cause = owner.run(&locator("file:sample.mov"), &mut window);
        assert_eq!(cause, ShutdownCause::EndOfMedia);
        assert!(window.shown);
        assert_eq!(
            window.attached,
            vec![
                (SurfaceKind::Visual, Region::Center),
                (SurfaceKind::Control, Region::South)
            ]
        );
        assert!(!owner.close());
    }

    #[test]
    fn stages_see_every_frame() {
        let synthetic = quick();
        let frame_count = synthetic.frame_count;
        let pipeline = SyntheticPipeline::spawn(
            &locator("synthetic:clip"),
            MediaLayout::VideoOnly,
            synthetic.clone(),
        )
        .unwrap();
        let stats = pipeline.stats();
        let mut owner = LifecycleOwner::new(
            Box::new(Serving(Arc::new(pipeline))),
            &config(synthetic),
        );

        let mut window = FakeWindow::default();
        assert_eq!(
            owner.run(&locator("synthetic:clip"), &mut window),
            ShutdownCause::EndOfMedia
        );
        assert_eq!(stats.frames(), frame_count);
        assert!(stats.motion_frames() > 0);
        assert!(stats.motion_frames() < frame_count);
    }

    #[test]
    fn degraded_pipeline_still_plays() {
        let synthetic = SyntheticConfig {
            stage_insertion: false,
            control_panel: false,
            ..quick()
        };
        let pipeline = SyntheticPipeline::spawn(
            &locator("synthetic:clip"),
            MediaLayout::VideoOnly,
            synthetic.clone(),
        )
        .unwrap();
        let stats = pipeline.stats();
        let mut owner = LifecycleOwner::new(
            Box::new(Serving(Arc::new(pipeline))),
            &config(synthetic.clone()),
        );

        let mut window = FakeWindow::default();
        assert_eq!(
            owner.run(&locator("synthetic:clip"), &mut window),
            ShutdownCause::EndOfMedia
        );
        assert_eq!(stats.frames(), synthetic.frame_count);
        assert_eq!(stats.motion_frames(), 0);
        assert_eq!(window.attached.len(), 1);
    }

    #[test]
    fn failure_points_abort_open() {
        for point in [FailurePoint::Configure, FailurePoint::Prefetch] {
            let synthetic = SyntheticConfig {
                fail_at: Some(point),
                ..quick()
            };
            let mut owner = LifecycleOwner::new(
                Box::new(SyntheticBuilder::new(synthetic.clone())),
                &config(synthetic),
            );
            let mut window = FakeWindow::default();
            assert_eq!(
                owner.run(&locator("synthetic:clip"), &mut window),
                ShutdownCause::ConfigurationFailed
            );
            assert!(!window.shown);
            assert!(window.attached.is_empty());
        }
    }

    #[test]
    fn audio_only_media_fails_open() {
        let mut owner = LifecycleOwner::new(
            Box::new(SyntheticBuilder::new(quick())),
            &config(quick()),
        );
        let mut window = FakeWindow::default();
        assert_eq!(
            owner.run(&locator("file:song.wav"), &mut window),
            ShutdownCause::ConfigurationFailed
        );
    }

    #[test]
    fn close_interrupts_playback() {
        let synthetic = SyntheticConfig {
            fps: 50.0,
            frame_count: 10_000,
            ..quick()
        };
        let pipeline = SyntheticPipeline::spawn(
            &locator("synthetic:clip"),
            MediaLayout::VideoOnly,
            synthetic.clone(),
        )
        .unwrap();
        let stats = pipeline.stats();
        let pipeline: Arc<dyn Pipeline> = Arc::new(pipeline);
        let mut owner =
            LifecycleOwner::new(Box::new(Serving(Arc::clone(&pipeline))), &config(synthetic));

        let mut window = FakeWindow::default();
        assert!(owner.open(&locator("synthetic:clip"), &mut window));
        std::thread::sleep(Duration::from_millis(100));
        window
            .close_hook
            .as_ref()
            .unwrap()
            .request(ShutdownCause::WindowClosed);
        assert_eq!(owner.wait_for_shutdown(), ShutdownCause::WindowClosed);
        assert!(stats.frames() < 10_000);
        assert_eq!(pipeline.state(), LifecycleState::Unrealized);
    }

    #[test]
    fn invalid_timestamp_format_still_reaches_end_of_media() {
        let mut config = config(quick());
        config.stages.timestamp_format = "%Q".into();
        let mut owner = LifecycleOwner::new(
            Box::new(SyntheticBuilder::new(quick())),
            &config,
        );
        let mut window = FakeWindow::default();
        assert_eq!(
            owner.run(&locator("synthetic:clip"), &mut window),
            ShutdownCause::EndOfMedia
        );
    }

    struct Exploding;

    impl ProcessingStage for Exploding {
        fn process(&mut self, frame: &mut VideoFrame) {
            if frame.seq == 2 {
                panic!("stage failure on frame {}", frame.seq);
            }
        }
    }

    #[test]
    fn panicking_stage_does_not_stall_playback() {
        let synthetic = quick();
        let frame_count = synthetic.frame_count;
        let pipeline = SyntheticPipeline::spawn(
            &locator("synthetic:clip"),
            MediaLayout::VideoOnly,
            synthetic,
        )
        .unwrap();
        let stats = pipeline.stats();

        let (handle, mut causes) = shutdown_channel();
        let gate = Arc::new(StateGate::new());
        pipeline.add_listener(Arc::new(NotificationBridge::new(Arc::clone(&gate), handle)));
        let waiter = StateWaiter::new(Arc::clone(&gate), Some(Duration::from_secs(5)));

        gate.arm();
        pipeline.request_transition(Transition::Configure);
        assert!(waiter.wait_for_state(LifecycleState::Configured));
        let tracks = pipeline.tracks().unwrap();
        tracks[0]
            .attach_stage_chain(StageChain::new(vec![Box::new(Exploding)]))
            .unwrap();

        gate.arm();
        pipeline.request_transition(Transition::Prefetch);
        assert!(waiter.wait_for_state(LifecycleState::Prefetched));
        pipeline.request_transition(Transition::Start);

        assert_eq!(causes.blocking_recv(), Some(ShutdownCause::EndOfMedia));
        assert_eq!(stats.frames(), frame_count);
        pipeline.close();
    }

    /// Hands out one pre-built pipeline so tests can keep a handle on it.
    struct Serving(Arc<dyn Pipeline>);

    impl PipelineBuilder for Serving {
        fn create(&self, _locator: &MediaLocator) -> Result<Arc<dyn Pipeline>, PipelineError> {
            Ok(Arc::clone(&self.0))
        }
    }
}
