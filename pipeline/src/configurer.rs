use std::sync::Arc;

use motion_harness_common::config::StageConfig;
use tracing::{info, warn};

use crate::bridge::NotificationBridge;
use crate::gate::{StateWaiter, WaitError};
use crate::media::{HostWindow, Pipeline, Region, Track, Transition};
use crate::stage::StageChain;

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("failed to {step} the pipeline: {source}")]
    Transition {
        step: &'static str,
        #[source]
        source: WaitError,
    },
    #[error("failed to obtain track controls from the pipeline")]
    NoTrackControls,
    #[error("the input media does not contain a video track")]
    NoVideoTrack,
}

/// Walks a freshly created pipeline up to `Started`, inserting the
/// processing chain into its video track on the way.
///
/// Every gated transition arms the gate, issues the request and blocks
/// until the bridge reports the target state or a failure. Nothing after a
/// failed step is requested.
pub struct PipelineConfigurer {
    stages: StageConfig,
    waiter: StateWaiter,
}

impl PipelineConfigurer {
    pub fn new(stages: StageConfig, waiter: StateWaiter) -> Self {
        Self { stages, waiter }
    }

    pub fn configure(
        &self,
        pipeline: &dyn Pipeline,
        bridge: &Arc<NotificationBridge>,
        window: &mut dyn HostWindow,
    ) -> Result<(), ConfigureError> {
        // Listener goes in before the first request so no completion is missed.
        pipeline.add_listener(bridge.clone());

        self.transition(pipeline, bridge, Transition::Configure, "configure")?;

        // Plain playback, no output content type.
        pipeline.set_content_descriptor(None);

        let tracks = pipeline
            .tracks()
            .filter(|tracks| !tracks.is_empty())
            .ok_or(ConfigureError::NoTrackControls)?;
        let video_track = select_video_track(&tracks).ok_or(ConfigureError::NoVideoTrack)?;
        info!(format = %video_track.format(), "selected video track");

        let chain = StageChain::motion_and_timestamp(&self.stages);
        let names = chain.names();
        match video_track.attach_stage_chain(chain) {
            Ok(()) => info!(stages = ?names, "processing stages attached to video track"),
            Err(e) => warn!(error = %e, "continuing without processing stages"),
        }

        self.transition(pipeline, bridge, Transition::Prefetch, "realize")?;

        if let Some(visual) = pipeline.visual_surface() {
            window.attach(visual, Region::Center);
        }
        if let Some(control) = pipeline.control_surface() {
            window.attach(control, Region::South);
        }

        pipeline.request_transition(Transition::Start);
        window.show();
        info!("pipeline started");
        Ok(())
    }

    fn transition(
        &self,
        pipeline: &dyn Pipeline,
        bridge: &NotificationBridge,
        transition: Transition,
        step: &'static str,
    ) -> Result<(), ConfigureError> {
        let target = transition.target();
        bridge.gate().arm();
        pipeline.request_transition(transition);
        let reached = self
            .waiter
            .wait(target)
            .map_err(|source| ConfigureError::Transition { step, source })?;
        info!(state = ?reached, "pipeline transition complete");
        Ok(())
    }
}

/// First track whose format is video. Later video tracks are ignored.
pub fn select_video_track(tracks: &[Arc<dyn Track>]) -> Option<&Arc<dyn Track>> {
    tracks.iter().find(|track| track.format().is_video())
}
