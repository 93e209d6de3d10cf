use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{GrayImage, Luma};
use motion_harness_common::config::FailurePoint;
use motion_harness_common::frame::VideoFrame;
use tracing::{debug, error, info, warn};

use crate::media::{ControllerEvent, LifecycleState, Transition};

use super::Shared;

const BACKGROUND: u8 = 24;
const FOREGROUND: u8 = 230;

#[derive(Debug)]
pub(crate) enum Command {
    Transition(Transition),
    Close,
}

enum Flow {
    Continue,
    Play,
    Closed,
}

/// Worker loop: applies transitions in arrival order and plays the clip
/// once started. Exits on `Close` or when the handle is dropped.
///
/// A panic on the worker is reported as lost resources followed by end of
/// media, so a pending wait aborts and the owner still tears down.
pub(crate) fn run(shared: Arc<Shared>, commands: Receiver<Command>) {
    if panic::catch_unwind(AssertUnwindSafe(|| serve(&shared, &commands))).is_err() {
        error!("synthetic pipeline worker panicked");
        shared.notify(ControllerEvent::ResourceUnavailable {
            reason: "pipeline worker panicked".into(),
        });
        shared.notify(ControllerEvent::EndOfMedia);
    }
    shared.set_state(LifecycleState::Unrealized);
    shared.notify(ControllerEvent::Closed);
    debug!("synthetic pipeline worker stopped");
}

fn serve(shared: &Shared, commands: &Receiver<Command>) {
    while let Ok(command) = commands.recv() {
        let flow = match command {
            Command::Close => Flow::Closed,
            Command::Transition(t) => match apply(shared, t) {
                Flow::Play => play(shared, commands),
                other => other,
            },
        };
        if matches!(flow, Flow::Closed) {
            break;
        }
    }
}

fn apply(shared: &Shared, transition: Transition) -> Flow {
    let delay = Duration::from_millis(shared.config.transition_delay_ms);
    let state = shared.state();

    match (transition, state) {
        (Transition::Configure, LifecycleState::Unrealized) => {
            shared.set_state(LifecycleState::Configuring);
            thread::sleep(delay);
            if shared.config.fail_at == Some(FailurePoint::Configure) {
                shared.set_state(LifecycleState::Unrealized);
                shared.notify(ControllerEvent::ResourceUnavailable {
                    reason: "no decoder available for the source".into(),
                });
            } else {
                shared.set_state(LifecycleState::Configured);
                shared.notify(ControllerEvent::ConfigureComplete);
            }
        }
        (Transition::Realize, LifecycleState::Configured) => realize(shared, delay),
        (Transition::Prefetch, LifecycleState::Configured | LifecycleState::Realized) => {
            if state == LifecycleState::Configured {
                realize(shared, delay);
            }
            shared.set_state(LifecycleState::Prefetching);
            thread::sleep(delay);
            if shared.config.fail_at == Some(FailurePoint::Prefetch) {
                shared.set_state(LifecycleState::Realized);
                shared.notify(ControllerEvent::ResourceUnavailable {
                    reason: "render surface could not be allocated".into(),
                });
            } else {
                shared.set_state(LifecycleState::Prefetched);
                shared.notify(ControllerEvent::PrefetchComplete);
            }
        }
        (Transition::Start, LifecycleState::Prefetched) => {
            shared.set_state(LifecycleState::Started);
            shared.notify(ControllerEvent::Started);
            return Flow::Play;
        }
        (transition, state) => {
            warn!(?transition, ?state, "transition not valid in current state, ignoring");
        }
    }
    Flow::Continue
}

fn realize(shared: &Shared, delay: Duration) {
    shared.set_state(LifecycleState::Realizing);
    thread::sleep(delay);
    shared.set_state(LifecycleState::Realized);
    shared.notify(ControllerEvent::RealizeComplete);
}

fn play(shared: &Shared, commands: &Receiver<Command>) -> Flow {
    let config = &shared.config;
    let interval = config.frame_interval();
    let mut chain = shared
        .tracks
        .iter()
        .find(|t| t.format.is_video())
        .and_then(|t| t.take_chain());
    let clip_start_ms = chrono::Utc::now().timestamp_millis();
    let frame_ms = interval.as_millis() as i64;

    info!(frames = config.frame_count, "synthetic playback started");
    for seq in 0..config.frame_count {
        match commands.recv_timeout(interval) {
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => {
                info!(presented = shared.stats.frames(), "playback interrupted");
                return Flow::Closed;
            }
            Ok(Command::Transition(t)) => {
                debug!(transition = ?t, "ignoring transition request during playback");
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let luma = render_frame(seq, config.frame_count, config.width, config.height);
        let mut frame = VideoFrame::new(luma, clip_start_ms + seq as i64 * frame_ms, seq);
        if let Some(stages) = chain.as_mut() {
            let ran = panic::catch_unwind(AssertUnwindSafe(|| stages.run(&mut frame)));
            if ran.is_err() {
                warn!(seq, stages = ?stages.names(), "stage chain panicked, playing on without it");
                chain = None;
            }
        }
        shared.stats.present(&frame);
        if frame.has_motion() {
            debug!(seq, overlay = frame.overlay.as_deref(), "motion frame presented");
        }
    }

    info!(
        frames = shared.stats.frames(),
        motion_frames = shared.stats.motion_frames(),
        "synthetic clip finished"
    );
    shared.set_state(LifecycleState::Prefetched);
    shared.notify(ControllerEvent::Stopped);
    shared.notify(ControllerEvent::EndOfMedia);
    Flow::Continue
}

/// Whether the square sits on the right edge in frame `seq`.
///
/// The clip is still for its first and last third. In the middle third the
/// square jumps between the left and right edges on every frame.
fn square_on_right(seq: u64, frame_count: u64) -> bool {
    let third = frame_count / 3;
    let moving = seq >= third && seq < 2 * third;
    moving && (seq - third) % 2 == 1
}

fn render_frame(seq: u64, frame_count: u64, width: u32, height: u32) -> GrayImage {
    let side = (height / 2).max(1).min(width);
    let x0 = if square_on_right(seq, frame_count) {
        width - side
    } else {
        0
    };
    let y0 = height.saturating_sub(side) / 2;
    GrayImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}
