use motion_harness_common::frame::VideoFrame;

/// Per-frame processing unit inserted into a track's data path.
///
/// Units receive decoded frames in presentation order and annotate them
/// in place before the next unit in the chain sees them.
pub trait ProcessingStage: Send {
    fn process(&mut self, frame: &mut VideoFrame);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
