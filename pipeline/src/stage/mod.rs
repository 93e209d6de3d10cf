pub mod motion;
pub mod timestamp;
pub mod traits;

use motion_harness_common::config::StageConfig;
use motion_harness_common::frame::VideoFrame;

use self::motion::MotionDetectionStage;
use self::timestamp::TimestampStage;
use self::traits::ProcessingStage;

/// Ordered list of processing units. Unit *i*'s output feeds unit *i+1*.
#[derive(Default)]
pub struct StageChain {
    stages: Vec<Box<dyn ProcessingStage>>,
}

impl StageChain {
    pub fn new(stages: Vec<Box<dyn ProcessingStage>>) -> Self {
        Self { stages }
    }

    /// The fixed harness chain: motion detection, then timestamping.
    pub fn motion_and_timestamp(config: &StageConfig) -> Self {
        Self::new(vec![
            Box::new(MotionDetectionStage::new(
                config.motion_hash_size,
                config.motion_threshold,
            )),
            Box::new(TimestampStage::new(&config.timestamp_format)),
        ])
    }

    pub fn run(&mut self, frame: &mut VideoFrame) {
        for stage in &mut self.stages {
            stage.process(frame);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for StageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
