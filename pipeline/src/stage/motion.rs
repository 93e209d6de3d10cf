use image::imageops::{self, FilterType};
use image::GrayImage;
use motion_harness_common::frame::{MotionReport, VideoFrame};
use tracing::debug;

use super::traits::ProcessingStage;

/// Compute an aHash (average hash) of a luma plane at the given hash_size.
/// Returns a binary vector of length hash_size*hash_size.
pub fn compute_ahash(luma: &GrayImage, hash_size: u32) -> Vec<bool> {
    let small = imageops::resize(luma, hash_size, hash_size, FilterType::Nearest);
    let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
    if pixels.is_empty() {
        return Vec::new();
    }
    let mean: f64 = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;
    pixels.iter().map(|&p| p as f64 > mean).collect()
}

/// Compute the hamming distance between two binary hashes.
pub fn hamming(a: &[bool], b: &[bool]) -> u32 {
    a.iter().zip(b.iter()).filter(|(a, b)| a != b).count() as u32
}

/// Motion detector comparing each frame with the one before it.
///
/// Algorithm:
/// 1. Downsample the luma plane to (hash_size x hash_size)
/// 2. Build a binary hash: 1 if pixel > mean, 0 otherwise
/// 3. Motion is reported when the hamming distance to the previous
///    frame's hash exceeds `threshold`
///
/// Unlike a scene-change filter the baseline always moves forward, so a
/// slow pan is judged frame to frame rather than against a fixed scene.
pub struct MotionDetectionStage {
    hash_size: u32,
    threshold: u32,
    last_hash: Option<Vec<bool>>,
}

impl MotionDetectionStage {
    pub fn new(hash_size: u32, threshold: u32) -> Self {
        Self {
            hash_size: hash_size.max(1),
            threshold,
            last_hash: None,
        }
    }
}

impl ProcessingStage for MotionDetectionStage {
    fn process(&mut self, frame: &mut VideoFrame) {
        let hash = compute_ahash(&frame.luma, self.hash_size);

        let report = match &self.last_hash {
            None => MotionReport {
                distance: 0,
                detected: false,
            },
            Some(prev) => {
                let distance = hamming(prev, &hash);
                MotionReport {
                    distance,
                    detected: distance > self.threshold,
                }
            }
        };

        if report.detected {
            debug!(
                seq = frame.seq,
                distance = report.distance,
                threshold = self.threshold,
                "motion detected"
            );
        }

        self.last_hash = Some(hash);
        frame.motion = Some(report);
    }

    fn name(&self) -> &str {
        "motion-detection"
    }
}
