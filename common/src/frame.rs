use image::GrayImage;
use std::fmt;

/// Format of one media track, as reported by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDescriptor {
    Video {
        encoding: String,
        width: u32,
        height: u32,
        fps: f64,
    },
    Audio {
        encoding: String,
        sample_rate: u32,
        channels: u16,
    },
    /// Anything the harness does not classify (subtitles, data, ...).
    Other(String),
}

impl FormatDescriptor {
    pub fn is_video(&self) -> bool {
        matches!(self, FormatDescriptor::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, FormatDescriptor::Audio { .. })
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatDescriptor::Video {
                encoding,
                width,
                height,
                fps,
            } => write!(f, "{encoding}, {width}x{height}, {fps:.1} fps"),
            FormatDescriptor::Audio {
                encoding,
                sample_rate,
                channels,
            } => write!(f, "{encoding}, {sample_rate} Hz, {channels} ch"),
            FormatDescriptor::Other(name) => f.write_str(name),
        }
    }
}

/// Result of comparing a frame against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionReport {
    /// Hamming distance between the two frame hashes.
    pub distance: u32,
    pub detected: bool,
}

/// A decoded video frame travelling through a track's stage chain.
///
/// Pixels are a single 8-bit luma plane. Stages annotate the frame in
/// place (`motion`, `overlay`); the plane itself is left to the renderer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub seq: u64,
    pub captured_at_ms: i64,
    pub luma: GrayImage,
    pub motion: Option<MotionReport>,
    pub overlay: Option<String>,
}

impl VideoFrame {
    pub fn new(luma: GrayImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            seq,
            captured_at_ms,
            luma,
            motion: None,
            overlay: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.luma.width()
    }

    pub fn height(&self) -> u32 {
        self.luma.height()
    }

    /// Returns true if a motion stage flagged this frame.
    pub fn has_motion(&self) -> bool {
        self.motion.map(|m| m.detected).unwrap_or(false)
    }
}
