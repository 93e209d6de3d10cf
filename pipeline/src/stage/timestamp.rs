use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone, Utc};
use motion_harness_common::config::StageConfig;
use motion_harness_common::frame::VideoFrame;
use tracing::warn;

use super::traits::ProcessingStage;

fn fmt_ts(ms: i64, format: &str) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    let mut out = String::new();
    if write!(out, "{}", dt.format(format)).is_err() {
        return dt.to_rfc3339();
    }
    out
}

fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Stamps each frame with its frame number and capture time.
pub struct TimestampStage {
    format: String,
}

impl TimestampStage {
    /// An unparseable strftime `format` is replaced by the default one.
    pub fn new(format: &str) -> Self {
        if is_valid_format(format) {
            return Self {
                format: format.to_string(),
            };
        }
        let fallback = StageConfig::default().timestamp_format;
        warn!(format, fallback, "invalid timestamp format, using default");
        Self { format: fallback }
    }
}

impl ProcessingStage for TimestampStage {
    fn process(&mut self, frame: &mut VideoFrame) {
        let stamp = format!(
            "#{seq:06} {ts}",
            seq = frame.seq,
            ts = fmt_ts(frame.captured_at_ms, &self.format)
        );
        frame.overlay = Some(stamp);
    }

    fn name(&self) -> &str {
        "timestamp"
    }
}
