use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Gap between two divisions (in seconds) at or above which the space between
/// them is treated as an instrumental interlude. Not user configurable.
pub const INTERLUDE_GAP_THRESHOLD_SECONDS: f64 = 5.0;

const MAX_SHORT_LINE_GROUP_THRESHOLD: f64 = 5.0;

/// Direction in which sung progress fills a word. Only the presentation layer
/// cares about this; timing is identical for every direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressDirection {
    #[default]
    Ltr,
    Rtl,
    Ttb,
    Btt,
}

/// Top-level configuration for a sync session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Added to the playback time before resolving; may be negative.
    pub lyric_offset_seconds: f64,
    /// Where in the viewport (0 = top, 100 = bottom) the active line is anchored.
    /// Out-of-range JSON values are clamped rather than rejected.
    #[serde(deserialize_with = "deserialize_percent")]
    pub scroll_position_offset_percent: u8,
    /// Lines shorter than this are merged with the following line.
    pub short_line_group_threshold: f64,
    pub user_scroll_cooldown_ms: u64,
    pub progress_direction: ProgressDirection,
    pub pre_activation: PreActivationConfig,
    pub scroll: ScrollTuning,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lyric_offset_seconds: 0.0,
            scroll_position_offset_percent: 50,
            short_line_group_threshold: 0.6,
            user_scroll_cooldown_ms: 2_000,
            progress_direction: ProgressDirection::default(),
            pre_activation: PreActivationConfig::default(),
            scroll: ScrollTuning::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON configuration. Missing fields fall back to defaults and
    /// out-of-range values are clamped.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Returns a copy with every value forced into its documented range.
    pub fn sanitized(mut self) -> Self {
        if !self.lyric_offset_seconds.is_finite() {
            warn!(value = self.lyric_offset_seconds, "non-finite lyric offset, using 0");
            self.lyric_offset_seconds = 0.0;
        }

        if self.scroll_position_offset_percent > 100 {
            warn!(
                value = self.scroll_position_offset_percent,
                "scroll position offset above 100%, clamping"
            );
            self.scroll_position_offset_percent = 100;
        }

        let threshold = self.short_line_group_threshold;
        let clamped = if threshold.is_finite() {
            threshold.clamp(0.0, MAX_SHORT_LINE_GROUP_THRESHOLD)
        } else {
            SyncConfig::default().short_line_group_threshold
        };
        if clamped != threshold {
            warn!(value = threshold, clamped, "short line group threshold out of range");
            self.short_line_group_threshold = clamped;
        }

        self.pre_activation = self.pre_activation.sanitized();
        self.scroll = self.scroll.sanitized();
        self
    }

    /// Converts a raw playback time into the time the lyrics are resolved at.
    pub fn adjusted_time(&self, current_time: f64) -> f64 {
        current_time + self.lyric_offset_seconds
    }

    /// Fraction of the viewport extent at which the active content is anchored.
    pub fn anchor_fraction(&self) -> f64 {
        f64::from(self.scroll_position_offset_percent.min(100)) / 100.0
    }

    pub fn interlude_gap_threshold_seconds(&self) -> f64 {
        INTERLUDE_GAP_THRESHOLD_SECONDS
    }
}

fn deserialize_percent<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    let clamped = if value.is_finite() { value.round().clamp(0.0, 100.0) } else { 50.0 };
    if clamped != value {
        warn!(value, clamped, "scroll position offset out of range, clamping");
    }
    Ok(clamped as u8)
}

/// Tuning for the pre-activation heuristic. Both constants were picked by
/// feel, not derived, so they are exposed here rather than hard coded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreActivationConfig {
    /// Gaps shorter than this pre-activate the next line immediately.
    pub max_gap_seconds: f64,
    /// Fraction of a longer gap that must elapse before pre-activating.
    pub elapsed_ratio: f64,
}

impl Default for PreActivationConfig {
    fn default() -> Self {
        Self {
            max_gap_seconds: 1.0,
            elapsed_ratio: 0.3,
        }
    }
}

impl PreActivationConfig {
    fn sanitized(self) -> Self {
        let defaults = Self::default();
        let max_gap_seconds = if self.max_gap_seconds.is_finite() && self.max_gap_seconds >= 0.0 {
            self.max_gap_seconds
        } else {
            warn!(value = self.max_gap_seconds, "invalid pre-activation gap, using default");
            defaults.max_gap_seconds
        };
        let elapsed_ratio = if self.elapsed_ratio.is_finite() {
            self.elapsed_ratio.clamp(0.0, 1.0)
        } else {
            warn!(value = self.elapsed_ratio, "invalid pre-activation ratio, using default");
            defaults.elapsed_ratio
        };
        Self {
            max_gap_seconds,
            elapsed_ratio,
        }
    }
}

/// Tuning for the scroll coordinator's redundancy filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollTuning {
    /// Re-targeting the same line within this window is skipped.
    pub retarget_window_ms: f64,
    /// Offsets closer than this to the current offset are not animated.
    pub offset_epsilon: f64,
}

impl Default for ScrollTuning {
    fn default() -> Self {
        Self {
            retarget_window_ms: 100.0,
            offset_epsilon: 0.5,
        }
    }
}

impl ScrollTuning {
    fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            retarget_window_ms: non_negative_or(self.retarget_window_ms, defaults.retarget_window_ms),
            offset_epsilon: non_negative_or(self.offset_epsilon, defaults.offset_epsilon),
        }
    }
}

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(value, fallback, "invalid scroll tuning value");
        fallback
    }
}
