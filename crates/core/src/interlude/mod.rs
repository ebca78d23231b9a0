use serde::Serialize;
use tracing::debug;

use crate::config::INTERLUDE_GAP_THRESHOLD_SECONDS;
use crate::document::Division;
use crate::index::{LineId, LineIndex};

/// Instrumental window between two divisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interlude {
    pub start: f64,
    pub end: f64,
    /// Index of the division the interlude follows.
    pub division_index: usize,
    /// Last line of that division, after which the interlude marker is shown.
    pub after_line: Option<LineId>,
}

impl Interlude {
    /// Half-open membership test: `start <= time < end`.
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// How far playback has moved through the interlude, in `[0, 1]`.
    pub fn progress(&self, time: f64) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return if time >= self.start { 1.0 } else { 0.0 };
        }
        ((time - self.start) / duration).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterludeDetector {
    gap_threshold: f64,
}

impl Default for InterludeDetector {
    fn default() -> Self {
        Self {
            gap_threshold: INTERLUDE_GAP_THRESHOLD_SECONDS,
        }
    }
}

impl InterludeDetector {
    pub fn with_gap_threshold(gap_threshold: f64) -> Self {
        Self { gap_threshold }
    }

    /// Flags every gap between adjacent divisions that is at least the
    /// threshold long (the threshold itself counts).
    pub fn detect(&self, divisions: &[Division], division_last_line: &[Option<usize>]) -> Vec<Interlude> {
        let interludes: Vec<Interlude> = divisions
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                let (current, next) = (&pair[0], &pair[1]);
                let gap = next.begin - current.end;
                (gap >= self.gap_threshold).then(|| Interlude {
                    start: current.end,
                    end: next.begin,
                    division_index: i,
                    after_line: division_last_line.get(i).copied().flatten().map(LineId),
                })
            })
            .collect();

        debug!(count = interludes.len(), "detected interludes");
        interludes
    }

    pub fn detect_in(&self, index: &LineIndex) -> Vec<Interlude> {
        self.detect(index.document().divisions(), index.division_last_line_index())
    }
}

/// The interlude containing `time`, if any.
pub fn active_interlude(interludes: &[Interlude], time: f64) -> Option<&Interlude> {
    interludes.iter().find(|interlude| interlude.contains(time))
}
