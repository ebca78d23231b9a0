use crate::index::LineIndex;
use crate::interlude::Interlude;

use super::{ease_out_cubic, AnimationHandle, ScrollTarget, Scrollable, TargetBox};

#[derive(Debug, Clone, Copy)]
struct Tween {
    handle: AnimationHandle,
    from: f64,
    to: f64,
    started_at: f64,
    duration_ms: f64,
}

/// In-memory scroll view with fixed-size rows. Lines are stacked in time
/// order and each interlude marker sits directly after the last line of the
/// division it follows. Time only moves when [`VirtualScroller::advance`] is
/// called.
#[derive(Debug, Clone)]
pub struct VirtualScroller {
    viewport: f64,
    line_boxes: Vec<TargetBox>,
    interlude_boxes: Vec<(usize, TargetBox)>,
    content_extent: f64,
    offset: f64,
    now_ms: f64,
    tween: Option<Tween>,
    next_handle: u64,
    started: usize,
    cancelled: usize,
}

impl VirtualScroller {
    pub fn new(viewport: f64) -> Self {
        Self {
            viewport: viewport.max(0.0),
            line_boxes: Vec::new(),
            interlude_boxes: Vec::new(),
            content_extent: 0.0,
            offset: 0.0,
            now_ms: 0.0,
            tween: None,
            next_handle: 0,
            started: 0,
            cancelled: 0,
        }
    }

    pub fn with_layout(
        viewport: f64,
        index: &LineIndex,
        interludes: &[Interlude],
        line_extent: f64,
        marker_extent: f64,
    ) -> Self {
        let mut view = Self::new(viewport);
        view.relayout(index, interludes, line_extent, marker_extent);
        view
    }

    /// Rebuilds the row layout, keeping the current offset within bounds.
    pub fn relayout(&mut self, index: &LineIndex, interludes: &[Interlude], line_extent: f64, marker_extent: f64) {
        self.line_boxes.clear();
        self.interlude_boxes.clear();

        let mut cursor = 0.0;
        for line in index.lines() {
            self.line_boxes.push(TargetBox {
                start: cursor,
                extent: line_extent,
            });
            cursor += line_extent;

            for interlude in interludes.iter().filter(|i| i.after_line == Some(line.id)) {
                self.interlude_boxes.push((
                    interlude.division_index,
                    TargetBox {
                        start: cursor,
                        extent: marker_extent,
                    },
                ));
                cursor += marker_extent;
            }
        }

        self.content_extent = cursor;
        self.offset = self.offset.clamp(0.0, self.max_offset());
    }

    /// Moves the view's clock forward and steps the running animation.
    pub fn advance(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
        let Some(tween) = self.tween else {
            return;
        };

        let elapsed = now_ms - tween.started_at;
        if tween.duration_ms <= 0.0 || elapsed >= tween.duration_ms {
            self.offset = tween.to;
            self.tween = None;
        } else {
            let t = ease_out_cubic(elapsed / tween.duration_ms);
            self.offset = tween.from + (tween.to - tween.from) * t;
        }
    }

    /// Direct manipulation, as a drag or wheel would do. Stops any animation.
    pub fn scroll_by(&mut self, delta: f64) {
        self.tween = None;
        self.offset = (self.offset + delta).clamp(0.0, self.max_offset());
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    pub fn animation_target(&self) -> Option<f64> {
        self.tween.map(|tween| tween.to)
    }

    pub fn animations_started(&self) -> usize {
        self.started
    }

    pub fn animations_cancelled(&self) -> usize {
        self.cancelled
    }

    pub fn content_extent(&self) -> f64 {
        self.content_extent
    }
}

impl Scrollable for VirtualScroller {
    fn offset(&self) -> f64 {
        self.offset
    }

    fn viewport_extent(&self) -> f64 {
        self.viewport
    }

    fn max_offset(&self) -> f64 {
        (self.content_extent - self.viewport).max(0.0)
    }

    fn target_box(&self, target: ScrollTarget) -> Option<TargetBox> {
        match target {
            ScrollTarget::Line(id) => self.line_boxes.get(id.index()).copied(),
            ScrollTarget::Interlude(division) => self
                .interlude_boxes
                .iter()
                .find(|(index, _)| *index == division)
                .map(|(_, target_box)| *target_box),
        }
    }

    fn animate_to(&mut self, offset: f64, duration_ms: u32) -> AnimationHandle {
        let handle = AnimationHandle(self.next_handle);
        self.next_handle += 1;
        self.started += 1;

        self.tween = Some(Tween {
            handle,
            from: self.offset,
            to: offset.clamp(0.0, self.max_offset()),
            started_at: self.now_ms,
            duration_ms: f64::from(duration_ms),
        });
        if duration_ms == 0 {
            self.advance(self.now_ms);
        }
        handle
    }

    fn cancel(&mut self, handle: AnimationHandle) {
        if self.tween.map_or(false, |tween| tween.handle == handle) {
            self.tween = None;
            self.cancelled += 1;
        }
    }
}
