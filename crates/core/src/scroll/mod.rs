//! Keeps the active lyric content in view.
//!
//! [`ScrollCoordinator`] arbitrates between three modes:
//!
//! - `Following`: every tick retargets the view on the active line.
//! - `UserOverride`: a user gesture suspends following until a wall-clock
//!   cooldown runs out.
//! - `InterludeHold`: entering an interlude centers its marker once and then
//!   leaves the view alone until the interlude ends.
//!
//! The coordinator only talks to the view through [`Scrollable`], so it can
//! drive anything from a real widget to the in-memory [`VirtualScroller`].

mod virtual_view;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::index::LineId;
use crate::interlude::Interlude;
use crate::resolver::PlaybackState;

pub use virtual_view::VirtualScroller;

/// Thing the view can be scrolled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum ScrollTarget {
    Line(LineId),
    /// Interlude marker, identified by the division it follows.
    Interlude(usize),
}

/// Extent of a target along the scroll axis, in view units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetBox {
    pub start: f64,
    pub extent: f64,
}

impl TargetBox {
    pub fn center(&self) -> f64 {
        self.start + self.extent / 2.0
    }
}

/// Token for a running scroll animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AnimationHandle(pub u64);

/// View capability the coordinator scrolls.
pub trait Scrollable {
    fn offset(&self) -> f64;
    fn viewport_extent(&self) -> f64;
    fn max_offset(&self) -> f64;
    /// Layout of `target`, or `None` if the view does not show it.
    fn target_box(&self, target: ScrollTarget) -> Option<TargetBox>;
    /// Starts animating to `offset`, replacing any running animation.
    fn animate_to(&mut self, offset: f64, duration_ms: u32) -> AnimationHandle;
    fn cancel(&mut self, handle: AnimationHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Wheel,
    Touch,
    Drag,
    Keyboard,
    /// A scroll notification that was not started by the coordinator.
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollMode {
    Following,
    UserOverride,
    InterludeHold,
}

/// State the coordinator carries from tick to tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    pub auto_scroll_enabled: bool,
    pub last_scrolled_target: Option<ScrollTarget>,
    /// Wall-clock milliseconds of the last retarget.
    pub last_scroll_timestamp: Option<f64>,
    /// Wall-clock milliseconds at which a user override expires.
    pub suppress_until: Option<f64>,
    pub interlude_hold_active: bool,
}

impl Default for ScrollState {
    fn default() -> Self {
        Self {
            auto_scroll_enabled: true,
            last_scrolled_target: None,
            last_scroll_timestamp: None,
            suppress_until: None,
            interlude_hold_active: false,
        }
    }
}

/// What the presentation layer needs from the coordinator after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollOutput {
    pub target_offset: Option<f64>,
    pub animation_duration_ms: u32,
    pub is_animating: bool,
    pub mode: ScrollMode,
}

/// Scroll-related values taken from [`SyncConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSettings {
    pub anchor_fraction: f64,
    pub cooldown_ms: f64,
    pub retarget_window_ms: f64,
    pub offset_epsilon: f64,
}

impl ScrollSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            anchor_fraction: config.anchor_fraction(),
            cooldown_ms: config.user_scroll_cooldown_ms as f64,
            retarget_window_ms: config.scroll.retarget_window_ms,
            offset_epsilon: config.scroll.offset_epsilon,
        }
    }
}

const INTERLUDE_ANCHOR_FRACTION: f64 = 0.5;

/// Animation length for a scroll, chosen so the motion settles before the
/// next line change.
pub fn animation_duration_ms(seconds_until_next_event: Option<f64>) -> u32 {
    const STEPS: [(f64, u32); 6] = [
        (0.2, 150),
        (0.3, 200),
        (0.4, 250),
        (0.6, 350),
        (0.8, 450),
        (1.0, 600),
    ];

    let Some(remaining) = seconds_until_next_event.filter(|r| r.is_finite()) else {
        return 850;
    };
    STEPS
        .iter()
        .find(|(limit, _)| remaining < *limit)
        .map_or(850, |(_, duration)| *duration)
}

/// Ease-out cubic timing curve over `[0, 1]`.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy)]
struct ActiveAnimation {
    handle: AnimationHandle,
    target_offset: f64,
    ends_at: f64,
}

#[derive(Debug)]
pub struct ScrollCoordinator<S> {
    view: S,
    settings: ScrollSettings,
    state: ScrollState,
    animation: Option<ActiveAnimation>,
    programmatic_until: Option<f64>,
    last_playback_time: Option<f64>,
    centered_interlude: Option<usize>,
    last_target_offset: Option<f64>,
    last_duration_ms: u32,
}

impl<S: Scrollable> ScrollCoordinator<S> {
    pub fn new(view: S, config: &SyncConfig) -> Self {
        Self {
            view,
            settings: ScrollSettings::from_config(config),
            state: ScrollState::default(),
            animation: None,
            programmatic_until: None,
            last_playback_time: None,
            centered_interlude: None,
            last_target_offset: None,
            last_duration_ms: 0,
        }
    }

    pub fn update_settings(&mut self, config: &SyncConfig) {
        self.settings = ScrollSettings::from_config(config);
    }

    pub fn settings(&self) -> &ScrollSettings {
        &self.settings
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    pub fn view(&self) -> &S {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut S {
        &mut self.view
    }

    pub fn mode(&self) -> ScrollMode {
        if self.state.interlude_hold_active {
            ScrollMode::InterludeHold
        } else if !self.state.auto_scroll_enabled {
            ScrollMode::UserOverride
        } else {
            ScrollMode::Following
        }
    }

    /// Whether a scroll notification at `now_ms` stems from our own animation.
    pub fn is_programmatic_scroll(&self, now_ms: f64) -> bool {
        self.programmatic_until.map_or(false, |until| now_ms < until)
    }

    /// Forgets everything about the previous track.
    pub fn reset(&mut self) {
        if let Some(animation) = self.animation.take() {
            self.view.cancel(animation.handle);
        }
        self.state = ScrollState::default();
        self.programmatic_until = None;
        self.last_playback_time = None;
        self.centered_interlude = None;
        self.last_target_offset = None;
        self.last_duration_ms = 0;
    }

    pub fn on_tick(&mut self, playback: &PlaybackState, now_ms: f64) -> ScrollOutput {
        self.expire_animation(now_ms);
        self.note_playback_time(playback.time());
        self.expire_cooldown(now_ms);

        if playback.is_empty() {
            return self.output();
        }

        let duration = animation_duration_ms(
            playback
                .next_event_time()
                .map(|next| next - playback.time()),
        );

        match playback.active_interlude() {
            Some(interlude) if self.centered_interlude != Some(interlude.division_index) => {
                self.enter_interlude_hold(interlude, duration, now_ms);
                return self.output();
            }
            Some(_) if self.state.interlude_hold_active => return self.output(),
            Some(_) => {}
            None => {
                if self.state.interlude_hold_active {
                    self.exit_interlude_hold();
                }
                self.centered_interlude = None;
            }
        }

        if !self.state.auto_scroll_enabled {
            return self.output();
        }

        let target = match (playback.active_interlude(), playback.primary_line()) {
            (Some(interlude), _) => ScrollTarget::Interlude(interlude.division_index),
            (None, Some(line)) => ScrollTarget::Line(line),
            (None, None) => return self.output(),
        };

        let anchor = self.settings.anchor_fraction;
        self.scroll_to(target, anchor, duration, now_ms, false);
        self.output()
    }

    /// A user gesture suspends auto-follow for the cooldown period.
    pub fn on_user_gesture(&mut self, kind: GestureKind, now_ms: f64) {
        if self.state.interlude_hold_active {
            self.state.interlude_hold_active = false;
            debug!(?kind, "user gesture released interlude hold");
        }
        if let Some(animation) = self.animation.take() {
            self.view.cancel(animation.handle);
        }
        self.programmatic_until = None;

        let resume_at = now_ms + self.settings.cooldown_ms;
        if self.state.auto_scroll_enabled {
            debug!(?kind, resume_at, "auto-follow suspended");
        }
        self.state.auto_scroll_enabled = false;
        self.state.suppress_until = Some(resume_at);
    }

    /// Handles a raw scroll notification from the view. Returns `true` when it
    /// was treated as a user gesture.
    pub fn on_scroll_event(&mut self, now_ms: f64) -> bool {
        if self.is_programmatic_scroll(now_ms) {
            trace!(now_ms, "ignoring scroll event from own animation");
            return false;
        }
        self.on_user_gesture(GestureKind::Scroll, now_ms);
        true
    }

    pub fn output(&self) -> ScrollOutput {
        ScrollOutput {
            target_offset: self.last_target_offset,
            animation_duration_ms: self.last_duration_ms,
            is_animating: self.animation.is_some(),
            mode: self.mode(),
        }
    }

    fn expire_animation(&mut self, now_ms: f64) {
        if self.animation.map_or(false, |a| now_ms >= a.ends_at) {
            self.animation = None;
        }
        if self.programmatic_until.map_or(false, |until| now_ms >= until) {
            self.programmatic_until = None;
        }
    }

    fn note_playback_time(&mut self, time: f64) {
        if let Some(last) = self.last_playback_time {
            if time < last {
                debug!(from = last, to = time, "playback jumped backwards, retargeting");
                self.state.last_scrolled_target = None;
                self.state.last_scroll_timestamp = None;
            }
        }
        self.last_playback_time = Some(time);
    }

    fn expire_cooldown(&mut self, now_ms: f64) {
        let Some(until) = self.state.suppress_until else {
            return;
        };
        if now_ms >= until {
            self.state.auto_scroll_enabled = true;
            self.state.suppress_until = None;
            self.state.last_scrolled_target = None;
            debug!(now_ms, "cooldown expired, auto-follow resumed");
        }
    }

    fn enter_interlude_hold(&mut self, interlude: &Interlude, duration_ms: u32, now_ms: f64) {
        if !self.state.auto_scroll_enabled {
            debug!("interlude cleared pending user override");
        }
        self.state.auto_scroll_enabled = true;
        self.state.suppress_until = None;
        self.centered_interlude = Some(interlude.division_index);

        let target = ScrollTarget::Interlude(interlude.division_index);
        self.scroll_to(target, INTERLUDE_ANCHOR_FRACTION, duration_ms, now_ms, true);
        self.state.interlude_hold_active = true;
        debug!(
            division = interlude.division_index,
            start = interlude.start,
            end = interlude.end,
            "entered interlude hold"
        );
    }

    fn exit_interlude_hold(&mut self) {
        self.state.interlude_hold_active = false;
        self.state.auto_scroll_enabled = true;
        self.state.suppress_until = None;
        self.state.last_scrolled_target = None;
        debug!("left interlude hold");
    }

    fn scroll_to(&mut self, target: ScrollTarget, anchor: f64, duration_ms: u32, now_ms: f64, force: bool) {
        let recently_targeted = self.state.last_scrolled_target == Some(target)
            && self
                .state
                .last_scroll_timestamp
                .map_or(false, |at| now_ms - at < self.settings.retarget_window_ms);
        if recently_targeted && !force {
            return;
        }

        let Some(target_box) = self.view.target_box(target) else {
            trace!(?target, "scroll target is not laid out");
            return;
        };

        let max_offset = self.view.max_offset().max(0.0);
        let candidate = (target_box.center() - self.view.viewport_extent() * anchor).clamp(0.0, max_offset);
        let current = self
            .animation
            .map(|a| a.target_offset)
            .unwrap_or_else(|| self.view.offset());

        self.state.last_scrolled_target = Some(target);
        self.state.last_scroll_timestamp = Some(now_ms);

        if (candidate - current).abs() < self.settings.offset_epsilon {
            return;
        }

        if let Some(previous) = self.animation.take() {
            self.view.cancel(previous.handle);
        }
        let handle = self.view.animate_to(candidate, duration_ms);
        let ends_at = now_ms + f64::from(duration_ms);
        self.animation = Some(ActiveAnimation {
            handle,
            target_offset: candidate,
            ends_at,
        });
        self.programmatic_until = Some(ends_at);
        self.last_target_offset = Some(candidate);
        self.last_duration_ms = duration_ms;

        trace!(?target, offset = candidate, duration_ms, "scrolling");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cluster::ClusterEngine;
    use crate::document::{Division, Document, Line, WordTimingMode};
    use crate::index::LineIndex;
    use crate::interlude::InterludeDetector;
    use crate::resolver::PlaybackStateResolver;

    const LINE: f64 = 40.0;
    const MARKER: f64 = 30.0;
    const VIEWPORT: f64 = 200.0;

    struct Harness {
        index: LineIndex,
        interludes: Vec<Interlude>,
        config: SyncConfig,
        coordinator: ScrollCoordinator<VirtualScroller>,
    }

    impl Harness {
        fn new(document: Document) -> Self {
            let config = SyncConfig::default();
            let mut index = LineIndex::build(Arc::new(document));
            ClusterEngine::from_config(&config).apply(&mut index);
            let interludes = InterludeDetector::default().detect_in(&index);
            let view = VirtualScroller::with_layout(VIEWPORT, &index, &interludes, LINE, MARKER);
            let coordinator = ScrollCoordinator::new(view, &config);
            Self {
                index,
                interludes,
                config,
                coordinator,
            }
        }

        fn tick(&mut self, time: f64, now_ms: f64) -> ScrollOutput {
            let state = PlaybackStateResolver::new(&self.index, &self.interludes).resolve(time, &self.config);
            self.coordinator.view_mut().advance(now_ms);
            self.coordinator.on_tick(&state, now_ms)
        }
    }

    fn many_lines() -> Document {
        let lines = (0..20)
            .map(|i| Line::new(i as f64 * 2.0, i as f64 * 2.0 + 2.0, format!("line {i}")))
            .collect();
        Document::builder(WordTimingMode::Line)
            .division(Division::from_lines(lines))
            .build()
    }

    fn with_interlude() -> Document {
        Document::builder(WordTimingMode::Line)
            .division(Division::new(
                0.0,
                10.0,
                (0..5)
                    .map(|i| Line::new(i as f64 * 2.0, i as f64 * 2.0 + 2.0, "verse"))
                    .collect(),
            ))
            .division(Division::new(
                16.0,
                30.0,
                (0..7)
                    .map(|i| Line::new(16.0 + i as f64 * 2.0, 18.0 + i as f64 * 2.0, "chorus"))
                    .collect(),
            ))
            .build()
    }

    #[test]
    fn duration_steps() {
        assert_eq!(animation_duration_ms(Some(0.1)), 150);
        assert_eq!(animation_duration_ms(Some(0.25)), 200);
        assert_eq!(animation_duration_ms(Some(0.35)), 250);
        assert_eq!(animation_duration_ms(Some(0.5)), 350);
        assert_eq!(animation_duration_ms(Some(0.7)), 450);
        assert_eq!(animation_duration_ms(Some(0.9)), 600);
        assert_eq!(animation_duration_ms(Some(1.0)), 850);
        assert_eq!(animation_duration_ms(None), 850);
    }

    #[test]
    fn easing_is_bounded() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!(ease_out_cubic(0.5) > 0.5);
        assert_eq!(ease_out_cubic(3.0), 1.0);
    }

    #[test]
    fn follows_active_line_at_anchor() {
        let mut harness = Harness::new(many_lines());
        let output = harness.tick(10.5, 0.0);

        // Line 5 spans 200..240 and is centred at 50% of a 200 unit viewport.
        assert_eq!(output.mode, ScrollMode::Following);
        assert_eq!(output.target_offset, Some(120.0));
        assert_eq!(output.animation_duration_ms, 850);
        assert!(output.is_animating);
    }

    #[test]
    fn skips_redundant_retargets() {
        let mut harness = Harness::new(many_lines());
        harness.tick(10.5, 0.0);
        let handle_count = harness.coordinator.view().animations_started();

        harness.tick(10.6, 50.0);
        harness.tick(10.7, 150.0);
        assert_eq!(harness.coordinator.view().animations_started(), handle_count);

        harness.tick(12.1, 250.0);
        assert_eq!(harness.coordinator.view().animations_started(), handle_count + 1);
    }

    #[test]
    fn user_gesture_suspends_until_cooldown() {
        let mut harness = Harness::new(many_lines());
        harness.tick(1.0, 0.0);

        harness.coordinator.on_user_gesture(GestureKind::Wheel, 1_000.0);
        assert_eq!(harness.coordinator.mode(), ScrollMode::UserOverride);
        assert!(!harness.coordinator.state().auto_scroll_enabled);

        let before = harness.coordinator.view().animations_started();
        let output = harness.tick(11.0, 2_999.0);
        assert_eq!(output.mode, ScrollMode::UserOverride);
        assert_eq!(harness.coordinator.view().animations_started(), before);

        let output = harness.tick(11.1, 3_000.0);
        assert_eq!(output.mode, ScrollMode::Following);
        assert_eq!(harness.coordinator.view().animations_started(), before + 1);
    }

    #[test]
    fn own_animation_is_not_a_user_gesture() {
        let mut harness = Harness::new(many_lines());
        let output = harness.tick(10.5, 0.0);
        assert!(output.is_animating);

        assert!(harness.coordinator.is_programmatic_scroll(100.0));
        assert!(!harness.coordinator.on_scroll_event(100.0));
        assert_eq!(harness.coordinator.mode(), ScrollMode::Following);

        assert!(harness.coordinator.on_scroll_event(5_000.0));
        assert_eq!(harness.coordinator.mode(), ScrollMode::UserOverride);
    }

    #[test]
    fn newer_target_replaces_running_animation() {
        let mut harness = Harness::new(many_lines());
        harness.tick(10.5, 0.0);
        harness.tick(12.5, 200.0);

        let view = harness.coordinator.view();
        assert_eq!(view.animations_started(), 2);
        assert_eq!(view.animations_cancelled(), 1);
        assert_eq!(view.animation_target(), Some(160.0));
    }

    #[test]
    fn interlude_centers_once_then_holds() {
        let mut harness = Harness::new(with_interlude());
        harness.tick(9.0, 0.0);

        let output = harness.tick(11.0, 1_000.0);
        assert_eq!(output.mode, ScrollMode::InterludeHold);
        // Marker sits after the five verse lines: 200..230, centred at 215.
        assert_eq!(output.target_offset, Some(115.0));
        let started = harness.coordinator.view().animations_started();

        harness.tick(12.0, 2_000.0);
        harness.tick(15.0, 5_000.0);
        assert_eq!(harness.coordinator.view().animations_started(), started);

        let output = harness.tick(16.5, 6_000.0);
        assert_eq!(output.mode, ScrollMode::Following);
        assert_eq!(harness.coordinator.view().animations_started(), started + 1);
    }

    #[test]
    fn gesture_during_hold_follows_marker_after_cooldown() {
        let mut harness = Harness::new(with_interlude());
        harness.tick(9.0, 0.0);
        harness.tick(11.0, 1_000.0);
        harness.tick(12.0, 2_000.0);
        let started = harness.coordinator.view().animations_started();

        harness.coordinator.on_user_gesture(GestureKind::Wheel, 2_100.0);
        harness.coordinator.view_mut().scroll_by(-100.0);

        let output = harness.tick(13.0, 3_000.0);
        assert_eq!(output.mode, ScrollMode::UserOverride);
        assert!(!harness.coordinator.state().interlude_hold_active);
        assert_eq!(harness.coordinator.view().animations_started(), started);

        // Cooldown over: the marker is followed again, not re-entered as a hold.
        let output = harness.tick(14.0, 4_200.0);
        assert_eq!(output.mode, ScrollMode::Following);
        assert_eq!(output.target_offset, Some(115.0));
        assert_eq!(harness.coordinator.view().animations_started(), started + 1);

        harness.tick(14.5, 4_400.0);
        assert_eq!(harness.coordinator.view().animations_started(), started + 1);
        assert_eq!(harness.tick(16.5, 6_000.0).mode, ScrollMode::Following);
    }

    #[test]
    fn interlude_clears_user_override() {
        let mut harness = Harness::new(with_interlude());
        harness.tick(9.0, 0.0);
        harness.coordinator.on_user_gesture(GestureKind::Touch, 500.0);

        let output = harness.tick(10.5, 1_000.0);
        assert_eq!(output.mode, ScrollMode::InterludeHold);
        assert_eq!(harness.coordinator.state().suppress_until, None);
    }

    #[test]
    fn backward_seek_retargets_immediately() {
        let mut harness = Harness::new(many_lines());
        harness.tick(10.5, 0.0);
        let output = harness.tick(1.0, 20.0);
        assert_eq!(output.target_offset, Some(0.0));
    }

    #[test]
    fn empty_document_never_scrolls() {
        let mut harness = Harness::new(Document::empty());
        let output = harness.tick(3.0, 0.0);
        assert_eq!(output.target_offset, None);
        assert!(!output.is_animating);
        assert_eq!(harness.coordinator.view().animations_started(), 0);
    }
}
