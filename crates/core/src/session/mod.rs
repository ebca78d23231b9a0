//! One loaded track: document, derived timeline, and per-tick state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{Cluster, ClusterEngine};
use crate::config::{ProgressDirection, SyncConfig};
use crate::document::Document;
use crate::index::LineIndex;
use crate::interlude::{Interlude, InterludeDetector};
use crate::resolver::{PlaybackState, PlaybackStateResolver};
use crate::scroll::{GestureKind, ScrollCoordinator, ScrollOutput, Scrollable};

/// Everything derived from a document that stays fixed while it plays.
#[derive(Debug, Clone)]
pub struct LyricTimeline {
    pub index: LineIndex,
    pub clusters: Vec<Cluster>,
    pub interludes: Vec<Interlude>,
}

impl LyricTimeline {
    pub fn build(document: Arc<Document>, config: &SyncConfig) -> Self {
        let mut index = LineIndex::build(document);
        let clusters = ClusterEngine::from_config(config).apply(&mut index);
        let interludes = InterludeDetector::default().detect_in(&index);
        Self {
            index,
            clusters,
            interludes,
        }
    }

    pub fn resolver(&self) -> PlaybackStateResolver<'_> {
        PlaybackStateResolver::new(&self.index, &self.interludes)
    }
}

/// Caches the timeline for one document. A rebuild happens only when a
/// different document instance (or a different grouping threshold) is asked
/// for.
#[derive(Debug, Default)]
pub struct TimelineCache {
    entry: Option<(f64, LyricTimeline)>,
    builds: usize,
}

impl TimelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&mut self, document: &Arc<Document>, config: &SyncConfig) -> &LyricTimeline {
        let threshold = ClusterEngine::from_config(config).short_line_group_threshold();
        let stale = self.entry.as_ref().map_or(true, |(cached_threshold, timeline)| {
            !Arc::ptr_eq(timeline.index.document(), document) || *cached_threshold != threshold
        });

        if stale {
            self.builds += 1;
            debug!(build = self.builds, lines = document.line_count(), "building lyric timeline");
            self.entry = None;
        }

        let (_, timeline) = self
            .entry
            .get_or_insert_with(|| (threshold, LyricTimeline::build(document.clone(), config)));
        timeline
    }

    /// How many times a timeline has been built.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

/// Read-only output of one tick.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot<'a> {
    pub playback: &'a PlaybackState,
    pub scroll: ScrollOutput,
    pub progress_direction: ProgressDirection,
}

/// Drives resolver and scroll coordinator for a loaded document.
#[derive(Debug)]
pub struct LyricSession<S> {
    config: SyncConfig,
    document: Arc<Document>,
    cache: TimelineCache,
    state: PlaybackState,
    coordinator: ScrollCoordinator<S>,
}

impl<S: Scrollable> LyricSession<S> {
    pub fn new(document: Arc<Document>, config: SyncConfig, view: S) -> Self {
        let config = config.sanitized();
        let coordinator = ScrollCoordinator::new(view, &config);
        info!(
            lines = document.line_count(),
            divisions = document.divisions().len(),
            "lyric session started"
        );
        Self {
            config,
            document,
            cache: TimelineCache::new(),
            state: PlaybackState::default(),
            coordinator,
        }
    }

    /// Switches to another document. Scroll state starts over.
    pub fn load(&mut self, document: Arc<Document>) {
        if Arc::ptr_eq(&self.document, &document) {
            return;
        }
        info!(lines = document.line_count(), "loading new lyric document");
        self.document = document;
        self.state = PlaybackState::default();
        self.coordinator.reset();
    }

    pub fn set_config(&mut self, config: SyncConfig) {
        self.config = config.sanitized();
        self.coordinator.update_settings(&self.config);
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn timeline(&mut self) -> &LyricTimeline {
        self.cache.get_or_build(&self.document, &self.config)
    }

    pub fn cache(&self) -> &TimelineCache {
        &self.cache
    }

    pub fn playback_state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn coordinator(&self) -> &ScrollCoordinator<S> {
        &self.coordinator
    }

    pub fn view(&self) -> &S {
        self.coordinator.view()
    }

    pub fn view_mut(&mut self) -> &mut S {
        self.coordinator.view_mut()
    }

    /// Handles a clock tick. `current_time` is the raw playback position in
    /// seconds; `now_ms` is wall-clock time used for gesture cooldowns.
    pub fn tick(&mut self, current_time: f64, now_ms: f64) -> FrameSnapshot<'_> {
        let adjusted = self.config.adjusted_time(current_time);
        let timeline = self.cache.get_or_build(&self.document, &self.config);
        timeline
            .resolver()
            .resolve_into(adjusted, &self.config, &mut self.state);

        let scroll = self.coordinator.on_tick(&self.state, now_ms);
        FrameSnapshot {
            playback: &self.state,
            scroll,
            progress_direction: self.config.progress_direction,
        }
    }

    pub fn user_scroll(&mut self, kind: GestureKind, now_ms: f64) {
        self.coordinator.on_user_gesture(kind, now_ms);
    }

    /// Forwards a raw scroll notification; see [`ScrollCoordinator::on_scroll_event`].
    pub fn scroll_event(&mut self, now_ms: f64) -> bool {
        self.coordinator.on_scroll_event(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Division, Line, WordTimingMode};
    use crate::index::LineId;
    use crate::scroll::{ScrollMode, VirtualScroller};

    fn overlapping() -> Arc<Document> {
        Arc::new(
            Document::builder(WordTimingMode::Line)
                .division(Division::new(
                    0.0,
                    3.0,
                    vec![Line::new(0.0, 2.0, "a"), Line::new(1.5, 3.0, "b")],
                ))
                .build(),
        )
    }

    fn session(document: Arc<Document>, config: SyncConfig) -> LyricSession<VirtualScroller> {
        let timeline = LyricTimeline::build(document.clone(), &config);
        let view = VirtualScroller::with_layout(200.0, &timeline.index, &timeline.interludes, 40.0, 30.0);
        LyricSession::new(document, config, view)
    }

    #[test]
    fn overlapping_lines_share_cluster_end() {
        let mut session = session(overlapping(), SyncConfig::default());
        let timeline = session.timeline();
        assert_eq!(timeline.clusters.len(), 1);
        assert!(timeline.index.lines().iter().all(|l| l.group_end == 3.0));

        let frame = session.tick(2.5, 0.0);
        assert_eq!(frame.playback.active_cluster(), &[LineId(0), LineId(1)]);
        assert_eq!(frame.playback.cluster_end(), Some(3.0));
    }

    #[test]
    fn applies_lyric_offset() {
        let config = SyncConfig {
            lyric_offset_seconds: -1.0,
            ..SyncConfig::default()
        };
        let mut session = session(overlapping(), config);
        let frame = session.tick(3.5, 0.0);
        assert_eq!(frame.playback.time(), 2.5);
        assert!(!frame.playback.active_cluster().is_empty());
    }

    #[test]
    fn timeline_is_built_once_per_document() {
        let document = overlapping();
        let mut session = session(document.clone(), SyncConfig::default());
        for step in 0..30 {
            session.tick(step as f64 * 0.1, step as f64 * 100.0);
        }
        assert_eq!(session.cache().builds(), 1);

        session.load(document);
        session.tick(0.5, 4_000.0);
        assert_eq!(session.cache().builds(), 1);

        let other = overlapping();
        session.load(other);
        session.tick(0.5, 5_000.0);
        assert_eq!(session.cache().builds(), 2);
    }

    #[test]
    fn threshold_change_rebuilds_timeline() {
        let mut session = session(overlapping(), SyncConfig::default());
        session.tick(0.0, 0.0);
        session.set_config(SyncConfig {
            short_line_group_threshold: 1.0,
            ..SyncConfig::default()
        });
        session.tick(0.0, 100.0);
        assert_eq!(session.cache().builds(), 2);
    }

    #[test]
    fn seek_backwards_recomputes_from_scratch() {
        let document = Arc::new(
            Document::builder(WordTimingMode::Line)
                .division(Division::from_lines(vec![
                    Line::new(0.0, 2.0, "a"),
                    Line::new(4.0, 6.0, "b"),
                ]))
                .build(),
        );
        let mut session = session(document.clone(), SyncConfig::default());
        session.tick(5.0, 0.0);
        let after_seek = session.tick(1.0, 100.0).playback.clone();

        let mut fresh = self::session(document, SyncConfig::default());
        let expected = fresh.tick(1.0, 0.0).playback.clone();
        assert_eq!(after_seek, expected);
    }

    #[test]
    fn user_scroll_pauses_following() {
        let mut session = session(overlapping(), SyncConfig::default());
        session.tick(0.5, 0.0);
        session.user_scroll(GestureKind::Drag, 100.0);
        assert_eq!(session.tick(1.0, 200.0).scroll.mode, ScrollMode::UserOverride);
        assert_eq!(session.tick(1.0, 2_100.0).scroll.mode, ScrollMode::Following);
    }

    #[test]
    fn empty_document_yields_empty_frames() {
        let mut session = session(Arc::new(Document::empty()), SyncConfig::default());
        let frame = session.tick(12.0, 0.0);
        assert!(frame.playback.active_cluster().is_empty());
        assert_eq!(frame.scroll.target_offset, None);
        assert!(!frame.scroll.is_animating);
    }
}
