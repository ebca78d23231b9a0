//! Maps a playback time to what the lyric view should show.
//!
//! [`PlaybackStateResolver`] holds no memory of earlier ticks: every call is
//! answered from the index and the time alone, so seeking in either direction
//! needs no special handling. [`PlaybackStateResolver::resolve_into`] reuses
//! the buffers of a previous [`PlaybackState`].

use std::ops::Range;

use serde::Serialize;
use tracing::trace;

use crate::config::SyncConfig;
use crate::document::{Line, Word, WordTimingMode};
use crate::index::{LineId, LineIndex};
use crate::interlude::{active_interlude, Interlude};

/// Which word track of a line a word belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "slot")]
pub enum WordTrack {
    Lead,
    Background,
    Translation(u8),
    Pronunciation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordId {
    pub line: LineId,
    pub track: WordTrack,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WordProgress {
    pub id: WordId,
    pub progress: f64,
}

/// Snapshot of the lyric view for one adjusted time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    time: f64,
    active_cluster: Vec<LineId>,
    cluster_end: Option<f64>,
    pre_activated: bool,
    next_event_time: Option<f64>,
    #[serde(rename = "perLinePastness")]
    past: Vec<bool>,
    line_progress: Vec<f64>,
    #[serde(rename = "perWordProgress")]
    word_progress: Vec<WordProgress>,
    active_interlude: Option<Interlude>,
    #[serde(skip)]
    active_flags: Vec<bool>,
    #[serde(skip)]
    word_ranges: Vec<Range<usize>>,
}

impl PlaybackState {
    /// The adjusted time this state was resolved at.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn active_cluster(&self) -> &[LineId] {
        &self.active_cluster
    }

    /// The line the view follows: the earliest member of the active cluster.
    pub fn primary_line(&self) -> Option<LineId> {
        self.active_cluster.first().copied()
    }

    pub fn cluster_end(&self) -> Option<f64> {
        self.cluster_end
    }

    /// Whether the active cluster was chosen ahead of its begin time.
    pub fn is_pre_activated(&self) -> bool {
        self.pre_activated
    }

    /// Begin of the next line that is not part of the active cluster.
    pub fn next_event_time(&self) -> Option<f64> {
        self.next_event_time
    }

    pub fn active_interlude(&self) -> Option<&Interlude> {
        self.active_interlude.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty()
    }

    pub fn is_active(&self, line: LineId) -> bool {
        self.active_flags.get(line.index()).copied().unwrap_or(false)
    }

    pub fn is_past(&self, line: LineId) -> bool {
        self.past.get(line.index()).copied().unwrap_or(false)
    }

    /// Whole-line progress over `[begin, group_end)`.
    pub fn line_progress(&self, line: LineId) -> f64 {
        self.line_progress.get(line.index()).copied().unwrap_or(0.0)
    }

    pub fn words_of(&self, line: LineId) -> &[WordProgress] {
        self.word_ranges
            .get(line.index())
            .map(|range| &self.word_progress[range.clone()])
            .unwrap_or(&[])
    }

    pub fn word_progress(&self, id: WordId) -> Option<f64> {
        self.words_of(id.line)
            .iter()
            .find(|word| word.id == id)
            .map(|word| word.progress)
    }

    pub fn all_word_progress(&self) -> &[WordProgress] {
        &self.word_progress
    }

    fn reset(&mut self, time: f64, line_count: usize) {
        self.time = time;
        self.active_cluster.clear();
        self.cluster_end = None;
        self.pre_activated = false;
        self.next_event_time = None;
        self.past.clear();
        self.past.resize(line_count, false);
        self.line_progress.clear();
        self.line_progress.resize(line_count, 0.0);
        self.word_progress.clear();
        self.active_interlude = None;
        self.active_flags.clear();
        self.active_flags.resize(line_count, false);
        self.word_ranges.clear();
    }
}

/// Progress of a timed span at `time`. Zero-length spans jump from 0 to 1 at
/// their begin.
pub fn span_progress(begin: f64, end: f64, time: f64) -> f64 {
    if end <= begin {
        return if time >= begin { 1.0 } else { 0.0 };
    }
    ((time - begin) / (end - begin)).clamp(0.0, 1.0)
}

pub fn word_progress(word: &Word, time: f64) -> f64 {
    span_progress(word.begin, word.end, time)
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackStateResolver<'a> {
    index: &'a LineIndex,
    interludes: &'a [Interlude],
}

impl<'a> PlaybackStateResolver<'a> {
    pub fn new(index: &'a LineIndex, interludes: &'a [Interlude]) -> Self {
        Self { index, interludes }
    }

    pub fn resolve(&self, adjusted_time: f64, config: &SyncConfig) -> PlaybackState {
        let mut state = PlaybackState::default();
        self.resolve_into(adjusted_time, config, &mut state);
        state
    }

    /// Resolves into `state`, reusing its allocations.
    pub fn resolve_into(&self, adjusted_time: f64, config: &SyncConfig, state: &mut PlaybackState) {
        let time = if adjusted_time.is_finite() {
            adjusted_time
        } else {
            0.0
        };
        let lines = self.index.lines();
        state.reset(time, lines.len());
        if lines.is_empty() {
            return;
        }

        state.active_interlude = active_interlude(self.interludes, time).copied();

        let started = self.index.started_by(time);
        for line in &lines[..started] {
            if time < line.group_end {
                state.active_cluster.push(line.id);
            }
        }

        if state.active_cluster.is_empty() && state.active_interlude.is_none() {
            if let Some(next) = self.pre_activation_target(time, started, config) {
                let cluster = lines[next].cluster;
                state.active_cluster.extend(
                    lines[next..]
                        .iter()
                        .filter(|line| line.cluster == cluster)
                        .map(|line| line.id),
                );
                state.pre_activated = true;
            }
        }

        for id in &state.active_cluster {
            state.active_flags[id.index()] = true;
        }
        state.cluster_end = state
            .active_cluster
            .iter()
            .map(|id| lines[id.index()].group_end)
            .reduce(f64::max);
        // Lines of the cluster already on screen are not a new event, even
        // when they have not begun yet.
        let active_cluster = &state.active_cluster;
        let next_event = lines[started..].iter().find(|line| {
            !active_cluster
                .iter()
                .any(|id| lines[id.index()].cluster == line.cluster)
        });
        state.next_event_time = next_event.map(|line| line.begin);

        let mode = self.index.document().word_timing_mode();
        for line in lines {
            let i = line.id.index();
            state.past[i] = !state.active_flags[i] && time >= line.group_end;
            let progress = span_progress(line.begin, line.group_end, time);
            state.line_progress[i] = progress;

            let start = state.word_progress.len();
            if let Some(source) = self.index.line(line.id) {
                push_word_progress(&mut state.word_progress, line.id, source, mode, progress, time);
            }
            state.word_ranges.push(start..state.word_progress.len());
        }

        trace!(
            time,
            active = state.active_cluster.len(),
            pre_activated = state.pre_activated,
            interlude = state.active_interlude.is_some(),
            "resolved playback state"
        );
    }

    /// Picks the next line to show early when playback sits in the gap after a
    /// finished cluster.
    fn pre_activation_target(&self, time: f64, started: usize, config: &SyncConfig) -> Option<usize> {
        let lines = self.index.lines();
        if started == 0 || started >= lines.len() {
            return None;
        }

        let previous_group_end = lines[..started]
            .iter()
            .map(|line| line.group_end)
            .fold(f64::NEG_INFINITY, f64::max);
        let next = &lines[started];
        let gap = next.begin - previous_group_end;
        let tuning = config.pre_activation;

        let short_gap = gap < tuning.max_gap_seconds;
        let mostly_elapsed = gap > 0.0 && (time - previous_group_end) / gap > tuning.elapsed_ratio;

        (short_gap || mostly_elapsed).then_some(started)
    }
}

fn push_word_progress(
    out: &mut Vec<WordProgress>,
    line_id: LineId,
    line: &Line,
    mode: WordTimingMode,
    line_progress: f64,
    time: f64,
) {
    let tracks = [
        (WordTrack::Lead, line.words.as_deref()),
        (WordTrack::Background, line.background_words.as_deref()),
        (WordTrack::Translation(0), line.translation_words[0].as_deref()),
        (WordTrack::Translation(1), line.translation_words[1].as_deref()),
        (WordTrack::Pronunciation, line.pronunciation_words.as_deref()),
    ];

    for (track, words) in tracks {
        let Some(words) = words else { continue };
        for (index, word) in words.iter().enumerate() {
            let progress = match mode {
                WordTimingMode::Word if word.timed => word_progress(word, time),
                _ => line_progress,
            };
            out.push(WordProgress {
                id: WordId {
                    line: line_id,
                    track,
                    index,
                },
                progress,
            });
        }
    }
}
