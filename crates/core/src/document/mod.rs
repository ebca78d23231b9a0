//! Normalized timed-text document.
//!
//! A [`Document`] is built once per track through [`DocumentBuilder`] (or
//! [`parse`] for JSON input) and never mutated afterwards. All repairs to the
//! input, such as malformed timestamps or agents that are referenced but never
//! declared, happen while building.

mod raw;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{LyricSyncError, Result};

pub use raw::{RawDocument, RawTimestamp};

/// A single timed word (or syllable).
///
/// `timed` is false when the source carried no usable timestamps for the
/// word. Such words follow their line's progress and their bounds are copied
/// from the line while building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub begin: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default = "timed_by_default")]
    pub timed: bool,
}

fn timed_by_default() -> bool {
    true
}

impl Word {
    pub fn new(begin: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            begin,
            end,
            text: text.into(),
            timed: true,
        }
    }

    /// A word without timestamps of its own.
    pub fn untimed(text: impl Into<String>) -> Self {
        Self {
            begin: f64::NAN,
            end: f64::NAN,
            text: text.into(),
            timed: false,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.begin).max(0.0)
    }
}

/// Identifier of an [`Agent`]. Lines refer to agents by id only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Person,
    Group,
    Other,
}

/// A singer (or group of singers) in a duet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    #[serde(rename = "type", default)]
    pub kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: AgentId::new(id),
            kind,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Side of the view a duet line is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSide {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundPosition {
    Above,
    #[default]
    Below,
}

/// Whether timing information is available per word or only per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WordTimingMode {
    #[default]
    Line,
    Word,
}

/// One lyric line with its optional word tracks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub begin: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_words: Option<Vec<Word>>,
    #[serde(default)]
    pub background_position: BackgroundPosition,
    #[serde(default)]
    pub translation_words: [Option<Vec<Word>>; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation_words: Option<Vec<Word>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
}

impl Line {
    pub fn new(begin: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            begin,
            end,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Builds a word-timed line whose text is the concatenation of its words.
    pub fn with_words(words: Vec<Word>) -> Self {
        let begin = words
            .iter()
            .map(|w| w.begin)
            .find(|begin| begin.is_finite())
            .unwrap_or(f64::NAN);
        let end = words
            .iter()
            .map(|w| w.end)
            .fold(f64::NAN, |acc, end| if acc.is_nan() { end } else { acc.max(end) });
        let text = words.iter().map(|w| w.text.as_str()).collect::<String>();
        Self {
            begin,
            end,
            text: Some(text),
            words: Some(words),
            ..Default::default()
        }
    }

    pub fn sung_by(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(AgentId::new(agent));
        self
    }

    pub fn with_background(mut self, words: Vec<Word>, position: BackgroundPosition) -> Self {
        self.background_words = Some(words);
        self.background_position = position;
        self
    }

    pub fn with_translation(mut self, slot: usize, words: Vec<Word>) -> Self {
        if let Some(entry) = self.translation_words.get_mut(slot) {
            *entry = Some(words);
        }
        self
    }

    pub fn with_pronunciation(mut self, words: Vec<Word>) -> Self {
        self.pronunciation_words = Some(words);
        self
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.begin).max(0.0)
    }

    /// Whether the lead vocal carries at least one timed word.
    pub fn has_word_timing(&self) -> bool {
        self.words.as_ref().map(|w| !w.is_empty()).unwrap_or(false)
    }

    fn word_tracks_mut(&mut self) -> impl Iterator<Item = &mut Vec<Word>> {
        let [first, second] = &mut self.translation_words;
        [
            self.words.as_mut(),
            self.background_words.as_mut(),
            first.as_mut(),
            second.as_mut(),
            self.pronunciation_words.as_mut(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Structural section (verse, chorus, ...) holding a run of lines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Division {
    pub begin: f64,
    pub end: f64,
    #[serde(default)]
    pub lines: Vec<Line>,
}

impl Division {
    pub fn new(begin: f64, end: f64, lines: Vec<Line>) -> Self {
        Self { begin, end, lines }
    }

    /// Builds a division whose bounds are taken from its lines when built.
    pub fn from_lines(lines: Vec<Line>) -> Self {
        Self {
            begin: f64::NAN,
            end: f64::NAN,
            lines,
        }
    }
}

/// Immutable lyric document for one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    agents: Vec<Agent>,
    divisions: Vec<Division>,
    word_timing_mode: WordTimingMode,
}

impl Document {
    pub fn builder(mode: WordTimingMode) -> DocumentBuilder {
        DocumentBuilder::new(mode)
    }

    /// A document with no lines at all.
    pub fn empty() -> Self {
        DocumentBuilder::new(WordTimingMode::Line).build()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn divisions(&self) -> &[Division] {
        &self.divisions
    }

    pub fn word_timing_mode(&self) -> WordTimingMode {
        self.word_timing_mode
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|agent| &agent.id == id)
    }

    pub fn line_count(&self) -> usize {
        self.divisions.iter().map(|d| d.lines.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.line_count() == 0
    }

    /// Whether more than one person sings in this track.
    pub fn is_duet(&self) -> bool {
        self.agents
            .iter()
            .filter(|agent| agent.kind == AgentKind::Person)
            .count()
            > 1
    }

    /// Resolves which side of the view lines of `id` are placed on. Person
    /// agents alternate sides in declaration order; everything else, including
    /// unknown ids, sits at the start.
    pub fn agent_side(&self, id: &AgentId) -> AgentSide {
        let position = self
            .agents
            .iter()
            .filter(|agent| agent.kind == AgentKind::Person)
            .position(|agent| &agent.id == id);

        match position {
            Some(index) if index % 2 == 1 => AgentSide::End,
            _ => AgentSide::Start,
        }
    }
}

/// Parses a JSON document and runs it through [`DocumentBuilder`].
pub fn parse(raw: &str) -> Result<Document> {
    let raw: RawDocument =
        serde_json::from_str(raw).map_err(|err| LyricSyncError::parse(err.to_string()))?;
    Ok(raw.into_builder().build())
}

/// Validates, repairs and freezes a [`Document`].
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    agents: Vec<Agent>,
    divisions: Vec<Division>,
    mode: WordTimingMode,
}

impl DocumentBuilder {
    pub fn new(mode: WordTimingMode) -> Self {
        Self {
            agents: Vec::new(),
            divisions: Vec::new(),
            mode,
        }
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn division(mut self, division: Division) -> Self {
        self.divisions.push(division);
        self
    }

    pub fn divisions(mut self, divisions: impl IntoIterator<Item = Division>) -> Self {
        self.divisions.extend(divisions);
        self
    }

    pub fn build(self) -> Document {
        let Self {
            agents,
            divisions,
            mode,
        } = self;

        let divisions: Vec<Division> = divisions
            .into_iter()
            .enumerate()
            .map(|(index, division)| normalize_division(index, division))
            .collect();
        let agents = enrich_agents(agents, &divisions);

        debug!(
            divisions = divisions.len(),
            agents = agents.len(),
            ?mode,
            "built lyric document"
        );

        Document {
            agents,
            divisions,
            word_timing_mode: mode,
        }
    }
}

fn normalize_division(index: usize, mut division: Division) -> Division {
    for (position, line) in division.lines.iter_mut().enumerate() {
        normalize_line(index, position, line);
    }

    if !division.begin.is_finite() {
        division.begin = division
            .lines
            .iter()
            .map(|line| line.begin)
            .reduce(f64::min)
            .unwrap_or(0.0);
    }
    if !division.end.is_finite() {
        division.end = division
            .lines
            .iter()
            .map(|line| line.end)
            .reduce(f64::max)
            .unwrap_or(division.begin);
    }

    let (begin, end) = normalize_span(division.begin, division.end);
    if (begin, end) != (division.begin, division.end) {
        warn!(
            division = index,
            begin = division.begin,
            end = division.end,
            "malformed division bounds normalized"
        );
    }
    division.begin = begin;
    division.end = end;
    division
}

fn normalize_line(division: usize, position: usize, line: &mut Line) {
    for track in line.word_tracks_mut() {
        for word in track.iter_mut() {
            if !word.begin.is_finite() || !word.end.is_finite() {
                if word.timed {
                    debug!(division, line = position, word = %word.text, "word has no usable timing");
                }
                word.timed = false;
                continue;
            }
            let (begin, end) = normalize_span(word.begin, word.end);
            if (begin, end) != (word.begin, word.end) {
                warn!(
                    division,
                    line = position,
                    word = %word.text,
                    begin = word.begin,
                    end = word.end,
                    "malformed word timestamps normalized"
                );
            }
            word.begin = begin;
            word.end = end;
        }
    }

    // Word-timed lines with unusable bounds borrow them from their timed lead words.
    if let Some(words) = &line.words {
        if !line.begin.is_finite() {
            if let Some(first) = words.iter().find(|w| w.timed) {
                line.begin = first.begin;
            }
        }
        if !line.end.is_finite() {
            if let Some(last_end) = words.iter().filter(|w| w.timed).map(|w| w.end).reduce(f64::max) {
                line.end = last_end;
            }
        }
    }

    let (begin, end) = normalize_span(line.begin, line.end);
    if (begin, end) != (line.begin, line.end) {
        warn!(
            division,
            line = position,
            begin = line.begin,
            end = line.end,
            "malformed line timestamps normalized"
        );
    }
    line.begin = begin;
    line.end = end;

    for track in line.word_tracks_mut() {
        for word in track.iter_mut().filter(|w| !w.timed) {
            word.begin = begin;
            word.end = end;
        }
    }
}

/// Collapses malformed ranges to a zero-length interval. An unusable or
/// negative begin becomes 0; an unusable end or one before begin becomes begin.
/// Negative zero comes out as positive zero so ordering by begin stays stable.
pub(crate) fn normalize_span(begin: f64, end: f64) -> (f64, f64) {
    let begin = if begin.is_finite() && begin > 0.0 { begin } else { 0.0 };
    let end = if end.is_finite() && end > begin { end } else { begin };
    (begin, end)
}

fn enrich_agents(declared: Vec<Agent>, divisions: &[Division]) -> Vec<Agent> {
    let mut seen = HashSet::new();
    let mut agents = Vec::with_capacity(declared.len());

    for agent in declared {
        if seen.insert(agent.id.clone()) {
            agents.push(agent);
        } else {
            warn!(agent = %agent.id, "duplicate agent declaration ignored");
        }
    }

    let referenced = divisions
        .iter()
        .flat_map(|division| division.lines.iter())
        .filter_map(|line| line.agent.as_ref());

    for id in referenced {
        if seen.insert(id.clone()) {
            warn!(agent = %id, "line references undeclared agent, synthesizing one");
            agents.push(Agent {
                id: id.clone(),
                kind: AgentKind::Person,
                name: None,
            });
        }
    }

    agents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_malformed_line_ranges() {
        let document = Document::builder(WordTimingMode::Line)
            .division(Division::new(
                0.0,
                10.0,
                vec![Line::new(4.0, 2.0, "backwards"), Line::new(-3.0, 1.0, "negative")],
            ))
            .build();

        let lines = &document.divisions()[0].lines;
        assert_eq!((lines[0].begin, lines[0].end), (4.0, 4.0));
        assert_eq!((lines[1].begin, lines[1].end), (0.0, 1.0));
    }

    #[test]
    fn unparseable_begin_becomes_zero() {
        assert_eq!(normalize_span(f64::NAN, f64::NAN), (0.0, 0.0));
        assert_eq!(normalize_span(f64::NAN, 3.0), (0.0, 3.0));
        assert_eq!(normalize_span(2.0, f64::INFINITY), (2.0, 2.0));
    }

    #[test]
    fn negative_zero_begin_becomes_positive_zero() {
        let (begin, end) = normalize_span(-0.0, -0.0);
        assert!(begin.is_sign_positive());
        assert!(end.is_sign_positive());

        let document = Document::builder(WordTimingMode::Line)
            .division(Division::new(
                0.0,
                2.0,
                vec![Line::new(0.0, 1.0, "first"), Line::new(-0.0, 2.0, "second")],
            ))
            .build();
        assert!(document.divisions()[0].lines[1].begin.is_sign_positive());

        let index = crate::index::LineIndex::build(std::sync::Arc::new(document));
        let order: Vec<usize> = index.lines().iter().map(|l| l.position).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn untimed_words_take_their_line_bounds() {
        let line = Line {
            words: Some(vec![Word::untimed("oh "), Word::new(2.0, 3.0, "yeah")]),
            ..Line::new(f64::NAN, f64::NAN, "oh yeah")
        };
        let document = Document::builder(WordTimingMode::Word)
            .division(Division::from_lines(vec![line]))
            .build();

        let line = &document.divisions()[0].lines[0];
        assert_eq!((line.begin, line.end), (2.0, 3.0));
        let words = line.words.as_ref().unwrap();
        assert!(!words[0].timed);
        assert_eq!((words[0].begin, words[0].end), (2.0, 3.0));
        assert!(words[1].timed);
    }

    #[test]
    fn derives_division_bounds_from_lines() {
        let document = Document::builder(WordTimingMode::Line)
            .division(Division::from_lines(vec![
                Line::new(3.0, 5.0, "a"),
                Line::new(6.0, 8.5, "b"),
            ]))
            .build();

        let division = &document.divisions()[0];
        assert_eq!(division.begin, 3.0);
        assert_eq!(division.end, 8.5);
    }

    #[test]
    fn word_timed_line_borrows_bounds_from_words() {
        let line = Line::with_words(vec![Word::new(1.0, 1.5, "hel"), Word::new(1.5, 2.25, "lo")]);
        assert_eq!(line.begin, 1.0);
        assert_eq!(line.end, 2.25);
        assert_eq!(line.text.as_deref(), Some("hello"));
        assert!(line.has_word_timing());
    }

    #[test]
    fn synthesizes_undeclared_agents() {
        let document = Document::builder(WordTimingMode::Line)
            .agent(Agent::new("v1", AgentKind::Person).named("Lead"))
            .division(Division::new(
                0.0,
                4.0,
                vec![
                    Line::new(0.0, 1.0, "one").sung_by("v1"),
                    Line::new(1.0, 2.0, "two").sung_by("v2"),
                    Line::new(2.0, 3.0, "three").sung_by("v2"),
                ],
            ))
            .build();

        assert_eq!(document.agents().len(), 2);
        let synthesized = document.agent(&AgentId::new("v2")).unwrap();
        assert_eq!(synthesized.kind, AgentKind::Person);
        assert!(synthesized.name.is_none());
        assert!(document.is_duet());
    }

    #[test]
    fn alternates_duet_sides() {
        let document = Document::builder(WordTimingMode::Line)
            .agent(Agent::new("v1", AgentKind::Person))
            .agent(Agent::new("choir", AgentKind::Group))
            .agent(Agent::new("v2", AgentKind::Person))
            .build();

        assert_eq!(document.agent_side(&"v1".into()), AgentSide::Start);
        assert_eq!(document.agent_side(&"v2".into()), AgentSide::End);
        assert_eq!(document.agent_side(&"choir".into()), AgentSide::Start);
        assert_eq!(document.agent_side(&"nobody".into()), AgentSide::Start);
    }

    #[test]
    fn ignores_duplicate_agent_declarations() {
        let document = Document::builder(WordTimingMode::Line)
            .agent(Agent::new("v1", AgentKind::Person))
            .agent(Agent::new("v1", AgentKind::Group))
            .build();

        assert_eq!(document.agents().len(), 1);
        assert_eq!(document.agents()[0].kind, AgentKind::Person);
    }

    #[test]
    fn empty_document_has_no_lines() {
        let document = Document::empty();
        assert!(document.is_empty());
        assert_eq!(document.line_count(), 0);
    }
}
