//! Loosely typed JSON shape accepted before validation.

use serde::Deserialize;
use tracing::warn;

use super::{
    Agent, AgentId, AgentKind, BackgroundPosition, Division, DocumentBuilder, Line, Word,
    WordTimingMode,
};

/// A timestamp as it appears in the input: seconds as a number, seconds as a
/// string, or a clock string such as `01:02.50`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawTimestamp {
    /// Returns the timestamp in seconds, or `None` when it cannot be read.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            Self::Seconds(value) => Some(*value),
            Self::Text(text) => parse_clock(text),
            Self::Other(_) => None,
        }
    }
}

fn parse_clock(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds);
    }

    let mut total = 0.0;
    let mut fields = 0;
    for part in text.split(':') {
        let value: f64 = part.trim().parse().ok()?;
        if fields > 0 && !(0.0..60.0).contains(&value) {
            return None;
        }
        total = total * 60.0 + value;
        fields += 1;
    }

    (2..=3).contains(&fields).then_some(total)
}

fn seconds_or_nan(raw: Option<&RawTimestamp>, field: &str) -> f64 {
    match raw {
        None => f64::NAN,
        Some(timestamp) => timestamp.seconds().unwrap_or_else(|| {
            warn!(field, value = ?timestamp, "unparseable timestamp");
            f64::NAN
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWord {
    #[serde(default)]
    begin: Option<RawTimestamp>,
    #[serde(default)]
    end: Option<RawTimestamp>,
    #[serde(default)]
    text: String,
}

impl RawWord {
    fn into_word(self) -> Word {
        Word {
            begin: seconds_or_nan(self.begin.as_ref(), "word.begin"),
            end: seconds_or_nan(self.end.as_ref(), "word.end"),
            text: self.text,
            timed: true,
        }
    }
}

fn convert_words(words: Option<Vec<RawWord>>) -> Option<Vec<Word>> {
    words.map(|words| words.into_iter().map(RawWord::into_word).collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLine {
    #[serde(default)]
    begin: Option<RawTimestamp>,
    #[serde(default)]
    end: Option<RawTimestamp>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Option<Vec<RawWord>>,
    #[serde(default)]
    background_words: Option<Vec<RawWord>>,
    #[serde(default)]
    background_position: BackgroundPosition,
    #[serde(default)]
    translation_words: Vec<Option<Vec<RawWord>>>,
    #[serde(default)]
    pronunciation_words: Option<Vec<RawWord>>,
    #[serde(default)]
    agent: Option<String>,
}

impl RawLine {
    fn into_line(self) -> Line {
        if self.translation_words.len() > 2 {
            warn!(
                slots = self.translation_words.len(),
                "only two translation slots are kept"
            );
        }
        let mut slots = self.translation_words.into_iter().map(convert_words);
        let translation_words = [slots.next().flatten(), slots.next().flatten()];

        Line {
            begin: seconds_or_nan(self.begin.as_ref(), "line.begin"),
            end: seconds_or_nan(self.end.as_ref(), "line.end"),
            text: self.text,
            words: convert_words(self.words),
            background_words: convert_words(self.background_words),
            background_position: self.background_position,
            translation_words,
            pronunciation_words: convert_words(self.pronunciation_words),
            agent: self.agent.map(AgentId::new),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDivision {
    #[serde(default)]
    begin: Option<RawTimestamp>,
    #[serde(default)]
    end: Option<RawTimestamp>,
    #[serde(default)]
    lines: Vec<RawLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAgent {
    id: String,
    #[serde(rename = "type", default)]
    kind: AgentKind,
    #[serde(default)]
    name: Option<String>,
}

/// Document as decoded from JSON, before any validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    #[serde(default)]
    agents: Vec<RawAgent>,
    #[serde(default)]
    divisions: Vec<RawDivision>,
    #[serde(default)]
    word_timing_mode: WordTimingMode,
}

impl RawDocument {
    pub fn into_builder(self) -> DocumentBuilder {
        let mut builder = DocumentBuilder::new(self.word_timing_mode);

        for agent in self.agents {
            builder = builder.agent(Agent {
                id: AgentId::new(agent.id),
                kind: agent.kind,
                name: agent.name,
            });
        }

        builder.divisions(self.divisions.into_iter().map(|division| Division {
            begin: seconds_or_nan(division.begin.as_ref(), "division.begin"),
            end: seconds_or_nan(division.end.as_ref(), "division.end"),
            lines: division.lines.into_iter().map(RawLine::into_line).collect(),
        }))
    }
}
