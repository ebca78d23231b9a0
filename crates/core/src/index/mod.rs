use std::sync::Arc;

use serde::Serialize;

use crate::cluster::ClusterId;
use crate::document::{Document, Line};

/// Position of a line in the time-ordered index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LineId(pub usize);

impl LineId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A document line flattened into the index, with the timing fields every
/// downstream stage reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedLine {
    pub id: LineId,
    pub division: usize,
    /// Position of the line inside its division.
    pub position: usize,
    /// Position of the line in document order across all divisions.
    pub order: usize,
    pub begin: f64,
    pub end: f64,
    /// `end` as it was before clustering touched `group_end`.
    pub original_end: f64,
    pub group_end: f64,
    pub cluster: ClusterId,
}

impl IndexedLine {
    pub fn duration(&self) -> f64 {
        (self.original_end - self.begin).max(0.0)
    }

    /// Positive-length intersection of the two lines' own ranges.
    pub fn overlaps(&self, other: &IndexedLine) -> bool {
        self.original_end.min(other.original_end) - self.begin.max(other.begin) > 0.0
    }
}

/// All lines of a document sorted by begin time.
#[derive(Debug, Clone)]
pub struct LineIndex {
    document: Arc<Document>,
    lines: Vec<IndexedLine>,
    division_last_line: Vec<Option<usize>>,
}

impl LineIndex {
    /// Flattens the document. Lines are ordered by `begin`; equal begins keep
    /// document order.
    pub fn build(document: Arc<Document>) -> Self {
        let mut lines = Vec::with_capacity(document.line_count());
        for (division_index, division) in document.divisions().iter().enumerate() {
            for (position, line) in division.lines.iter().enumerate() {
                let order = lines.len();
                lines.push(IndexedLine {
                    id: LineId(order),
                    division: division_index,
                    position,
                    order,
                    begin: line.begin,
                    end: line.end,
                    original_end: line.end,
                    group_end: line.end,
                    cluster: ClusterId(order),
                });
            }
        }

        // Stable sort keeps document order for equal begins.
        lines.sort_by(|a, b| a.begin.total_cmp(&b.begin));

        let mut division_last_line = vec![None; document.divisions().len()];
        for (index, line) in lines.iter_mut().enumerate() {
            line.id = LineId(index);
            line.cluster = ClusterId(index);
            let slot = &mut division_last_line[line.division];
            *slot = Some(slot.map_or(index, |last: usize| last.max(index)));
        }

        Self {
            document,
            lines,
            division_last_line,
        }
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn lines(&self) -> &[IndexedLine] {
        &self.lines
    }

    pub(crate) fn lines_mut(&mut self) -> &mut [IndexedLine] {
        &mut self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, id: LineId) -> Option<&IndexedLine> {
        self.lines.get(id.0)
    }

    /// The document line behind an indexed entry.
    pub fn line(&self, id: LineId) -> Option<&Line> {
        let entry = self.get(id)?;
        self.document
            .divisions()
            .get(entry.division)?
            .lines
            .get(entry.position)
    }

    /// For every division, the index of the last line (in time order) that
    /// belongs to it. Empty divisions map to `None`.
    pub fn division_last_line_index(&self) -> &[Option<usize>] {
        &self.division_last_line
    }

    /// Number of lines whose begin is at or before `time`.
    pub fn started_by(&self, time: f64) -> usize {
        self.lines.partition_point(|line| line.begin <= time)
    }

    pub fn cluster_members(&self, cluster: ClusterId) -> impl Iterator<Item = &IndexedLine> + '_ {
        self.lines.iter().filter(move |line| line.cluster == cluster)
    }
}
