//! Groups lines that have to be shown as active together.
//!
//! Lines end up in one cluster when their own ranges overlap, or when a line is
//! shorter than the configured threshold and gets chained onto the next one.
//! Every member of a cluster shares the same `group_end`.

use serde::Serialize;
use tracing::debug;

use crate::config::SyncConfig;
use crate::index::{IndexedLine, LineId, LineIndex};

const MAX_SHORT_LINE_GROUP_THRESHOLD: f64 = 5.0;
/// How many following lines the first pass looks at for direct overlaps.
const OVERLAP_LOOKAHEAD: usize = 2;
const MAX_PROVISIONAL_GROUP: usize = 3;

/// Identifier of a cluster: the id of its earliest member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClusterId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: ClusterId,
    pub members: Vec<LineId>,
    pub begin: f64,
    pub cluster_end: f64,
}

/// Result of clustering, indexed by line id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub cluster: Vec<ClusterId>,
    pub group_end: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterEngine {
    short_line_group_threshold: f64,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl ClusterEngine {
    pub fn new(short_line_group_threshold: f64) -> Self {
        let threshold = if short_line_group_threshold.is_finite() {
            short_line_group_threshold.clamp(0.0, MAX_SHORT_LINE_GROUP_THRESHOLD)
        } else {
            0.0
        };
        Self {
            short_line_group_threshold: threshold,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.short_line_group_threshold)
    }

    pub fn short_line_group_threshold(&self) -> f64 {
        self.short_line_group_threshold
    }

    /// Computes cluster membership and group ends. Only `begin` and
    /// `original_end` are read, so the result does not depend on a previous run.
    pub fn assign(&self, lines: &[IndexedLine]) -> ClusterAssignment {
        let count = lines.len();
        let mut sets = UnionFind::new(count);

        // Direct overlaps within a short window.
        let mut grouped = vec![false; count];
        for i in 0..count {
            if grouped[i] {
                continue;
            }
            grouped[i] = true;
            let mut members = 1;
            for j in (i + 1)..count.min(i + 1 + OVERLAP_LOOKAHEAD) {
                if members >= MAX_PROVISIONAL_GROUP {
                    break;
                }
                if !grouped[j] && lines[i].overlaps(&lines[j]) {
                    sets.union(i, j);
                    grouped[j] = true;
                    members += 1;
                }
            }
        }

        // Short lines continue into the next line's group.
        for i in 0..count.saturating_sub(1) {
            if lines[i].duration() < self.short_line_group_threshold {
                sets.union(i, i + 1);
            }
        }

        // Overlaps beyond the lookahead window: any line overlapping an earlier
        // line also overlaps the earlier line that reaches furthest.
        let mut reach: Option<usize> = None;
        for j in 0..count {
            if let Some(r) = reach {
                if lines[r].overlaps(&lines[j]) {
                    sets.union(r, j);
                }
            }
            if reach.map_or(true, |r| lines[j].original_end > lines[r].original_end) {
                reach = Some(j);
            }
        }

        let mut root_end = vec![f64::NEG_INFINITY; count];
        let mut root_cluster = vec![None; count];
        let mut cluster = Vec::with_capacity(count);
        for (i, line) in lines.iter().enumerate() {
            let root = sets.find(i);
            root_end[root] = root_end[root].max(line.original_end);
            let id = *root_cluster[root].get_or_insert(ClusterId(i));
            cluster.push(id);
        }

        let group_end = (0..count).map(|i| root_end[sets.find(i)]).collect();

        ClusterAssignment { cluster, group_end }
    }

    /// Writes the assignment into the index and returns the clusters in order.
    pub fn apply(&self, index: &mut LineIndex) -> Vec<Cluster> {
        let assignment = self.assign(index.lines());
        let mut clusters: Vec<Cluster> = Vec::new();
        // Position in `clusters` per cluster id, keyed by the id's line index.
        let mut slots: Vec<Option<usize>> = vec![None; index.len()];

        for line in index.lines_mut() {
            let id = assignment.cluster[line.id.index()];
            line.cluster = id;
            line.group_end = assignment.group_end[line.id.index()];

            match slots[id.0] {
                Some(slot) => clusters[slot].members.push(line.id),
                None => {
                    slots[id.0] = Some(clusters.len());
                    clusters.push(Cluster {
                        id,
                        members: vec![line.id],
                        begin: line.begin,
                        cluster_end: line.group_end,
                    });
                }
            }
        }

        debug!(
            lines = index.len(),
            clusters = clusters.len(),
            threshold = self.short_line_group_threshold,
            "clustered lyric lines"
        );
        clusters
    }
}

/// Disjoint sets with path compression and union by rank.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] = self.rank[a].saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::{Division, Document, Line, WordTimingMode};

    fn index_of(lines: Vec<Line>) -> LineIndex {
        let document = Document::builder(WordTimingMode::Line)
            .division(Division::from_lines(lines))
            .build();
        LineIndex::build(Arc::new(document))
    }

    fn group_ends(index: &LineIndex) -> Vec<f64> {
        index.lines().iter().map(|l| l.group_end).collect()
    }

    #[test]
    fn overlapping_lines_share_a_cluster() {
        let mut index = index_of(vec![Line::new(0.0, 2.0, "a"), Line::new(1.5, 3.0, "b")]);
        let clusters = ClusterEngine::new(0.6).apply(&mut index);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![LineId(0), LineId(1)]);
        assert_eq!(group_ends(&index), vec![3.0, 3.0]);
    }

    #[test]
    fn touching_lines_stay_apart() {
        let mut index = index_of(vec![Line::new(0.0, 2.0, "a"), Line::new(2.0, 4.0, "b")]);
        let clusters = ClusterEngine::new(0.6).apply(&mut index);

        assert_eq!(clusters.len(), 2);
        assert_eq!(group_ends(&index), vec![2.0, 4.0]);
    }

    #[test]
    fn short_lines_chain_into_the_next_cluster() {
        let mut index = index_of(vec![
            Line::new(0.0, 0.3, "hey"),
            Line::new(0.3, 0.5, "hey"),
            Line::new(0.5, 2.0, "ho"),
            Line::new(3.0, 5.0, "later"),
        ]);
        let clusters = ClusterEngine::new(0.6).apply(&mut index);

        assert_eq!(clusters.len(), 2);
        assert_eq!(group_ends(&index), vec![2.0, 2.0, 2.0, 5.0]);
        assert_eq!(index.lines()[1].cluster, ClusterId(0));
    }

    #[test]
    fn zero_threshold_disables_short_line_merging() {
        let mut index = index_of(vec![Line::new(0.0, 0.1, "a"), Line::new(0.1, 1.0, "b")]);
        let clusters = ClusterEngine::new(0.0).apply(&mut index);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn overlaps_beyond_the_lookahead_still_join() {
        let mut index = index_of(vec![
            Line::new(0.0, 10.0, "long"),
            Line::new(1.0, 2.0, "b"),
            Line::new(3.0, 4.0, "c"),
            Line::new(5.0, 6.0, "d"),
            Line::new(7.0, 8.0, "e"),
        ]);
        let clusters = ClusterEngine::new(0.0).apply(&mut index);

        assert_eq!(clusters.len(), 1);
        assert!(group_ends(&index).iter().all(|&end| end == 10.0));
    }

    #[test]
    fn every_pairwise_overlap_shares_a_group_end() {
        let mut index = index_of(vec![
            Line::new(0.0, 1.0, "a"),
            Line::new(0.5, 4.0, "b"),
            Line::new(0.6, 0.9, "c"),
            Line::new(0.7, 0.8, "d"),
            Line::new(3.5, 6.0, "e"),
            Line::new(7.0, 8.0, "f"),
        ]);
        ClusterEngine::new(0.6).apply(&mut index);

        let lines = index.lines();
        for a in lines {
            assert!(a.begin <= a.original_end && a.original_end <= a.group_end);
            for b in lines {
                if a.overlaps(b) {
                    assert_eq!(a.cluster, b.cluster);
                    assert_eq!(a.group_end, b.group_end);
                }
            }
        }
    }

    #[test]
    fn clustering_is_idempotent() {
        let mut index = index_of(vec![
            Line::new(0.0, 0.4, "a"),
            Line::new(0.4, 2.0, "b"),
            Line::new(1.0, 3.0, "c"),
            Line::new(5.0, 6.0, "d"),
        ]);
        let engine = ClusterEngine::new(0.6);

        engine.apply(&mut index);
        let first = index.lines().to_vec();
        engine.apply(&mut index);
        assert_eq!(index.lines(), first.as_slice());
    }

    #[test]
    fn many_singleton_clusters_keep_their_members() {
        let lines = (0..5_000)
            .map(|i| Line::new(i as f64 * 2.0, i as f64 * 2.0 + 1.0, "solo"))
            .collect();
        let mut index = index_of(lines);
        let clusters = ClusterEngine::new(0.0).apply(&mut index);

        assert_eq!(clusters.len(), 5_000);
        for (i, cluster) in clusters.iter().enumerate() {
            assert_eq!(cluster.id, ClusterId(i));
            assert_eq!(cluster.members, vec![LineId(i)]);
        }
    }

    #[test]
    fn interleaved_members_land_in_their_own_cluster() {
        let mut index = index_of(vec![
            Line::new(0.0, 10.0, "long"),
            Line::new(1.0, 2.0, "b"),
            Line::new(12.0, 13.0, "c"),
            Line::new(14.0, 15.0, "d"),
        ]);
        let clusters = ClusterEngine::new(0.0).apply(&mut index);

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].members, vec![LineId(0), LineId(1)]);
        assert_eq!(clusters[1].members, vec![LineId(2)]);
        assert_eq!(clusters[2].members, vec![LineId(3)]);
    }

    #[test]
    fn clamps_threshold() {
        assert_eq!(ClusterEngine::new(9.0).short_line_group_threshold(), 5.0);
        assert_eq!(ClusterEngine::new(-1.0).short_line_group_threshold(), 0.0);
        assert_eq!(ClusterEngine::new(f64::NAN).short_line_group_threshold(), 0.0);
    }
}
