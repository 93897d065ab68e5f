use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::accessor::EdgeAnnotation;
use crate::cluster::ClusterId;
use crate::graph::RequestStructure;
use crate::hypothesis::TestOutcome;
use crate::store::{GlobalId, Snapshot};

/// Membership and response-time statistics of a cluster within one period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SnapshotStats {
    /// Member requests in this period
    pub frequency: usize,
    /// `frequency / period total`, 0 when the period is empty
    pub probability: f64,
    /// Mean response time, 0 without members
    pub mean: f64,
    /// Population standard deviation of response time
    pub stddev: f64,
}

/// Latency statistics of one edge across a cluster's members
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeInfo {
    /// Edge instances per period, repeats within a request included
    pub occurrences: [usize; 2],
    pub mean: [f64; 2],
    pub stddev: [f64; 2],
    /// `None` only when no test was submitted for this edge
    pub test: Option<TestOutcome>,
}

impl EdgeInfo {
    pub fn is_significant(&self) -> bool {
        self.test.as_ref().is_some_and(TestOutcome::is_significant)
    }

    /// Mean number of instances per member request in `snapshot`
    pub fn per_request(&self, snapshot: Snapshot, frequency: usize) -> f64 {
        if frequency == 0 {
            0.0
        } else {
            self.occurrences[snapshot.index()] as f64 / frequency as f64
        }
    }

    pub fn annotation(&self) -> EdgeAnnotation {
        EdgeAnnotation {
            significant: self.is_significant(),
            p_value: self.test.as_ref().and_then(TestOutcome::p_value),
            mean: self.mean,
            stddev: self.stddev,
        }
    }
}

/// Everything later stages need to know about one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfo {
    pub id: ClusterId,
    /// First global id of the first input vector
    pub representative: GlobalId,
    pub members: Vec<GlobalId>,
    pub snapshots: [SnapshotStats; 2],
    pub response_time_test: Option<TestOutcome>,
    /// Edge name -> statistics over all members
    pub edges: BTreeMap<String, EdgeInfo>,
    /// Edge names present in the representative's own record
    pub representative_edges: BTreeSet<String>,
    /// `None` when the representative record has no edges
    pub structure: Option<RequestStructure>,
}

impl ClusterInfo {
    pub fn stats(&self, snapshot: Snapshot) -> &SnapshotStats {
        &self.snapshots[snapshot.index()]
    }

    pub fn frequency(&self, snapshot: Snapshot) -> usize {
        self.snapshots[snapshot.index()].frequency
    }

    pub fn response_time_significant(&self) -> bool {
        self.response_time_test
            .as_ref()
            .is_some_and(TestOutcome::is_significant)
    }

    /// Edge names seen at least once among this period's members
    pub fn edges_in(&self, snapshot: Snapshot) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|(_, edge)| edge.occurrences[snapshot.index()] > 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Depth-first edge names of the representative, empty without edges
    pub fn edge_sequence(&self) -> Vec<String> {
        self.structure
            .as_ref()
            .map(RequestStructure::edge_sequence)
            .unwrap_or_default()
    }

    /// Overlay annotations for the edges of the representative record
    pub fn annotations(&self) -> BTreeMap<String, EdgeAnnotation> {
        self.representative_edges
            .iter()
            .filter_map(|name| {
                self.edges
                    .get(name)
                    .map(|edge| (name.clone(), edge.annotation()))
            })
            .collect()
    }
}
