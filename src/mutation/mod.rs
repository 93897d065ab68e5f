//! Mutation classification, ranking and rendering
//!
//! Every cluster is classified independently; one cluster may be a
//! structural mutation, a response-time change and an originating cluster
//! at once. Classifications are turned into [`MutationRecord`]s per ranked
//! view. A cluster that is both a structural mutation and a response-time
//! change yields two records, `<id>_s` and `<id>_r`, so that each cost ranks
//! on its own axis. Records are never stored; they are derived again for
//! each view from the same classifications.

mod classify;
mod ranking;
mod report;

use std::fmt;

use serde::Serialize;

pub use classify::{Classification, Classifier, StructuralDiff};
pub use ranking::{derive_records, rank, MutationRecord, RankingView};
pub use report::{
    render_view, write_cluster_info, write_cluster_info_json, write_test_coverage, write_views,
    ReportSummary,
};

/// Kind of change a cluster exhibits between the two periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MutationKind {
    StructuralMutation,
    ResponseTimeChange,
    OriginatingCluster,
    NotInteresting,
}

impl MutationKind {
    /// Stable machine-readable tag, used in the cluster info report
    pub fn tag(self) -> &'static str {
        match self {
            MutationKind::StructuralMutation => "structural_mutation",
            MutationKind::ResponseTimeChange => "response_time_change",
            MutationKind::OriginatingCluster => "originating_cluster",
            MutationKind::NotInteresting => "not_interesting",
        }
    }

    /// Suffix appended to the record id when a cluster is unrolled
    pub fn unrolled_suffix(self) -> Option<&'static str> {
        match self {
            MutationKind::StructuralMutation => Some("_s"),
            MutationKind::ResponseTimeChange => Some("_r"),
            _ => None,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MutationKind::StructuralMutation => "Structural mutation",
            MutationKind::ResponseTimeChange => "Response time change",
            MutationKind::OriginatingCluster => "Originating cluster",
            MutationKind::NotInteresting => "Not interesting",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests;
