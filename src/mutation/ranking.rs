use std::cmp::Ordering;

use serde::Serialize;

use crate::cluster::ClusterId;
use crate::mutation::{Classification, MutationKind};

/// One rankable entry derived from a [`Classification`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRecord {
    pub cluster: ClusterId,
    pub kind: MutationKind,
    pub cost: f64,
    pub originators: Vec<ClusterId>,
    /// The source cluster yielded both a structural and a response-time record
    pub unrolled: bool,
}

impl MutationRecord {
    /// `"<id>"`, or `"<id>_s"` / `"<id>_r"` for unrolled records
    pub fn record_id(&self) -> String {
        match self.kind.unrolled_suffix() {
            Some(suffix) if self.unrolled => format!("{}{}", self.cluster, suffix),
            _ => self.cluster.to_string(),
        }
    }
}

/// Mutation records of one cluster: none, one, or two when unrolled
///
/// `weighted` selects the occurrence-weighted structural cost.
pub fn derive_records(classification: &Classification, weighted: bool) -> Vec<MutationRecord> {
    let unrolled = classification.is_unrolled();
    let mut records = Vec::with_capacity(2);

    if let Some(diff) = &classification.structural {
        records.push(MutationRecord {
            cluster: classification.cluster,
            kind: MutationKind::StructuralMutation,
            cost: if weighted { diff.weighted_cost } else { diff.cost },
            originators: classification.originators.clone(),
            unrolled,
        });
    }
    if let Some(cost) = classification.response_time_cost {
        records.push(MutationRecord {
            cluster: classification.cluster,
            kind: MutationKind::ResponseTimeChange,
            cost,
            originators: Vec::new(),
            unrolled,
        });
    }
    records
}

/// A ranked output view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RankingView {
    ResponseTimeChanges,
    StructuralMutations,
    StructuralMutationsWeighted,
    Combined,
    CombinedWeighted,
    OriginatingClusters,
    NotInteresting,
}

impl RankingView {
    /// Views to render; weighted variants only when requested
    pub fn enabled(use_weighted_costs: bool) -> Vec<RankingView> {
        [
            RankingView::ResponseTimeChanges,
            RankingView::StructuralMutations,
            RankingView::StructuralMutationsWeighted,
            RankingView::Combined,
            RankingView::CombinedWeighted,
            RankingView::OriginatingClusters,
            RankingView::NotInteresting,
        ]
        .into_iter()
        .filter(|view| use_weighted_costs || !view.is_weighted())
        .collect()
    }

    pub fn is_weighted(self) -> bool {
        matches!(
            self,
            RankingView::StructuralMutationsWeighted | RankingView::CombinedWeighted
        )
    }

    /// Entries are ordered by cluster id rather than cost
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            RankingView::OriginatingClusters | RankingView::NotInteresting
        )
    }

    pub fn file_name(self) -> &'static str {
        match self {
            RankingView::ResponseTimeChanges => "response_time_changes.dot",
            RankingView::StructuralMutations => "structural_mutations.dot",
            RankingView::StructuralMutationsWeighted => "structural_mutations_weighted.dot",
            RankingView::Combined => "combined_ranked.dot",
            RankingView::CombinedWeighted => "combined_ranked_weighted.dot",
            RankingView::OriginatingClusters => "originating_clusters.dot",
            RankingView::NotInteresting => "not_interesting.dot",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RankingView::ResponseTimeChanges => "Response time changes",
            RankingView::StructuralMutations => "Structural mutations",
            RankingView::StructuralMutationsWeighted => "Structural mutations (weighted)",
            RankingView::Combined => "Combined ranking",
            RankingView::CombinedWeighted => "Combined ranking (weighted)",
            RankingView::OriginatingClusters => "Originating clusters",
            RankingView::NotInteresting => "Not interesting clusters",
        }
    }

    fn admits(self, kind: MutationKind) -> bool {
        match self {
            RankingView::ResponseTimeChanges => kind == MutationKind::ResponseTimeChange,
            RankingView::StructuralMutations | RankingView::StructuralMutationsWeighted => {
                kind == MutationKind::StructuralMutation
            }
            RankingView::Combined | RankingView::CombinedWeighted => matches!(
                kind,
                MutationKind::StructuralMutation | MutationKind::ResponseTimeChange
            ),
            RankingView::OriginatingClusters | RankingView::NotInteresting => false,
        }
    }
}

/// Build and order the records of one view
///
/// Cost views sort by descending cost, then ascending cluster id, then
/// structural before response-time. Informational views list clusters in
/// ascending id order with zero cost.
pub fn rank(view: RankingView, classifications: &[Classification]) -> Vec<MutationRecord> {
    let mut records: Vec<MutationRecord> = match view {
        RankingView::OriginatingClusters => classifications
            .iter()
            .filter(|c| c.originating)
            .map(|c| informational(c, MutationKind::OriginatingCluster))
            .collect(),
        RankingView::NotInteresting => classifications
            .iter()
            .filter(|c| !c.is_interesting())
            .map(|c| informational(c, MutationKind::NotInteresting))
            .collect(),
        _ => classifications
            .iter()
            .flat_map(|c| derive_records(c, view.is_weighted()))
            .filter(|r| view.admits(r.kind))
            .collect(),
    };

    if view.is_informational() {
        records.sort_by_key(|r| r.cluster);
    } else {
        records.sort_by(compare_by_cost);
    }
    records
}

fn informational(classification: &Classification, kind: MutationKind) -> MutationRecord {
    MutationRecord {
        cluster: classification.cluster,
        kind,
        cost: 0.0,
        originators: Vec::new(),
        unrolled: false,
    }
}

fn compare_by_cost(a: &MutationRecord, b: &MutationRecord) -> Ordering {
    b.cost
        .total_cmp(&a.cost)
        .then_with(|| a.cluster.cmp(&b.cluster))
        .then_with(|| a.kind.cmp(&b.kind))
}
