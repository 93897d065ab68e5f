use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{ClusterId, ClusterInfo};
use crate::config::DiagnosisConfig;
use crate::distance::DistanceOracle;
use crate::mutation::MutationKind;
use crate::store::{EdgeAggregates, Snapshot};

/// Edges whose presence or per-request occurrence differs between periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralDiff {
    pub differing_edges: Vec<String>,
    /// Number of differing edges
    pub cost: f64,
    /// Sum of the differing edges' occurrences across the cluster's members
    pub weighted_cost: f64,
}

/// Outcome of classifying one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub cluster: ClusterId,
    pub structural: Option<StructuralDiff>,
    /// `|mean1 - mean0| * problem-period frequency` when the response-time
    /// test was significant
    pub response_time_cost: Option<f64>,
    pub originating: bool,
    /// Nearest originating clusters, filled for structural mutations only
    pub originators: Vec<ClusterId>,
}

impl Classification {
    pub fn is_structural(&self) -> bool {
        self.structural.is_some()
    }

    pub fn is_response_time_change(&self) -> bool {
        self.response_time_cost.is_some()
    }

    pub fn is_interesting(&self) -> bool {
        self.is_structural() || self.is_response_time_change() || self.originating
    }

    /// Every kind that applies, or just `NotInteresting`
    pub fn kinds(&self) -> Vec<MutationKind> {
        let mut kinds = Vec::new();
        if self.is_structural() {
            kinds.push(MutationKind::StructuralMutation);
        }
        if self.is_response_time_change() {
            kinds.push(MutationKind::ResponseTimeChange);
        }
        if self.originating {
            kinds.push(MutationKind::OriginatingCluster);
        }
        if kinds.is_empty() {
            kinds.push(MutationKind::NotInteresting);
        }
        kinds
    }

    /// Both mutation costs apply, so the cluster ranks as two records
    pub fn is_unrolled(&self) -> bool {
        self.is_structural() && self.is_response_time_change()
    }
}

/// Classifies clusters from their statistics and the store-wide edge aggregates
pub struct Classifier<'a> {
    config: &'a DiagnosisConfig,
    aggregates: &'a EdgeAggregates,
    totals: [usize; 2],
    oracle: Option<&'a dyn DistanceOracle>,
}

impl<'a> Classifier<'a> {
    /// `totals` are the request counts of each snapshot
    pub fn new(config: &'a DiagnosisConfig, aggregates: &'a EdgeAggregates, totals: [usize; 2]) -> Self {
        Self {
            config,
            aggregates,
            totals,
            oracle: None,
        }
    }

    /// Link structural mutations to their nearest originating clusters
    pub fn with_oracle(mut self, oracle: &'a dyn DistanceOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Classify every cluster, ascending by id
    pub fn classify_all(&self, infos: &BTreeMap<ClusterId, ClusterInfo>) -> Vec<Classification> {
        let mut classifications: Vec<Classification> =
            infos.values().map(|info| self.classify(info)).collect();

        let originating: Vec<ClusterId> = classifications
            .iter()
            .filter(|c| c.originating)
            .map(|c| c.cluster)
            .collect();
        if let Some(oracle) = self.oracle {
            for classification in classifications.iter_mut().filter(|c| c.is_structural()) {
                classification.originators = self.nearest_originators(
                    oracle,
                    classification.cluster,
                    &originating,
                );
            }
        }

        let count = |kind: MutationKind| {
            classifications
                .iter()
                .filter(|c| c.kinds().contains(&kind))
                .count()
        };
        info!(
            clusters = classifications.len(),
            structural = count(MutationKind::StructuralMutation),
            response_time = count(MutationKind::ResponseTimeChange),
            originating = count(MutationKind::OriginatingCluster),
            "Classified clusters"
        );
        classifications
    }

    /// Classify one cluster, without originator links
    pub fn classify(&self, info: &ClusterInfo) -> Classification {
        let structural = self.structural_diff(info);
        let response_time_cost = info.response_time_significant().then(|| {
            let baseline = info.stats(Snapshot::Baseline);
            let problem = info.stats(Snapshot::Problem);
            (problem.mean - baseline.mean).abs() * problem.frequency as f64
        });
        let originating = self.is_originating(info);

        debug!(
            cluster = info.id,
            structural = structural.is_some(),
            response_time = response_time_cost.is_some(),
            originating,
            "Classified cluster"
        );

        Classification {
            cluster: info.id,
            structural,
            response_time_cost,
            originating,
            originators: Vec::new(),
        }
    }

    /// Share of a snapshot's requests held by the cluster, in percent
    fn share(&self, info: &ClusterInfo, snapshot: Snapshot) -> f64 {
        let total = self.totals[snapshot.index()];
        if total == 0 {
            0.0
        } else {
            100.0 * info.frequency(snapshot) as f64 / total as f64
        }
    }

    fn is_originating(&self, info: &ClusterInfo) -> bool {
        if self.totals[Snapshot::Problem.index()] == 0 {
            return false;
        }
        let p1 = self.share(info, Snapshot::Problem);
        let p0 = self.share(info, Snapshot::Baseline);
        p1 >= self.config.mutation_threshold && p1 > p0
    }

    fn structural_diff(&self, info: &ClusterInfo) -> Option<StructuralDiff> {
        let f0 = info.frequency(Snapshot::Baseline);
        let f1 = info.frequency(Snapshot::Problem);
        let delta = self.config.edge_occurrence_delta;

        let differing: BTreeSet<String> = match (f0 > 0, f1 > 0) {
            (true, true) => {
                let e0 = info.edges_in(Snapshot::Baseline);
                let e1 = info.edges_in(Snapshot::Problem);
                let mut differing: BTreeSet<String> = e0
                    .symmetric_difference(&e1)
                    .map(|name| name.to_string())
                    .collect();
                for name in e0.intersection(&e1) {
                    let edge = &info.edges[*name];
                    let per0 = edge.per_request(Snapshot::Baseline, f0);
                    let per1 = edge.per_request(Snapshot::Problem, f1);
                    if (per0 - per1).abs() > delta {
                        differing.insert(name.to_string());
                    }
                }
                differing
            }
            (present0, present1) if present0 != present1 => {
                let (own, other) = if present0 {
                    (Snapshot::Baseline, Snapshot::Problem)
                } else {
                    (Snapshot::Problem, Snapshot::Baseline)
                };
                self.diff_against_aggregates(info, own, other)
            }
            _ => BTreeSet::new(),
        };

        if differing.is_empty() {
            return None;
        }
        let weighted_cost = differing
            .iter()
            .filter_map(|name| info.edges.get(name))
            .map(|edge| (edge.occurrences[0] + edge.occurrences[1]) as f64)
            .sum();
        Some(StructuralDiff {
            cost: differing.len() as f64,
            weighted_cost,
            differing_edges: differing.into_iter().collect(),
        })
    }

    /// Single-period cluster: compare its edges with everything the other
    /// period observed
    fn diff_against_aggregates(
        &self,
        info: &ClusterInfo,
        own: Snapshot,
        other: Snapshot,
    ) -> BTreeSet<String> {
        let other_total = self.totals[other.index()];
        if other_total == 0 {
            return BTreeSet::new();
        }
        let frequency = info.frequency(own);
        let other_edges = self.aggregates.edges_in(other);

        info.edges_in(own)
            .into_iter()
            .filter(|name| {
                if !other_edges.contains(name) {
                    return true;
                }
                let own_rate = info.edges[*name].per_request(own, frequency);
                let other_rate = self.aggregates.count(name, other) as f64 / other_total as f64;
                (own_rate - other_rate).abs() > self.config.edge_occurrence_delta
            })
            .map(str::to_string)
            .collect()
    }

    fn nearest_originators(
        &self,
        oracle: &dyn DistanceOracle,
        cluster: ClusterId,
        originating: &[ClusterId],
    ) -> Vec<ClusterId> {
        let candidates: Vec<(ClusterId, f64)> = originating
            .iter()
            .filter(|&&o| o != cluster)
            .filter_map(|&o| oracle.distance(cluster, o).map(|d| (o, d)))
            .collect();
        let Some(nearest) = candidates.iter().map(|(_, d)| *d).min_by(f64::total_cmp) else {
            return Vec::new();
        };

        let mut originators: Vec<ClusterId> = candidates
            .into_iter()
            .filter(|(_, d)| *d == nearest)
            .map(|(o, _)| o)
            .collect();
        originators.sort_unstable();
        if !self.config.dont_enforce_one_to_n {
            originators.truncate(1);
        }
        originators
    }
}
