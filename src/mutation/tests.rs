// Classification, unrolling and ranking tests over hand-built cluster statistics

use super::*;
use crate::cluster::{ClusterInfo, EdgeInfo, SnapshotStats};
use crate::config::DiagnosisConfig;
use crate::distance::DistanceMatrix;
use crate::hypothesis::{NotRunReason, StatisticalTest, TestOutcome};
use crate::store::EdgeAggregates;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

fn significant_test(mean: [f64; 2]) -> TestOutcome {
    TestOutcome::Completed(StatisticalTest {
        statistic: -9.0,
        p_value: 0.001,
        df: 8.0,
        mean,
        stddev: [1.0, 1.0],
        significant: true,
    })
}

fn not_run() -> TestOutcome {
    TestOutcome::NotRun {
        reason: NotRunReason::InsufficientSamples {
            baseline: 0,
            problem: 1,
            required: 5,
        },
    }
}

struct InfoBuilder {
    info: ClusterInfo,
}

impl InfoBuilder {
    fn new(id: usize, frequency: [usize; 2], totals: [usize; 2]) -> Self {
        let stats = |idx: usize| SnapshotStats {
            frequency: frequency[idx],
            probability: if totals[idx] == 0 {
                0.0
            } else {
                frequency[idx] as f64 / totals[idx] as f64
            },
            mean: 0.0,
            stddev: 0.0,
        };
        Self {
            info: ClusterInfo {
                id,
                representative: 1,
                members: Vec::new(),
                snapshots: [stats(0), stats(1)],
                response_time_test: Some(not_run()),
                edges: BTreeMap::new(),
                representative_edges: BTreeSet::new(),
                structure: None,
            },
        }
    }

    fn means(mut self, mean0: f64, mean1: f64) -> Self {
        self.info.snapshots[0].mean = mean0;
        self.info.snapshots[1].mean = mean1;
        self
    }

    fn significant(mut self) -> Self {
        let mean = [self.info.snapshots[0].mean, self.info.snapshots[1].mean];
        self.info.response_time_test = Some(significant_test(mean));
        self
    }

    fn edge(mut self, name: &str, occurrences: [usize; 2]) -> Self {
        self.info.edges.insert(
            name.to_string(),
            EdgeInfo {
                occurrences,
                mean: [10.0, 10.0],
                stddev: [0.0, 0.0],
                test: Some(not_run()),
            },
        );
        self.info.representative_edges.insert(name.to_string());
        self
    }

    fn build(self) -> ClusterInfo {
        self.info
    }
}

fn aggregates(text: &str) -> EdgeAggregates {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge_aggregates.dat");
    fs::write(&path, text).unwrap();
    EdgeAggregates::load(&path).unwrap()
}

fn infos(list: Vec<ClusterInfo>) -> BTreeMap<usize, ClusterInfo> {
    list.into_iter().map(|info| (info.id, info)).collect()
}

/// Three A->B baseline requests, one A->B->C problem request
fn scenario() -> (BTreeMap<usize, ClusterInfo>, EdgeAggregates) {
    let totals = [3, 1];
    let clusters = infos(vec![
        InfoBuilder::new(1, [3, 0], totals)
            .means(11.0, 0.0)
            .edge("A->B", [3, 0])
            .build(),
        InfoBuilder::new(2, [0, 1], totals)
            .means(0.0, 40.0)
            .edge("A->B", [0, 1])
            .edge("B->C", [0, 1])
            .build(),
    ]);
    (clusters, aggregates("A->B 11 3 15 1\nB->C 0 0 25 1\n"))
}

#[test]
fn test_scenario_new_edge_is_structural_and_originating() {
    let (infos, aggregates) = scenario();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [3, 1]).classify_all(&infos);

    let second = &classifications[1];
    assert_eq!(second.cluster, 2);
    let diff = second.structural.as_ref().unwrap();
    assert_eq!(diff.differing_edges, vec!["B->C"]);
    assert_eq!(diff.cost, 1.0);
    assert_eq!(diff.weighted_cost, 1.0);
    assert!(second.originating);
    assert_eq!(
        second.kinds(),
        vec![MutationKind::StructuralMutation, MutationKind::OriginatingCluster]
    );

    let first = &classifications[0];
    assert!(!first.is_interesting());
    assert_eq!(first.kinds(), vec![MutationKind::NotInteresting]);
}

#[test]
fn test_single_snapshot_store_has_no_structural_mutations() {
    let totals = [3, 0];
    let infos = infos(vec![InfoBuilder::new(1, [3, 0], totals)
        .edge("A->B", [3, 0])
        .build()]);
    let aggregates = aggregates("A->B 11 3 0 0\n");
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, totals).classify_all(&infos);

    assert!(!classifications[0].is_interesting());
}

#[test]
fn test_occurrence_delta_marks_edge_as_differing() {
    let totals = [10, 10];
    let infos = infos(vec![
        // A->B doubles per request, B->C is unchanged
        InfoBuilder::new(1, [4, 4], totals)
            .edge("A->B", [4, 8])
            .edge("B->C", [4, 4])
            .build(),
        InfoBuilder::new(2, [4, 4], totals)
            .edge("A->B", [4, 5])
            .build(),
    ]);
    let aggregates = aggregates("A->B 10 8 10 13\nB->C 10 4 10 4\n");
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, totals).classify_all(&infos);

    let diff = classifications[0].structural.as_ref().unwrap();
    assert_eq!(diff.differing_edges, vec!["A->B"]);
    assert_eq!(diff.weighted_cost, 12.0);
    assert!(classifications[1].structural.is_none());
}

#[test]
fn test_response_time_cost_scales_with_frequency() {
    let totals = [10, 10];
    let infos = infos(vec![InfoBuilder::new(1, [5, 4], totals)
        .means(10.0, 25.0)
        .significant()
        .edge("A->B", [5, 4])
        .build()]);
    let aggregates = aggregates("A->B 10 5 25 4\n");
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, totals).classify_all(&infos);

    assert_eq!(classifications[0].response_time_cost, Some(60.0));
    assert!(!classifications[0].is_structural());
}

#[test]
fn test_originating_requires_threshold_and_growth() {
    let totals = [100, 100];
    let infos = infos(vec![
        // 5% of the problem period: under the 10% threshold
        InfoBuilder::new(1, [0, 5], totals).build(),
        // Same share in both periods: not growing
        InfoBuilder::new(2, [20, 20], totals).build(),
        InfoBuilder::new(3, [10, 30], totals).build(),
    ]);
    let aggregates = EdgeAggregates::default();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, totals).classify_all(&infos);

    let originating: Vec<usize> = classifications
        .iter()
        .filter(|c| c.originating)
        .map(|c| c.cluster)
        .collect();
    assert_eq!(originating, vec![3]);
}

#[test]
fn test_unrolled_cluster_yields_two_independent_records() {
    let totals = [10, 10];
    let infos = infos(vec![InfoBuilder::new(7, [5, 5], totals)
        .means(10.0, 20.0)
        .significant()
        .edge("A->B", [5, 5])
        .edge("B->C", [0, 5])
        .build()]);
    let aggregates = aggregates("A->B 10 5 10 5\nB->C 0 0 10 5\n");
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, totals).classify_all(&infos);

    assert!(classifications[0].is_unrolled());
    let records = derive_records(&classifications[0], false);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].record_id(), "7_s");
    assert_eq!(records[0].cost, 1.0);
    assert_eq!(records[1].record_id(), "7_r");
    assert_eq!(records[1].cost, 50.0);
    assert!(records.iter().all(|r| r.cluster == 7));

    let weighted = derive_records(&classifications[0], true);
    assert_eq!(weighted[0].cost, 5.0);
    assert_eq!(weighted[1].cost, 50.0);
}

#[test]
fn test_single_kind_record_has_plain_id() {
    let (infos, aggregates) = scenario();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [3, 1]).classify_all(&infos);

    let records = derive_records(&classifications[1], false);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_id(), "2");
    assert!(derive_records(&classifications[0], false).is_empty());
}

fn structural(cluster: usize, cost: f64) -> Classification {
    Classification {
        cluster,
        structural: Some(StructuralDiff {
            differing_edges: vec!["X->Y".to_string()],
            cost,
            weighted_cost: cost * 10.0,
        }),
        response_time_cost: None,
        originating: false,
        originators: Vec::new(),
    }
}

#[test]
fn test_ranking_orders_by_cost_then_cluster_id() {
    let classifications = vec![
        structural(4, 2.0),
        structural(1, 1.0),
        structural(3, 2.0),
        structural(2, 5.0),
    ];
    let ranked = rank(RankingView::StructuralMutations, &classifications);
    let order: Vec<usize> = ranked.iter().map(|r| r.cluster).collect();
    assert_eq!(order, vec![2, 3, 4, 1]);

    // Stable across re-runs
    assert_eq!(ranked, rank(RankingView::StructuralMutations, &classifications));
}

#[test]
fn test_combined_view_mixes_both_kinds() {
    let mut both = structural(5, 3.0);
    both.response_time_cost = Some(4.0);
    let classifications = vec![structural(1, 3.5), both];

    let ranked = rank(RankingView::Combined, &classifications);
    let ids: Vec<String> = ranked.iter().map(MutationRecord::record_id).collect();
    assert_eq!(ids, vec!["5_r", "1", "5_s"]);

    let rt_only = rank(RankingView::ResponseTimeChanges, &classifications);
    assert_eq!(rt_only.len(), 1);
    assert_eq!(rt_only[0].record_id(), "5_r");
}

#[test]
fn test_informational_views_sort_by_id() {
    let mut origin = structural(9, 1.0);
    origin.structural = None;
    origin.originating = true;
    let mut quiet = structural(2, 1.0);
    quiet.structural = None;
    let mut quiet_too = structural(1, 1.0);
    quiet_too.structural = None;
    let classifications = vec![origin, quiet, quiet_too];

    let not_interesting = rank(RankingView::NotInteresting, &classifications);
    let ids: Vec<usize> = not_interesting.iter().map(|r| r.cluster).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(not_interesting
        .iter()
        .all(|r| r.kind == MutationKind::NotInteresting));

    let originating = rank(RankingView::OriginatingClusters, &classifications);
    assert_eq!(originating.len(), 1);
    assert_eq!(originating[0].cluster, 9);
}

#[test]
fn test_weighted_views_only_when_enabled() {
    assert_eq!(RankingView::enabled(false).len(), 5);
    assert!(!RankingView::enabled(false).contains(&RankingView::CombinedWeighted));
    assert_eq!(RankingView::enabled(true).len(), 7);
}

fn originator_fixture() -> (BTreeMap<usize, ClusterInfo>, EdgeAggregates) {
    let totals = [10, 10];
    let clusters = infos(vec![
        InfoBuilder::new(1, [0, 3], totals).build(),
        InfoBuilder::new(2, [0, 3], totals).build(),
        InfoBuilder::new(3, [5, 4], totals)
            .edge("A->B", [5, 4])
            .edge("B->C", [0, 4])
            .build(),
    ]);
    (clusters, aggregates("A->B 10 5 10 4\nB->C 0 0 10 4\n"))
}

#[test]
fn test_one_to_n_keeps_single_nearest_originator() {
    let (infos, aggregates) = originator_fixture();
    let oracle = DistanceMatrix::from_rows(vec![
        vec![0.0, 1.0, 2.0],
        vec![1.0, 0.0, 2.0],
        vec![2.0, 2.0, 0.0],
    ]);
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [10, 10])
        .with_oracle(&oracle)
        .classify_all(&infos);

    assert_eq!(classifications[2].originators, vec![1]);
    // Originators are linked only for structural mutations
    assert!(classifications[0].originators.is_empty());
}

#[test]
fn test_unenforced_one_to_n_lists_all_equally_near() {
    let (infos, aggregates) = originator_fixture();
    let oracle = DistanceMatrix::from_rows(vec![
        vec![0.0, 1.0, 2.0],
        vec![1.0, 0.0, 2.0],
        vec![2.0, 2.0, 0.0],
    ]);
    let config = DiagnosisConfig {
        dont_enforce_one_to_n: true,
        ..Default::default()
    };
    let classifications = Classifier::new(&config, &aggregates, [10, 10])
        .with_oracle(&oracle)
        .classify_all(&infos);

    assert_eq!(classifications[2].originators, vec![1, 2]);
}

#[test]
fn test_no_oracle_no_originators() {
    let (infos, aggregates) = originator_fixture();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [10, 10]).classify_all(&infos);
    assert!(classifications[2].is_structural());
    assert!(classifications[2].originators.is_empty());
}

#[test]
fn test_cluster_info_report_columns() {
    let (infos, aggregates) = scenario();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [3, 1]).classify_all(&infos);

    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.dat");
    let typed = dir.path().join("typed.dat");
    write_cluster_info(&plain, &infos, None).unwrap();
    write_cluster_info(&typed, &infos, Some(&classifications)).unwrap();

    let plain = fs::read_to_string(plain).unwrap();
    let lines: Vec<&str> = plain.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("# cluster "));
    assert!(!lines[0].contains("mutation_type"));
    assert_eq!(lines[1], "1 3 0 1.0000 0.0000 11.00 0.00 0.00 0.00 -");

    let typed = fs::read_to_string(typed).unwrap();
    assert!(typed.contains("mutation_type"));
    assert!(typed.contains("\n1 3 0 1.0000 0.0000 11.00 0.00 0.00 0.00 - not_interesting\n"));
    assert!(typed.ends_with(" - structural_mutation,originating_cluster\n"));
}

#[test]
fn test_cluster_info_json_is_valid() {
    let (infos, aggregates) = scenario();
    let config = DiagnosisConfig::default();
    let classifications = Classifier::new(&config, &aggregates, [3, 1]).classify_all(&infos);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster_info.json");
    write_cluster_info_json(&path, &infos, &classifications).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let clusters = value.as_array().unwrap();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[1]["id"], 2);
    assert_eq!(clusters[1]["classification"]["originating"], true);
}

#[test]
fn test_coverage_report_counts() {
    let totals = [10, 10];
    let infos = infos(vec![
        InfoBuilder::new(1, [5, 5], totals)
            .means(10.0, 20.0)
            .significant()
            .edge("A->B", [5, 5])
            .build(),
        InfoBuilder::new(2, [0, 1], totals).edge("B->C", [0, 1]).build(),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_coverage.dat");
    write_test_coverage(&path, &infos).unwrap();

    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "# subject run not_run significant\n\
response_time 1 1 1\n\
edge 0 2 0\n\
# not_run_count reason\n\
3 fewer than 5 samples in a period\n"
    );
}

#[test]
fn test_kind_labels() {
    assert_eq!(MutationKind::StructuralMutation.to_string(), "Structural mutation");
    assert_eq!(MutationKind::ResponseTimeChange.to_string(), "Response time change");
    assert_eq!(MutationKind::OriginatingCluster.tag(), "originating_cluster");
    assert_eq!(MutationKind::NotInteresting.unrolled_suffix(), None);
}
