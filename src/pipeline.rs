// End-to-end index and analysis runs
//
// `build_index` turns one or two snapshot files into a trace store.
// `run_analysis` opens a store, resolves the clusterer's output, computes
// cluster statistics, classifies and ranks clusters, and writes every report
// and view into an output directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::accessor::GraphAccessor;
use crate::cluster::{ClusterAssignment, ClusterStatsEngine};
use crate::config::DiagnosisConfig;
use crate::decoder::DotTraceDecoder;
use crate::distance::{DistanceMatrix, DistanceOracle, EdgeSequenceDistance};
use crate::error::Result;
use crate::mutation::{
    write_cluster_info, write_cluster_info_json, write_test_coverage, write_views, Classifier,
    RankingView, ReportSummary,
};
use crate::store::{Snapshot, TraceStore};

pub const CLUSTER_INFO_FILE: &str = "cluster_info.dat";
pub const CLUSTER_INFO_JSON_FILE: &str = "cluster_info.json";
pub const TEST_COVERAGE_FILE: &str = "test_coverage.dat";

/// Input locations of an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisInputs {
    /// Directory of a built trace store
    pub store_dir: PathBuf,
    /// Cluster -> input vector assignment
    pub clusters: PathBuf,
    /// Input vector -> global id mapping
    pub input_vectors: PathBuf,
    /// Precomputed cluster distance matrix; edit distance when absent
    pub distances: Option<PathBuf>,
    pub out_dir: PathBuf,
}

/// Build a trace store from a baseline and an optional problem snapshot
pub fn build_index(
    snapshot0: &Path,
    snapshot1: Option<&Path>,
    out_dir: &Path,
) -> Result<TraceStore> {
    let mut files = vec![snapshot0.to_path_buf()];
    files.extend(snapshot1.map(Path::to_path_buf));
    TraceStore::build(&files, out_dir, &DotTraceDecoder)
}

/// Run the full diagnosis over a built store
pub fn run_analysis(inputs: &AnalysisInputs, config: &DiagnosisConfig) -> Result<ReportSummary> {
    config.validate()?;

    let store = TraceStore::open(&inputs.store_dir)?;
    store.ensure_loaded()?;
    let identity = store.identity()?;
    let totals = Snapshot::ALL.map(|s| identity.snapshot_total(s));

    let assignment = ClusterAssignment::load(&inputs.clusters, &inputs.input_vectors)?;
    assignment.validate(identity)?;
    info!(
        clusters = assignment.cluster_count(),
        baseline = totals[0],
        problem = totals[1],
        "Loaded cluster assignment"
    );

    let mut engine = ClusterStatsEngine::new(&store, &assignment, config.clone());
    let infos = engine.cluster_infos()?;

    let oracle: Box<dyn DistanceOracle> = match &inputs.distances {
        Some(path) => Box::new(DistanceMatrix::load(path)?),
        None => Box::new(EdgeSequenceDistance::new(
            infos.values().map(|info| (info.id, info.edge_sequence())),
        )),
    };
    let classifications = Classifier::new(config, store.edge_aggregates()?, totals)
        .with_oracle(oracle.as_ref())
        .classify_all(infos);

    let out_dir = &inputs.out_dir;
    fs::create_dir_all(out_dir)?;
    let mut summary = ReportSummary::from_classifications(&classifications);

    let cluster_info = out_dir.join(CLUSTER_INFO_FILE);
    write_cluster_info(&cluster_info, infos, Some(&classifications))?;
    let cluster_json = out_dir.join(CLUSTER_INFO_JSON_FILE);
    write_cluster_info_json(&cluster_json, infos, &classifications)?;
    let coverage = out_dir.join(TEST_COVERAGE_FILE);
    write_test_coverage(&coverage, infos)?;
    summary.written = vec![cluster_info, cluster_json, coverage];

    let accessor = GraphAccessor::new(&store);
    let views = RankingView::enabled(config.use_weighted_costs);
    for (view, path, entries) in write_views(&accessor, out_dir, &views, infos, &classifications)? {
        summary.views.insert(view, entries);
        summary.written.push(path);
    }

    info!(
        structural = summary.structural,
        response_time = summary.response_time,
        originating = summary.originating,
        "Analysis written to {}",
        out_dir.display()
    );
    Ok(summary)
}
