// Cluster resolution and per-cluster statistics
//
// Clusters arrive from an external clusterer in two files: cluster ->
// input vectors (one line per cluster) and input vector -> global ids (one
// line per input vector). A cluster's members are the union of its input
// vectors' global ids. The indirection exists because one feature vector
// may stand for several identical requests; downstream code depends on
// exactly this shape, so it is kept as is.
//
// `ClusterStatsEngine` turns every cluster into a `ClusterInfo`: per-period
// frequency, likelihood and response-time statistics, per-edge latency
// statistics, and the outcome of the hypothesis tests run over them.

mod assignment;
mod engine;
mod info;

pub use assignment::{ClusterAssignment, ClusterId, InputVectorId};
pub use engine::ClusterStatsEngine;
pub use info::{ClusterInfo, EdgeInfo, SnapshotStats};
