use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::accessor::GraphAccessor;
use crate::cluster::{ClusterAssignment, ClusterId, ClusterInfo, EdgeInfo, SnapshotStats};
use crate::config::DiagnosisConfig;
use crate::error::{DiagnosisError, Result};
use crate::graph::RequestStructure;
use crate::hypothesis::{describe, ComparisonId, HypothesisTester, WelchTester};
use crate::store::{GlobalId, Snapshot, TraceStore};

/// Raw per-cluster samples gathered by a worker, before any test runs
struct ClusterSamples {
    id: ClusterId,
    representative: GlobalId,
    members: Vec<GlobalId>,
    frequencies: [usize; 2],
    response_times: [Vec<f64>; 2],
    edge_latencies: BTreeMap<String, [Vec<f64>; 2]>,
    representative_edges: BTreeSet<String>,
    structure: Option<RequestStructure>,
}

/// Computes [`ClusterInfo`] for every cluster of an assignment
///
/// Results are computed once, on first access, and cached until
/// [`ClusterStatsEngine::clear`].
pub struct ClusterStatsEngine<'a> {
    accessor: GraphAccessor<'a>,
    assignment: &'a ClusterAssignment,
    config: DiagnosisConfig,
    workers: usize,
    cache: Option<BTreeMap<ClusterId, ClusterInfo>>,
}

impl<'a> ClusterStatsEngine<'a> {
    pub fn new(
        store: &'a TraceStore,
        assignment: &'a ClusterAssignment,
        config: DiagnosisConfig,
    ) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            accessor: GraphAccessor::new(store),
            assignment,
            config,
            workers,
            cache: None,
        }
    }

    /// Cap the number of worker threads used for sample gathering
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    /// Cluster statistics keyed by id, computed with [`WelchTester`] on first use
    pub fn cluster_infos(&mut self) -> Result<&BTreeMap<ClusterId, ClusterInfo>> {
        let infos = match self.cache.take() {
            Some(infos) => infos,
            None => {
                let mut tester = WelchTester::new(&self.config);
                self.compute(&mut tester)?
            }
        };
        Ok(self.cache.insert(infos))
    }

    /// Statistics of one cluster; an id outside the assignment is fatal
    pub fn cluster_info(&mut self, cluster: ClusterId) -> Result<&ClusterInfo> {
        self.cluster_infos()?
            .get(&cluster)
            .ok_or(DiagnosisError::UnknownCluster(cluster))
    }

    /// Drop cached statistics so the next access recomputes them
    pub fn clear(&mut self) {
        self.cache = None;
    }

    /// Gather samples for all clusters in parallel, then submit and run
    /// every comparison as one batch on `tester`
    pub fn compute(
        &self,
        tester: &mut dyn HypothesisTester,
    ) -> Result<BTreeMap<ClusterId, ClusterInfo>> {
        let store = self.accessor.store();
        store.ensure_loaded()?;
        let totals = {
            let identity = store.identity()?;
            Snapshot::ALL.map(|s| identity.snapshot_total(s))
        };

        let ids: Vec<ClusterId> = self.assignment.cluster_ids().collect();
        let samples = self.gather_all(&ids)?;

        // Barrier: every cluster is submitted before the batch executes
        for sample in &samples {
            let [rt0, rt1] = &sample.response_times;
            tester.submit(
                ComparisonId::response_time(sample.id),
                rt0.clone(),
                rt1.clone(),
            )?;
            for (edge, [l0, l1]) in &sample.edge_latencies {
                tester.submit(
                    ComparisonId::edge(sample.id, edge.clone()),
                    l0.clone(),
                    l1.clone(),
                )?;
            }
        }
        tester.execute()?;

        let infos: BTreeMap<ClusterId, ClusterInfo> = samples
            .into_iter()
            .map(|sample| (sample.id, build_info(sample, totals, &*tester)))
            .collect();

        info!(clusters = infos.len(), "Computed cluster statistics");
        Ok(infos)
    }

    fn gather_all(&self, ids: &[ClusterId]) -> Result<Vec<ClusterSamples>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = ids.len().div_ceil(self.workers.max(1));

        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|&id| self.gather(id))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(std::io::Error::other("cluster worker panicked").into())
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| std::io::Error::other("cluster worker panicked"))?;

        let mut samples = Vec::with_capacity(ids.len());
        for chunk in results {
            samples.extend(chunk?);
        }
        Ok(samples)
    }

    fn gather(&self, id: ClusterId) -> Result<ClusterSamples> {
        let members = self.assignment.members(id)?;
        let representative = self.assignment.representative(id)?;

        // One read per member yields its snapshot, header latency and edges
        let mut frequencies = [0usize; 2];
        let mut response_times: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
        let mut edge_latencies: BTreeMap<String, [Vec<f64>; 2]> = BTreeMap::new();
        let mut representative_edges = BTreeSet::new();
        let mut structure = None;
        for &member in &members {
            let graph = self.accessor.get_by_id(member)?;
            let idx = graph.record.snapshot.index();
            frequencies[idx] += 1;
            response_times[idx].push(graph.record.header.latency);

            let latencies = graph.edge_latencies();
            if member == representative {
                representative_edges = latencies.keys().cloned().collect();
                structure = graph.structure().ok();
            }
            for (edge, samples) in latencies {
                edge_latencies.entry(edge).or_default()[idx].extend(samples);
            }
        }

        debug!(
            cluster = id,
            members = members.len(),
            edges = edge_latencies.len(),
            "Gathered cluster samples"
        );

        Ok(ClusterSamples {
            id,
            representative,
            members,
            frequencies,
            response_times,
            edge_latencies,
            representative_edges,
            structure,
        })
    }
}

fn build_info(
    sample: ClusterSamples,
    totals: [usize; 2],
    tester: &dyn HypothesisTester,
) -> ClusterInfo {
    let snapshots = Snapshot::ALL.map(|s| {
        let idx = s.index();
        let frequency = sample.frequencies[idx];
        let (mean, stddev) = describe(&sample.response_times[idx]);
        SnapshotStats {
            frequency,
            probability: if totals[idx] == 0 {
                0.0
            } else {
                frequency as f64 / totals[idx] as f64
            },
            mean,
            stddev,
        }
    });

    let edges = sample
        .edge_latencies
        .into_iter()
        .map(|(name, latencies)| {
            let (m0, s0) = describe(&latencies[0]);
            let (m1, s1) = describe(&latencies[1]);
            let test = tester
                .result(&ComparisonId::edge(sample.id, name.clone()))
                .cloned();
            let edge = EdgeInfo {
                occurrences: [latencies[0].len(), latencies[1].len()],
                mean: [m0, m1],
                stddev: [s0, s1],
                test,
            };
            (name, edge)
        })
        .collect();

    ClusterInfo {
        id: sample.id,
        representative: sample.representative,
        members: sample.members,
        snapshots,
        response_time_test: tester
            .result(&ComparisonId::response_time(sample.id))
            .cloned(),
        edges,
        representative_edges: sample.representative_edges,
        structure: sample.structure,
    }
}
