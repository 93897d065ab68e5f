use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::accessor::GraphAccessor;
use crate::cluster::{ClusterId, ClusterInfo};
use crate::error::{DiagnosisError, Result};
use crate::hypothesis::TestOutcome;
use crate::mutation::{rank, Classification, MutationKind, MutationRecord, RankingView};
use crate::store::artifacts::write_atomically;
use crate::store::Snapshot;

/// What an analysis run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub clusters: usize,
    pub structural: usize,
    pub response_time: usize,
    pub originating: usize,
    pub not_interesting: usize,
    /// Entries per rendered view
    pub views: BTreeMap<RankingView, usize>,
    pub written: Vec<PathBuf>,
}

impl ReportSummary {
    pub fn from_classifications(classifications: &[Classification]) -> Self {
        Self {
            clusters: classifications.len(),
            structural: classifications.iter().filter(|c| c.is_structural()).count(),
            response_time: classifications
                .iter()
                .filter(|c| c.is_response_time_change())
                .count(),
            originating: classifications.iter().filter(|c| c.originating).count(),
            not_interesting: classifications
                .iter()
                .filter(|c| !c.is_interesting())
                .count(),
            ..Default::default()
        }
    }
}

fn p_value_field(test: Option<&TestOutcome>) -> String {
    test.and_then(TestOutcome::p_value)
        .map(|p| format!("{:.4}", p))
        .unwrap_or_else(|| "-".to_string())
}

fn kinds_field(classification: &Classification) -> String {
    classification
        .kinds()
        .iter()
        .map(|kind| kind.tag())
        .collect::<Vec<_>>()
        .join(",")
}

/// Tabular per-cluster report, one line per cluster in id order
///
/// The mutation-type column is present only when classifications are given.
pub fn write_cluster_info(
    path: &Path,
    infos: &BTreeMap<ClusterId, ClusterInfo>,
    classifications: Option<&[Classification]>,
) -> Result<()> {
    let by_cluster: BTreeMap<ClusterId, &Classification> = classifications
        .unwrap_or_default()
        .iter()
        .map(|c| (c.cluster, c))
        .collect();

    write_atomically(path, |w| {
        write!(
            w,
            "# cluster s0_freq s1_freq s0_likelihood s1_likelihood s0_mean s1_mean s0_stddev s1_stddev rt_p_value"
        )?;
        if classifications.is_some() {
            write!(w, " mutation_type")?;
        }
        writeln!(w)?;

        for info in infos.values() {
            let s0 = info.stats(Snapshot::Baseline);
            let s1 = info.stats(Snapshot::Problem);
            write!(
                w,
                "{} {} {} {:.4} {:.4} {:.2} {:.2} {:.2} {:.2} {}",
                info.id,
                s0.frequency,
                s1.frequency,
                s0.probability,
                s1.probability,
                s0.mean,
                s1.mean,
                s0.stddev,
                s1.stddev,
                p_value_field(info.response_time_test.as_ref())
            )?;
            if classifications.is_some() {
                let kinds = by_cluster
                    .get(&info.id)
                    .map(|c| kinds_field(c))
                    .unwrap_or_else(|| "-".to_string());
                write!(w, " {}", kinds)?;
            }
            writeln!(w)?;
        }
        Ok(())
    })
}

#[derive(Serialize)]
struct ClusterReport<'a> {
    #[serde(flatten)]
    info: &'a ClusterInfo,
    classification: Option<&'a Classification>,
}

/// Machine-readable form of the cluster report
pub fn write_cluster_info_json(
    path: &Path,
    infos: &BTreeMap<ClusterId, ClusterInfo>,
    classifications: &[Classification],
) -> Result<()> {
    let reports: Vec<ClusterReport<'_>> = infos
        .values()
        .map(|info| ClusterReport {
            info,
            classification: classifications.iter().find(|c| c.cluster == info.id),
        })
        .collect();
    write_atomically(path, |w| {
        serde_json::to_writer_pretty(&mut *w, &reports)?;
        writeln!(w)
    })
}

#[derive(Debug, Default)]
struct Coverage {
    run: usize,
    not_run: usize,
    significant: usize,
}

impl Coverage {
    fn record(&mut self, outcome: &TestOutcome, reasons: &mut BTreeMap<String, usize>) {
        match outcome {
            TestOutcome::Completed(test) => {
                self.run += 1;
                if test.significant {
                    self.significant += 1;
                }
            }
            TestOutcome::NotRun { reason } => {
                self.not_run += 1;
                *reasons.entry(reason.to_string()).or_default() += 1;
            }
        }
    }
}

/// Totals of tests run, not run and significant, plus not-run reasons
pub fn write_test_coverage(path: &Path, infos: &BTreeMap<ClusterId, ClusterInfo>) -> Result<()> {
    let mut response_time = Coverage::default();
    let mut edges = Coverage::default();
    let mut reasons: BTreeMap<String, usize> = BTreeMap::new();

    for info in infos.values() {
        if let Some(outcome) = &info.response_time_test {
            response_time.record(outcome, &mut reasons);
        }
        for edge in info.edges.values() {
            if let Some(outcome) = &edge.test {
                edges.record(outcome, &mut reasons);
            }
        }
    }

    write_atomically(path, |w| {
        writeln!(w, "# subject run not_run significant")?;
        for (subject, coverage) in [("response_time", &response_time), ("edge", &edges)] {
            writeln!(
                w,
                "{} {} {} {}",
                subject, coverage.run, coverage.not_run, coverage.significant
            )?;
        }
        writeln!(w, "# not_run_count reason")?;
        for (reason, count) in &reasons {
            writeln!(w, "{} {}", count, reason)?;
        }
        Ok(())
    })
}

fn summary_lines(
    out: &mut String,
    view: RankingView,
    record: &MutationRecord,
    info: &ClusterInfo,
    classification: Option<&Classification>,
) -> std::fmt::Result {
    let s0 = info.stats(Snapshot::Baseline);
    let s1 = info.stats(Snapshot::Problem);

    writeln!(out, "# cluster {}: {}", record.record_id(), record.kind)?;
    if !view.is_informational() {
        writeln!(out, "# cost: {:.2}", record.cost)?;
    }
    writeln!(out, "# frequency: s0 {} / s1 {}", s0.frequency, s1.frequency)?;
    writeln!(
        out,
        "# likelihood: s0 {:.4} / s1 {:.4}",
        s0.probability, s1.probability
    )?;
    writeln!(
        out,
        "# response time: s0 {:.2} +/- {:.2} us / s1 {:.2} +/- {:.2} us (p: {})",
        s0.mean,
        s0.stddev,
        s1.mean,
        s1.stddev,
        p_value_field(info.response_time_test.as_ref())
    )?;
    if let Some(diff) = classification.and_then(|c| c.structural.as_ref()) {
        if record.kind == MutationKind::StructuralMutation {
            writeln!(out, "# differing edges: {}", diff.differing_edges.join(" "))?;
        }
    }
    if !record.originators.is_empty() {
        let originators: Vec<String> = record.originators.iter().map(|o| o.to_string()).collect();
        writeln!(out, "# originators: {}", originators.join(", "))?;
    }
    Ok(())
}

/// Render every entry of one view: summary comments followed by the
/// representative request with per-edge overlays
pub fn render_view(
    accessor: &GraphAccessor<'_>,
    view: RankingView,
    infos: &BTreeMap<ClusterId, ClusterInfo>,
    classifications: &[Classification],
) -> Result<(String, usize)> {
    let records = rank(view, classifications);
    let mut out = String::new();
    writeln!(out, "# {}: {} entries", view.title(), records.len())?;

    for record in &records {
        let info = infos
            .get(&record.cluster)
            .ok_or(DiagnosisError::UnknownCluster(record.cluster))?;
        let classification = classifications.iter().find(|c| c.cluster == record.cluster);

        out.push('\n');
        summary_lines(&mut out, view, record, info, classification)?;
        out.push_str(&accessor.get_annotated(info.representative, &info.annotations())?);
    }
    Ok((out, records.len()))
}

/// Render and write each view to its own file in `out_dir`, concurrently
pub fn write_views(
    accessor: &GraphAccessor<'_>,
    out_dir: &Path,
    views: &[RankingView],
    infos: &BTreeMap<ClusterId, ClusterInfo>,
    classifications: &[Classification],
) -> Result<Vec<(RankingView, PathBuf, usize)>> {
    let results = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = views
            .iter()
            .map(|&view| {
                scope.spawn(move |_| -> Result<(RankingView, PathBuf, usize)> {
                    let (text, entries) = render_view(accessor, view, infos, classifications)?;
                    let path = out_dir.join(view.file_name());
                    write_atomically(&path, |w| w.write_all(text.as_bytes()))?;
                    info!(entries, "Rendered {}", path.display());
                    Ok((view, path, entries))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(std::io::Error::other("view renderer panicked").into()))
            })
            .collect::<Vec<_>>()
    })
    .map_err(|_| std::io::Error::other("view renderer panicked"))?;

    results.into_iter().collect()
}
