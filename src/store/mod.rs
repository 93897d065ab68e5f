//! Trace store and identity index
//!
//! Building a store scans each snapshot file once and writes:
//!
//! ```text
//! snapshot_files.dat            snapshot paths, snapshot 0 first
//! s{0,1}_offsets.dat            <local_id> <byte_offset>
//! global_ids_to_local_ids.dat   <global_id> <local_id> <snapshot>
//! input_vectors.dat             one feature row per global id, equal length
//! edge_columns.dat              <column_number> <edge_name>
//! edge_aggregates.dat           <edge_name> <s0_avg> <s0_count> <s1_avg> <s1_count>
//! s{0,1}_edge_latencies.mat     <column> <rank> <latency>
//! ```
//!
//! Snapshot files are scanned concurrently, one thread each, into disjoint
//! shards. Shards are then merged in snapshot order: global ids and feature
//! columns are allocated sequentially during the merge, so both are
//! identical from run to run.
//!
//! An opened store loads its indices lazily. Each loader is guarded by a
//! [`OnceLock`]; concurrent first access may load twice, and the loser's
//! copy is dropped.

pub mod artifacts;
pub mod features;
pub mod identity;
pub mod index;

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Serialize;
use tracing::info;

use crate::decoder::TraceDecoder;
use crate::error::{DiagnosisError, Result};

pub use artifacts::ArtifactLayout;
pub use features::{EdgeAggregates, FeatureEncoder, FeatureRow};
pub use identity::IdentityIndex;
pub use index::{scan_snapshot, EdgeLatencySample, SnapshotScan, TraceIndex};

/// Global request identifier, dense from 1 across both snapshots
pub type GlobalId = u64;

/// Request identifier within one snapshot file
pub type LocalId = u64;

/// One of the two captured periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Snapshot {
    /// Snapshot 0: the non-problem period
    Baseline,
    /// Snapshot 1: the problem period
    Problem,
}

impl Snapshot {
    pub const ALL: [Snapshot; 2] = [Snapshot::Baseline, Snapshot::Problem];

    pub fn index(self) -> usize {
        match self {
            Snapshot::Baseline => 0,
            Snapshot::Problem => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Snapshot::Baseline),
            1 => Some(Snapshot::Problem),
            _ => None,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Owner of the built identity index, offset indices and edge aggregates
#[derive(Debug)]
pub struct TraceStore {
    layout: ArtifactLayout,
    snapshot_files: Vec<PathBuf>,
    identity: OnceLock<IdentityIndex>,
    offsets: [OnceLock<TraceIndex>; 2],
    aggregates: OnceLock<EdgeAggregates>,
}

impl TraceStore {
    /// Scan one or two snapshot files and write every artifact into `out_dir`
    pub fn build(
        snapshot_files: &[PathBuf],
        out_dir: &Path,
        decoder: &dyn TraceDecoder,
    ) -> Result<Self> {
        if snapshot_files.is_empty() || snapshot_files.len() > Snapshot::ALL.len() {
            return Err(DiagnosisError::InvalidConfig(format!(
                "expected one or two snapshot files, got {}",
                snapshot_files.len()
            )));
        }
        fs::create_dir_all(out_dir)?;
        let layout = ArtifactLayout::new(out_dir);

        let scans = scan_all(snapshot_files, decoder)?;

        // Merge shards in snapshot order: global ids then feature columns
        let mut identity = IdentityIndex::new();
        let mut encoder = FeatureEncoder::new();
        let rows_tmp = layout.feature_rows_tmp();
        {
            let mut rows = BufWriter::new(File::create(&rows_tmp)?);
            for scan in &scans {
                for request in &scan.requests {
                    identity.assign(scan.snapshot, request.local_id)?;
                    let row = encoder.encode_row(request.latency, &request.edges);
                    writeln!(rows, "{}", row)?;
                }
            }
            rows.flush()?;
        }

        let column_count = encoder.column_count();
        features::normalize_rows(&rows_tmp, &layout.feature_matrix(), column_count)?;
        fs::remove_file(&rows_tmp)?;

        identity.write(&layout.identity())?;
        for scan in &scans {
            scan.index.write(&layout.offsets(scan.snapshot))?;
            encoder.write_triplets(scan.snapshot, &layout.sparse_latencies(scan.snapshot))?;
        }
        encoder.write_legend(&layout.edge_columns())?;
        encoder.write_aggregates(&layout.edge_aggregates())?;
        write_manifest(&layout.manifest(), snapshot_files)?;

        info!(
            requests = identity.len(),
            edge_columns = column_count - features::REQUEST_LATENCY_COLUMN,
            "Built trace store in {}",
            out_dir.display()
        );

        let aggregates = EdgeAggregates::from_encoder(&encoder);
        let mut offsets: [OnceLock<TraceIndex>; 2] = [OnceLock::new(), OnceLock::new()];
        for scan in scans {
            offsets[scan.snapshot.index()] = OnceLock::from(scan.index);
        }

        Ok(Self {
            layout,
            snapshot_files: snapshot_files.to_vec(),
            identity: OnceLock::from(identity),
            offsets,
            aggregates: OnceLock::from(aggregates),
        })
    }

    /// Open a previously built store; indices load on first use
    pub fn open(dir: &Path) -> Result<Self> {
        let layout = ArtifactLayout::new(dir);
        let snapshot_files = read_manifest(&layout.manifest())?;
        Ok(Self {
            layout,
            snapshot_files,
            identity: OnceLock::new(),
            offsets: [OnceLock::new(), OnceLock::new()],
            aggregates: OnceLock::new(),
        })
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Number of snapshots this store was built from
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_files.len()
    }

    /// Path of a snapshot file
    pub fn snapshot_file(&self, snapshot: Snapshot) -> Result<&Path> {
        self.snapshot_files
            .get(snapshot.index())
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                DiagnosisError::IdentityViolation(format!(
                    "store has no snapshot {} file",
                    snapshot
                ))
            })
    }

    /// Identity index, loaded on first use
    pub fn identity(&self) -> Result<&IdentityIndex> {
        if let Some(identity) = self.identity.get() {
            return Ok(identity);
        }
        let loaded = IdentityIndex::load(&self.layout.identity())?;
        Ok(self.identity.get_or_init(|| loaded))
    }

    /// Byte-offset index of one snapshot, loaded on first use
    pub fn trace_index(&self, snapshot: Snapshot) -> Result<&TraceIndex> {
        let slot = &self.offsets[snapshot.index()];
        if let Some(index) = slot.get() {
            return Ok(index);
        }
        let loaded = TraceIndex::load(&self.layout.offsets(snapshot))?;
        Ok(slot.get_or_init(|| loaded))
    }

    /// Per-edge aggregates, loaded on first use
    pub fn edge_aggregates(&self) -> Result<&EdgeAggregates> {
        if let Some(aggregates) = self.aggregates.get() {
            return Ok(aggregates);
        }
        let loaded = EdgeAggregates::load(&self.layout.edge_aggregates())?;
        Ok(self.aggregates.get_or_init(|| loaded))
    }

    /// Load every lazily-held index now
    ///
    /// Call before fanning out concurrent readers so no worker pays for the
    /// first load.
    pub fn ensure_loaded(&self) -> Result<()> {
        self.identity()?;
        for index in 0..self.snapshot_count() {
            if let Some(snapshot) = Snapshot::from_index(index) {
                self.trace_index(snapshot)?;
            }
        }
        self.edge_aggregates()?;
        Ok(())
    }
}

fn scan_all(snapshot_files: &[PathBuf], decoder: &dyn TraceDecoder) -> Result<Vec<SnapshotScan>> {
    let results = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = snapshot_files
            .iter()
            .zip(Snapshot::ALL)
            .map(|(path, snapshot)| scope.spawn(move |_| scan_snapshot(path, snapshot, decoder)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(std::io::Error::other("snapshot scan panicked").into()))
            })
            .collect::<Vec<_>>()
    })
    .map_err(|_| std::io::Error::other("snapshot scan panicked"))?;

    results.into_iter().collect()
}

fn write_manifest(path: &Path, snapshot_files: &[PathBuf]) -> Result<()> {
    artifacts::write_atomically(path, |w| {
        for file in snapshot_files {
            writeln!(w, "{}", file.display())?;
        }
        Ok(())
    })
}

fn read_manifest(path: &Path) -> Result<Vec<PathBuf>> {
    let reader = artifacts::open_input(path)?;
    let mut files = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            files.push(PathBuf::from(trimmed));
        }
    }
    if files.is_empty() || files.len() > Snapshot::ALL.len() {
        return Err(DiagnosisError::invalid_artifact(
            path,
            files.len(),
            "expected one or two snapshot files",
        ));
    }
    Ok(files)
}

#[cfg(test)]
mod tests;
