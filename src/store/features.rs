//! Globally consistent edge-latency feature encoding
//!
//! Column 1 of every feature row is the request's own latency. Each distinct
//! edge name `"<src>-><dest>"` gets the next free column (2, 3, ...) the first
//! time any request of either snapshot uses it. Columns are append-only and
//! never renumbered, so a cell is `(<mean edge latency> <repeat count>)` at
//! the same position in every row. Requests that lack an edge carry a
//! `0 0` placeholder there.
//!
//! Encoding happens in two passes. [`FeatureEncoder::encode_row`] emits a
//! row that is gap-filled up to the highest column the request itself uses;
//! [`normalize_rows`] later pads every row to the final column count, which
//! is only known once the last request of the last snapshot was encoded.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;

use fnv::FnvHashMap;
use tracing::debug;

use crate::error::{DiagnosisError, Result};
use crate::store::artifacts::{open_input, parse_field, read_fields, write_atomically};
use crate::store::index::EdgeLatencySample;
use crate::store::Snapshot;

/// Column reserved for the request's own latency
pub const REQUEST_LATENCY_COLUMN: usize = 1;

/// First column handed out to an edge
pub const FIRST_EDGE_COLUMN: usize = 2;

/// One `(latency, repeat count)` cell
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureCell {
    pub latency: f64,
    pub count: u32,
}

/// A request's feature row before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub request_latency: f64,
    /// cells[i] belongs to column FIRST_EDGE_COLUMN + i
    pub cells: Vec<FeatureCell>,
}

impl FeatureRow {
    /// Number of logical columns, including the request-latency column
    pub fn column_count(&self) -> usize {
        REQUEST_LATENCY_COLUMN + self.cells.len()
    }
}

impl fmt::Display for FeatureRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request_latency)?;
        for cell in &self.cells {
            write!(f, " {} {}", cell.latency, cell.count)?;
        }
        Ok(())
    }
}

/// Average latency and occurrence count of one edge in one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotAggregate {
    pub total_latency: f64,
    pub count: u64,
}

impl SnapshotAggregate {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency / self.count as f64
        }
    }
}

/// Per-edge aggregate across both snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAggregate {
    pub name: String,
    pub column: usize,
    pub snapshots: [SnapshotAggregate; 2],
}

/// Sparse triplet `<column> <rank> <latency>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseTriplet {
    pub column: usize,
    pub rank: u64,
    pub latency: f64,
}

/// Stateful column allocator and aggregate collector
///
/// Requests must be fed in global id order for column numbers to be
/// reproducible.
#[derive(Debug, Default)]
pub struct FeatureEncoder {
    columns: FnvHashMap<String, usize>,
    /// aggregates[column - FIRST_EDGE_COLUMN]
    aggregates: Vec<EdgeAggregate>,
    triplets: [Vec<SparseTriplet>; 2],
}

impl FeatureEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column of an edge, allocating the next one on first sight
    pub fn column_for(&mut self, edge_name: &str) -> usize {
        if let Some(column) = self.columns.get(edge_name) {
            return *column;
        }
        let column = FIRST_EDGE_COLUMN + self.aggregates.len();
        self.columns.insert(edge_name.to_string(), column);
        self.aggregates.push(EdgeAggregate {
            name: edge_name.to_string(),
            column,
            snapshots: [SnapshotAggregate::default(); 2],
        });
        column
    }

    /// Total logical column count so far, including the request-latency column
    pub fn column_count(&self) -> usize {
        REQUEST_LATENCY_COLUMN + self.aggregates.len()
    }

    /// Encode one request, allocating columns in first-seen order
    ///
    /// The returned row is zero-filled from the first edge column up to the
    /// highest column this request uses.
    pub fn encode_row(&mut self, request_latency: f64, samples: &[EdgeLatencySample]) -> FeatureRow {
        let mut per_column: BTreeMap<usize, (f64, u32)> = BTreeMap::new();

        for sample in samples {
            let column = self.column_for(&sample.edge_name());
            let entry = per_column.entry(column).or_insert((0.0, 0));
            entry.0 += sample.latency;
            entry.1 += 1;

            let aggregate = &mut self.aggregates[column - FIRST_EDGE_COLUMN].snapshots
                [sample.snapshot.index()];
            aggregate.total_latency += sample.latency;
            aggregate.count += 1;

            // Rank counts every occurrence, zero latencies are simply not stored
            if sample.latency != 0.0 {
                self.triplets[sample.snapshot.index()].push(SparseTriplet {
                    column,
                    rank: aggregate.count,
                    latency: sample.latency,
                });
            }
        }

        let mut cells = Vec::new();
        for (column, (sum, count)) in per_column {
            while FIRST_EDGE_COLUMN + cells.len() < column {
                cells.push(FeatureCell::default());
            }
            cells.push(FeatureCell {
                latency: sum / count as f64,
                count,
            });
        }

        FeatureRow {
            request_latency,
            cells,
        }
    }

    /// Aggregates in column order
    pub fn aggregates(&self) -> &[EdgeAggregate] {
        &self.aggregates
    }

    pub fn triplets(&self, snapshot: Snapshot) -> &[SparseTriplet] {
        &self.triplets[snapshot.index()]
    }

    /// Write the `<column_number> <edge_name>` legend
    pub fn write_legend(&self, path: &Path) -> Result<()> {
        write_atomically(path, |w| {
            for aggregate in &self.aggregates {
                writeln!(w, "{} {}", aggregate.column, aggregate.name)?;
            }
            Ok(())
        })
    }

    /// Write the per-edge aggregate file
    pub fn write_aggregates(&self, path: &Path) -> Result<()> {
        write_atomically(path, |w| {
            for aggregate in &self.aggregates {
                let [s0, s1] = aggregate.snapshots;
                writeln!(
                    w,
                    "{} {} {} {} {}",
                    aggregate.name,
                    s0.average(),
                    s0.count,
                    s1.average(),
                    s1.count
                )?;
            }
            Ok(())
        })
    }

    /// Write one snapshot's sparse triplet file
    pub fn write_triplets(&self, snapshot: Snapshot, path: &Path) -> Result<()> {
        write_atomically(path, |w| {
            for triplet in &self.triplets[snapshot.index()] {
                writeln!(w, "{} {} {}", triplet.column, triplet.rank, triplet.latency)?;
            }
            Ok(())
        })
    }
}

/// Pad every unpadded row in `input` to `column_count` logical columns
///
/// Returns the number of rows written.
pub fn normalize_rows(input: &Path, output: &Path, column_count: usize) -> Result<usize> {
    let reader = open_input(input)?;
    let edge_columns = column_count.saturating_sub(REQUEST_LATENCY_COLUMN);
    let mut rows = 0usize;

    write_atomically(output, |w| {
        for line in reader.lines() {
            let line = line?;
            let fields = line.split_whitespace().count();
            if fields == 0 {
                continue;
            }
            let cells = (fields - REQUEST_LATENCY_COLUMN) / 2;
            if fields % 2 == 0 || cells > edge_columns {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("feature row {} has {} fields", rows + 1, fields),
                ));
            }
            write!(w, "{}", line.trim_end())?;
            for _ in cells..edge_columns {
                write!(w, " 0 0")?;
            }
            writeln!(w)?;
            rows += 1;
        }
        Ok(())
    })?;

    debug!(rows, column_count, "Normalized feature rows");
    Ok(rows)
}

/// Per-edge aggregates as loaded from disk, keyed by edge name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeAggregates {
    by_name: BTreeMap<String, [SnapshotAggregate; 2]>,
}

impl EdgeAggregates {
    pub fn from_encoder(encoder: &FeatureEncoder) -> Self {
        Self {
            by_name: encoder
                .aggregates()
                .iter()
                .map(|a| (a.name.clone(), a.snapshots))
                .collect(),
        }
    }

    /// Load `<edge_name> <s0_avg> <s0_count> <s1_avg> <s1_count>` lines
    pub fn load(path: &Path) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for (line, fields) in read_fields(path)? {
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 5 {
                return Err(DiagnosisError::invalid_artifact(
                    path,
                    line,
                    format!("expected 5 fields, found {}", fields.len()),
                ));
            }
            let mut snapshots = [SnapshotAggregate::default(); 2];
            for (idx, aggregate) in snapshots.iter_mut().enumerate() {
                let average: f64 = parse_field(path, line, fields.get(1 + idx * 2), "average latency")?;
                let count: u64 = parse_field(path, line, fields.get(2 + idx * 2), "count")?;
                *aggregate = SnapshotAggregate {
                    total_latency: average * count as f64,
                    count,
                };
            }
            by_name.insert(fields[0].clone(), snapshots);
        }
        Ok(Self { by_name })
    }

    /// Occurrence count of an edge in one snapshot (0 if never seen)
    pub fn count(&self, edge_name: &str, snapshot: Snapshot) -> u64 {
        self.by_name
            .get(edge_name)
            .map(|s| s[snapshot.index()].count)
            .unwrap_or(0)
    }

    /// Names of all edges observed at least once in a snapshot
    pub fn edges_in(&self, snapshot: Snapshot) -> HashSet<&str> {
        self.by_name
            .iter()
            .filter(|(_, s)| s[snapshot.index()].count > 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn get(&self, edge_name: &str) -> Option<&[SnapshotAggregate; 2]> {
        self.by_name.get(edge_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
