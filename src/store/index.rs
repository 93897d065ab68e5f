//! Per-snapshot byte-offset index and the single forward scan that builds it
//!
//! The scan reads a snapshot file line by line, tracking the byte offset of
//! every line. A line matching the request header pattern opens a record;
//! the record's text runs until the terminator line. Lines outside a record
//! are decoration and are skipped without comment.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::decoder::{is_terminator, parse_header, RequestHeader, TraceDecoder};
use crate::error::{DiagnosisError, Result};
use crate::store::artifacts::{open_input, parse_field, read_fields, write_atomically};
use crate::store::{LocalId, Snapshot};

/// Mapping LocalId -> byte offset of the record's header line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceIndex {
    offsets: HashMap<LocalId, u64>,
}

impl TraceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the offset of a local id; returns false if it was already present
    pub fn insert(&mut self, local_id: LocalId, offset: u64) -> bool {
        match self.offsets.entry(local_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(offset);
                true
            }
        }
    }

    pub fn offset(&self, local_id: LocalId) -> Option<u64> {
        self.offsets.get(&local_id).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Write `<local_id> <byte_offset>` lines in ascending local id order
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<_> = self.offsets.iter().collect();
        entries.sort();
        write_atomically(path, |w| {
            for (local, offset) in entries {
                writeln!(w, "{} {}", local, offset)?;
            }
            Ok(())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut index = Self::new();
        for (line, fields) in read_fields(path)? {
            if fields.is_empty() {
                continue;
            }
            let local: LocalId = parse_field(path, line, fields.first(), "local id")?;
            let offset: u64 = parse_field(path, line, fields.get(1), "byte offset")?;
            if !index.insert(local, offset) {
                return Err(DiagnosisError::invalid_artifact(
                    path,
                    line,
                    format!("duplicate local id {}", local),
                ));
            }
        }
        Ok(index)
    }
}

/// One edge latency observed while scanning a request
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLatencySample {
    pub src: String,
    pub dest: String,
    pub latency: f64,
    pub snapshot: Snapshot,
}

impl EdgeLatencySample {
    /// `"<src>-><dest>"`
    pub fn edge_name(&self) -> String {
        format!("{}->{}", self.src, self.dest)
    }
}

/// A request as seen by the scan: header fields plus its edge samples
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRequest {
    pub local_id: LocalId,
    pub latency: f64,
    pub edges: Vec<EdgeLatencySample>,
}

/// Shard produced by scanning one snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotScan {
    pub snapshot: Snapshot,
    pub index: TraceIndex,
    /// Requests in file order
    pub requests: Vec<ScannedRequest>,
}

struct OpenRecord {
    header: RequestHeader,
    offset: u64,
    line: usize,
    text: String,
}

/// Scan one snapshot file sequentially
///
/// Must stay single-threaded within a file: offsets and request order are
/// both position-dependent.
pub fn scan_snapshot(
    path: &Path,
    snapshot: Snapshot,
    decoder: &dyn TraceDecoder,
) -> Result<SnapshotScan> {
    let mut reader = open_input(path)?;
    let mut scan = SnapshotScan {
        snapshot,
        index: TraceIndex::new(),
        requests: Vec::new(),
    };

    let finish = |record: OpenRecord, scan: &mut SnapshotScan| -> Result<()> {
        if !scan.index.insert(record.header.local_id, record.offset) {
            return Err(DiagnosisError::invalid_artifact(
                path,
                record.line,
                format!("duplicate local id {}", record.header.local_id),
            ));
        }
        let decoded = decoder.decode(&record.text);
        let edges = decoded
            .edges
            .iter()
            .map(|edge| EdgeLatencySample {
                src: decoded.node_name(&edge.src).to_string(),
                dest: decoded.node_name(&edge.dest).to_string(),
                latency: edge.latency,
                snapshot,
            })
            .collect();
        scan.requests.push(ScannedRequest {
            local_id: record.header.local_id,
            latency: record.header.latency,
            edges,
        });
        Ok(())
    };

    let mut current: Option<OpenRecord> = None;
    let mut offset = 0u64;
    let mut line_no = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        if let Some(header) = parse_header(&line) {
            if let Some(record) = current.take() {
                finish(record, &mut scan)?;
            }
            current = Some(OpenRecord {
                header,
                offset,
                line: line_no,
                text: line.clone(),
            });
        } else if let Some(record) = current.as_mut() {
            record.text.push_str(&line);
            if is_terminator(&line) {
                if let Some(record) = current.take() {
                    finish(record, &mut scan)?;
                }
            }
        }

        offset += read as u64;
    }

    if let Some(record) = current.take() {
        finish(record, &mut scan)?;
    }

    info!(
        snapshot = %snapshot,
        requests = scan.requests.len(),
        bytes = offset,
        "Scanned snapshot {}",
        path.display()
    );
    debug!(
        edges = scan.requests.iter().map(|r| r.edges.len()).sum::<usize>(),
        "Decoded edge samples"
    );

    Ok(scan)
}
