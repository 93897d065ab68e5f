//! Random access to individual request graphs by global id
//!
//! A [`GraphAccessor`] borrows a [`TraceStore`], resolves a global id to its
//! local id and snapshot, seeks to the record's byte offset and reads
//! exactly one record. Reads are independent, so any number of threads may
//! share one accessor once the store's indices are loaded.

mod overlay;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

use crate::decoder::{
    is_terminator, parse_header, DecodedRequest, DotTraceDecoder, RequestHeader, TraceDecoder,
};
use crate::error::{DiagnosisError, Result};
use crate::graph::RequestStructure;
use crate::store::artifacts::open_input;
use crate::store::{GlobalId, LocalId, Snapshot, TraceStore};

pub use overlay::{overlay_annotations, EdgeAnnotation};

/// Raw text of one request record plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub global_id: GlobalId,
    pub local_id: LocalId,
    pub snapshot: Snapshot,
    pub offset: u64,
    pub header: RequestHeader,
    pub text: String,
}

/// A record together with its decoded nodes and edges
#[derive(Debug, Clone, PartialEq)]
pub struct RequestGraph {
    pub record: RequestRecord,
    pub decoded: DecodedRequest,
}

impl RequestGraph {
    /// Tree structure, or `MalformedRequest` when the record has no edges
    pub fn structure(&self) -> Result<RequestStructure> {
        RequestStructure::from_decoded(&self.decoded).ok_or_else(|| {
            DiagnosisError::MalformedRequest {
                global_id: self.record.global_id,
                reason: "no edges found".to_string(),
            }
        })
    }

    /// Edge name -> latencies in record order
    ///
    /// Repeated edges (fan-out, loops) share one key.
    pub fn edge_latencies(&self) -> BTreeMap<String, Vec<f64>> {
        let mut latencies: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for edge in &self.decoded.edges {
            latencies
                .entry(self.decoded.edge_name(edge))
                .or_default()
                .push(edge.latency);
        }
        latencies
    }
}

/// A snapshot reader positioned just past a verified header line
struct SeekedRecord {
    reader: BufReader<File>,
    local_id: LocalId,
    snapshot: Snapshot,
    offset: u64,
    header: RequestHeader,
    header_line: String,
}

/// Reader over the snapshot files of a [`TraceStore`]
pub struct GraphAccessor<'a> {
    store: &'a TraceStore,
    decoder: &'a dyn TraceDecoder,
}

impl<'a> GraphAccessor<'a> {
    /// Accessor using the default [`DotTraceDecoder`]
    pub fn new(store: &'a TraceStore) -> Self {
        Self {
            store,
            decoder: &DotTraceDecoder,
        }
    }

    pub fn with_decoder(store: &'a TraceStore, decoder: &'a dyn TraceDecoder) -> Self {
        Self { store, decoder }
    }

    pub fn store(&self) -> &'a TraceStore {
        self.store
    }

    /// Seek to a request and verify its header
    fn seek_record(&self, global_id: GlobalId) -> Result<SeekedRecord> {
        let (local_id, snapshot) = self.store.identity()?.resolve(global_id)?;
        let offset = self
            .store
            .trace_index(snapshot)?
            .offset(local_id)
            .ok_or(DiagnosisError::UnknownLocalId { snapshot, local_id })?;

        let mut reader = open_input(self.store.snapshot_file(snapshot)?)?;
        reader.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        let header = parse_header(&line).ok_or_else(|| DiagnosisError::MalformedRequest {
            global_id,
            reason: format!("no request header at offset {}", offset),
        })?;
        if header.local_id != local_id {
            return Err(DiagnosisError::LocalIdMismatch {
                snapshot,
                offset,
                expected: local_id,
                found: header.local_id,
            });
        }

        Ok(SeekedRecord {
            reader,
            local_id,
            snapshot,
            offset,
            header,
            header_line: line,
        })
    }

    /// Read exactly one record, up to and including its terminator
    pub fn read_record(&self, global_id: GlobalId) -> Result<RequestRecord> {
        let SeekedRecord {
            mut reader,
            local_id,
            snapshot,
            offset,
            header,
            header_line: mut text,
        } = self.seek_record(global_id)?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 || parse_header(&line).is_some() {
                break;
            }
            text.push_str(&line);
            if is_terminator(&line) {
                break;
            }
        }

        Ok(RequestRecord {
            global_id,
            local_id,
            snapshot,
            offset,
            header,
            text,
        })
    }

    /// Read and decode one request
    pub fn get_by_id(&self, global_id: GlobalId) -> Result<RequestGraph> {
        let record = self.read_record(global_id)?;
        let decoded = self.decoder.decode(&record.text);
        Ok(RequestGraph { record, decoded })
    }

    /// Tree structure of one request; fatal if it has no edges
    pub fn get_structure(&self, global_id: GlobalId) -> Result<RequestStructure> {
        self.get_by_id(global_id)?.structure()
    }

    /// Edge name -> ordered latencies of one request
    pub fn get_edge_latencies(&self, global_id: GlobalId) -> Result<BTreeMap<String, Vec<f64>>> {
        Ok(self.get_by_id(global_id)?.edge_latencies())
    }

    /// Total latency of one request, taken from its header
    ///
    /// Only the header line is read, so records without edges are fine here.
    pub fn get_response_time(&self, global_id: GlobalId) -> Result<f64> {
        Ok(self.seek_record(global_id)?.header.latency)
    }

    /// Response times of many requests, split by snapshot
    pub fn get_response_times_by_global_ids(&self, ids: &[GlobalId]) -> Result<[Vec<f64>; 2]> {
        let identity = self.store.identity()?;
        let mut times: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
        for &id in ids {
            let snapshot = identity.snapshot_of(id)?;
            times[snapshot.index()].push(self.get_response_time(id)?);
        }
        Ok(times)
    }

    /// `(snapshot 0 count, snapshot 1 count)` of a set of requests
    pub fn get_snapshot_frequencies(&self, ids: &[GlobalId]) -> Result<(usize, usize)> {
        let identity = self.store.identity()?;
        let mut counts = [0usize; 2];
        for &id in ids {
            counts[identity.snapshot_of(id)?.index()] += 1;
        }
        Ok((counts[0], counts[1]))
    }

    /// Raw text of one request with per-edge annotations substituted in
    pub fn get_annotated(
        &self,
        global_id: GlobalId,
        annotations: &BTreeMap<String, EdgeAnnotation>,
    ) -> Result<String> {
        let record = self.read_record(global_id)?;
        overlay_annotations(&record.text, annotations)
    }
}
