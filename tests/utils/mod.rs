// Integration test utilities
//
// Helpers for writing snapshot files and clusterer output into a temporary
// directory.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// One request: local id and `(src, dest, latency)` edges in record order
pub struct Request<'a> {
    pub local_id: u64,
    pub edges: Vec<(&'a str, &'a str, f64)>,
}

impl<'a> Request<'a> {
    pub fn new(local_id: u64, edges: &[(&'a str, &'a str, f64)]) -> Self {
        Self {
            local_id,
            edges: edges.to_vec(),
        }
    }
}

/// Render requests in the snapshot text format
///
/// Each request's header latency is the sum of its edge latencies, except
/// when `totals` overrides it.
pub fn snapshot_text(requests: &[Request<'_>], totals: Option<&[f64]>) -> String {
    let mut out = String::from("# snapshot written by the test suite\n\n");
    for (idx, request) in requests.iter().enumerate() {
        let total = totals
            .and_then(|t| t.get(idx).copied())
            .unwrap_or_else(|| request.edges.iter().map(|(_, _, l)| l).sum());
        writeln!(out, "# {}  R: {}", request.local_id, total).unwrap();
        out.push_str("Digraph G {\n");

        let mut names: Vec<&str> = Vec::new();
        for (src, dest, _) in &request.edges {
            for name in [*src, *dest] {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        for (idx, name) in names.iter().enumerate() {
            writeln!(out, "{}.{} [label=\"{}\\nDEFAULT\"]", request.local_id, idx + 1, name).unwrap();
        }
        for (src, dest, latency) in &request.edges {
            let s = names.iter().position(|n| n == src).unwrap() + 1;
            let d = names.iter().position(|n| n == dest).unwrap() + 1;
            writeln!(
                out,
                "{}.{} -> {}.{} [label=\"R: {} us\"]",
                request.local_id, s, request.local_id, d, latency
            )
            .unwrap();
        }
        out.push_str("}\n\n");
    }
    out
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// The two-snapshot scenario: three `A->B` baseline requests (10, 12, 11)
/// and one `A->B->C` problem request (40)
pub fn write_scenario(dir: &Path) -> (PathBuf, PathBuf) {
    let baseline = snapshot_text(
        &[
            Request::new(1, &[("A", "B", 10.0)]),
            Request::new(2, &[("A", "B", 12.0)]),
            Request::new(3, &[("A", "B", 11.0)]),
        ],
        None,
    );
    let problem = snapshot_text(
        &[Request::new(1, &[("A", "B", 15.0), ("B", "C", 25.0)])],
        None,
    );
    (
        write_file(dir, "s0.dot", &baseline),
        write_file(dir, "s1.dot", &problem),
    )
}

/// Cluster 1 = global ids 1..=3 (`A->B`), cluster 2 = global id 4 (`A->B->C`)
///
/// The three identical baseline requests share one input vector.
pub fn write_scenario_clusters(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write_file(dir, "clusters.dat", "1\n2\n"),
        write_file(dir, "input_vectors.dat", "1 2 3\n4\n"),
    )
}
