// Store build tests
//
// Two small snapshots: three A->B requests in the baseline, one A->B->C
// request in the problem period.

use super::*;
use crate::decoder::DotTraceDecoder;
use std::fs;

const BASELINE: &str = "# Baseline capture\n\
# 1  R: 10\n\
Digraph G {\n\
1.1 [label=\"A\"]\n\
1.2 [label=\"B\"]\n\
1.1 -> 1.2 [label=\"R: 10 us\"]\n\
}\n\
# 2  R: 12\n\
Digraph G {\n\
2.1 [label=\"A\"]\n\
2.2 [label=\"B\"]\n\
2.1 -> 2.2 [label=\"R: 12 us\"]\n\
}\n\
# 3  R: 11\n\
Digraph G {\n\
3.1 [label=\"A\"]\n\
3.2 [label=\"B\"]\n\
3.1 -> 3.2 [label=\"R: 11 us\"]\n\
}\n";

const PROBLEM: &str = "# 1  R: 40\n\
Digraph G {\n\
1.1 [label=\"A\"]\n\
1.2 [label=\"B\"]\n\
1.3 [label=\"C\"]\n\
1.1 -> 1.2 [label=\"R: 15 us\"]\n\
1.2 -> 1.3 [label=\"R: 25 us\"]\n\
}\n";

fn write_snapshots(dir: &Path) -> Vec<PathBuf> {
    let s0 = dir.join("s0.dot");
    let s1 = dir.join("s1.dot");
    fs::write(&s0, BASELINE).unwrap();
    fs::write(&s1, PROBLEM).unwrap();
    vec![s0, s1]
}

#[test]
fn test_build_assigns_baseline_ids_first() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let store = TraceStore::build(&files, &dir.path().join("store"), &DotTraceDecoder).unwrap();

    let identity = store.identity().unwrap();
    assert_eq!(identity.len(), 4);
    assert_eq!(identity.snapshot_range(Snapshot::Baseline), 1..=3);
    assert_eq!(identity.snapshot_range(Snapshot::Problem), 4..=4);
    assert_eq!(identity.resolve(4).unwrap(), (1, Snapshot::Problem));
}

#[test]
fn test_build_writes_feature_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let out = dir.path().join("store");
    TraceStore::build(&files, &out, &DotTraceDecoder).unwrap();

    let layout = ArtifactLayout::new(&out);
    assert_eq!(
        fs::read_to_string(layout.feature_matrix()).unwrap(),
        "10 10 1 0 0\n12 12 1 0 0\n11 11 1 0 0\n40 15 1 25 1\n"
    );
    assert_eq!(
        fs::read_to_string(layout.edge_columns()).unwrap(),
        "2 A->B\n3 B->C\n"
    );
    assert_eq!(
        fs::read_to_string(layout.edge_aggregates()).unwrap(),
        "A->B 11 3 15 1\nB->C 0 0 25 1\n"
    );
    assert_eq!(
        fs::read_to_string(layout.sparse_latencies(Snapshot::Baseline)).unwrap(),
        "2 1 10\n2 2 12\n2 3 11\n"
    );
    assert_eq!(
        fs::read_to_string(layout.identity()).unwrap(),
        "1 1 0\n2 2 0\n3 3 0\n4 1 1\n"
    );
    assert!(!layout.feature_rows_tmp().exists());
}

#[test]
fn test_build_offsets_point_at_headers() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let store = TraceStore::build(&files, &dir.path().join("store"), &DotTraceDecoder).unwrap();

    let index = store.trace_index(Snapshot::Baseline).unwrap();
    for local in 1..=3u64 {
        let offset = index.offset(local).unwrap() as usize;
        assert!(BASELINE[offset..].starts_with(&format!("# {}", local)));
    }
}

#[test]
fn test_build_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    TraceStore::build(&files, &first, &DotTraceDecoder).unwrap();
    TraceStore::build(&files, &second, &DotTraceDecoder).unwrap();

    for entry in fs::read_dir(&first).unwrap() {
        let name = entry.unwrap().file_name();
        assert_eq!(
            fs::read(first.join(&name)).unwrap(),
            fs::read(second.join(&name)).unwrap(),
            "artifact {:?} differs",
            name
        );
    }
}

#[test]
fn test_open_loads_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let out = dir.path().join("store");
    let built = TraceStore::build(&files, &out, &DotTraceDecoder).unwrap();

    let opened = TraceStore::open(&out).unwrap();
    assert_eq!(opened.snapshot_count(), 2);
    assert_eq!(opened.identity().unwrap(), built.identity().unwrap());
    assert_eq!(
        opened.trace_index(Snapshot::Problem).unwrap(),
        built.trace_index(Snapshot::Problem).unwrap()
    );
    assert_eq!(
        opened.edge_aggregates().unwrap(),
        built.edge_aggregates().unwrap()
    );
    opened.ensure_loaded().unwrap();
    opened.ensure_loaded().unwrap();
}

#[test]
fn test_single_snapshot_store() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_snapshots(dir.path());
    let store =
        TraceStore::build(&files[..1], &dir.path().join("store"), &DotTraceDecoder).unwrap();

    assert_eq!(store.snapshot_count(), 1);
    assert_eq!(store.identity().unwrap().snapshot_total(Snapshot::Problem), 0);
    assert!(store.snapshot_file(Snapshot::Problem).is_err());
}

#[test]
fn test_missing_snapshot_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![dir.path().join("missing.dot")];
    let err = TraceStore::build(&files, &dir.path().join("store"), &DotTraceDecoder).unwrap_err();
    assert!(matches!(err, DiagnosisError::MissingInput { .. }));
}

#[test]
fn test_too_many_snapshots_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut files = write_snapshots(dir.path());
    files.push(files[0].clone());
    assert!(TraceStore::build(&files, &dir.path().join("store"), &DotTraceDecoder).is_err());
}
