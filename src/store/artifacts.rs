//! Artifact file layout and IO helpers
//!
//! Every artifact is written to a `.tmp` sibling and renamed into place once
//! complete, so an aborted run never leaves a truncated artifact behind.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DiagnosisError, Result};
use crate::store::Snapshot;

/// Names of the files a built trace store consists of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file paths, one per line, snapshot 0 first
    pub fn manifest(&self) -> PathBuf {
        self.dir.join("snapshot_files.dat")
    }

    /// `<local_id> <byte_offset>` per request of one snapshot
    pub fn offsets(&self, snapshot: Snapshot) -> PathBuf {
        self.dir.join(format!("s{}_offsets.dat", snapshot.index()))
    }

    /// `<global_id> <local_id> <snapshot>`
    pub fn identity(&self) -> PathBuf {
        self.dir.join("global_ids_to_local_ids.dat")
    }

    /// Normalized feature matrix, one row per global id
    pub fn feature_matrix(&self) -> PathBuf {
        self.dir.join("input_vectors.dat")
    }

    /// Unpadded feature rows written during the scan
    pub fn feature_rows_tmp(&self) -> PathBuf {
        self.dir.join("input_vectors.unpadded")
    }

    /// `<column_number> <edge_name>`
    pub fn edge_columns(&self) -> PathBuf {
        self.dir.join("edge_columns.dat")
    }

    /// `<edge_name> <s0_avg> <s0_count> <s1_avg> <s1_count>`
    pub fn edge_aggregates(&self) -> PathBuf {
        self.dir.join("edge_aggregates.dat")
    }

    /// MATLAB-style sparse triplets `<column> <rank> <latency>`
    pub fn sparse_latencies(&self, snapshot: Snapshot) -> PathBuf {
        self.dir.join(format!("s{}_edge_latencies.mat", snapshot.index()))
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path` through a temporary sibling and rename on success
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let tmp = tmp_sibling(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
        Ok::<(), std::io::Error>(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Open a required input file, mapping failure to [`DiagnosisError::MissingInput`]
pub fn open_input(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| DiagnosisError::MissingInput {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a whitespace-separated artifact as `(line_number, fields)` pairs
///
/// Blank lines are kept (as empty field lists) so that line numbers keep
/// their meaning for one-indexed inputs like the cluster assignment.
pub fn read_fields(path: &Path) -> Result<Vec<(usize, Vec<String>)>> {
    let reader = open_input(path)?;
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let fields = line.split_whitespace().map(str::to_string).collect();
        rows.push((idx + 1, fields));
    }
    Ok(rows)
}

/// Parse one field of an artifact line
pub fn parse_field<T: std::str::FromStr>(
    path: &Path,
    line: usize,
    field: Option<&String>,
    what: &str,
) -> Result<T> {
    let raw = field.ok_or_else(|| DiagnosisError::invalid_artifact(path, line, format!("missing {}", what)))?;
    raw.parse()
        .map_err(|_| DiagnosisError::invalid_artifact(path, line, format!("invalid {} '{}'", what, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_write_atomically_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dat");
        write_atomically(&path, |w| writeln!(w, "1 2 3")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1 2 3\n");
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn test_write_atomically_failure_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dat");
        fs::write(&path, "old\n").unwrap();

        let result = write_atomically(&path, |w| {
            writeln!(w, "partial")?;
            Err(std::io::Error::other("boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn test_open_input_missing() {
        let err = open_input(Path::new("/nonexistent/snapshot.dot")).unwrap_err();
        assert!(matches!(err, DiagnosisError::MissingInput { .. }));
    }

    #[test]
    fn test_read_fields_keeps_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1 2\n\n3\n").unwrap();
        let rows = read_fields(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], (1, vec!["1".to_string(), "2".to_string()]));
        assert!(rows[1].1.is_empty());
        assert_eq!(rows[2].0, 3);
    }
}
