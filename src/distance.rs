//! Structural distance between clusters
//!
//! Only used to link each structural mutation to the originating cluster it
//! most likely descends from. Two sources are supported: a precomputed
//! matrix (as produced alongside the clustering) and an edit distance over
//! the representatives' depth-first edge sequences.

use std::collections::BTreeMap;
use std::path::Path;

use crate::cluster::ClusterId;
use crate::error::{DiagnosisError, Result};
use crate::store::artifacts::{parse_field, read_fields};

/// Distance between two clusters, `None` when either is unknown
pub trait DistanceOracle: Send + Sync {
    fn distance(&self, a: ClusterId, b: ClusterId) -> Option<f64>;
}

/// Square matrix of pairwise distances, one-indexed by cluster id
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    rows: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// Load a whitespace-separated matrix; row i, column j is d(i, j)
    pub fn load(path: &Path) -> Result<Self> {
        let mut rows = Vec::new();
        for (line, fields) in read_fields(path)? {
            if fields.is_empty() {
                continue;
            }
            let row = fields
                .iter()
                .map(|field| parse_field(path, line, Some(field), "distance"))
                .collect::<Result<Vec<f64>>>()?;
            rows.push((line, row));
        }

        let n = rows.len();
        if let Some((line, row)) = rows.iter().find(|(_, row)| row.len() != n) {
            return Err(DiagnosisError::invalid_artifact(
                path,
                *line,
                format!("expected {} distances, found {}", n, row.len()),
            ));
        }
        Ok(Self {
            rows: rows.into_iter().map(|(_, row)| row).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DistanceOracle for DistanceMatrix {
    fn distance(&self, a: ClusterId, b: ClusterId) -> Option<f64> {
        let row = self.rows.get(a.checked_sub(1)?)?;
        row.get(b.checked_sub(1)?).copied()
    }
}

/// Edit distance over each cluster representative's edge-name sequence
#[derive(Debug, Clone, Default)]
pub struct EdgeSequenceDistance {
    sequences: BTreeMap<ClusterId, Vec<String>>,
}

impl EdgeSequenceDistance {
    pub fn new(sequences: impl IntoIterator<Item = (ClusterId, Vec<String>)>) -> Self {
        Self {
            sequences: sequences.into_iter().collect(),
        }
    }
}

impl DistanceOracle for EdgeSequenceDistance {
    fn distance(&self, a: ClusterId, b: ClusterId) -> Option<f64> {
        let left = self.sequences.get(&a)?;
        let right = self.sequences.get(&b)?;
        Some(edit_distance(left, right) as f64)
    }
}

/// Levenshtein distance with unit insert, delete and substitute costs
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitute = previous[j] + usize::from(x != y);
            current[j + 1] = substitute.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
