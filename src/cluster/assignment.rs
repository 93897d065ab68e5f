use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::{DiagnosisError, Result};
use crate::store::artifacts::{parse_field, read_fields};
use crate::store::{GlobalId, IdentityIndex};

/// Cluster identifier, the one-indexed line of the assignment file
pub type ClusterId = usize;

/// Input vector identifier, the one-indexed line of the input vector file
pub type InputVectorId = usize;

/// Cluster -> input vectors -> global ids, as emitted by the clusterer
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    clusters: Vec<Vec<InputVectorId>>,
    vectors: Vec<Vec<GlobalId>>,
}

impl ClusterAssignment {
    /// `clusters[i]` holds the input vectors of cluster `i + 1`,
    /// `vectors[j]` the global ids of input vector `j + 1`
    pub fn from_parts(clusters: Vec<Vec<InputVectorId>>, vectors: Vec<Vec<GlobalId>>) -> Self {
        Self { clusters, vectors }
    }

    /// Load the cluster assignment and input-vector mapping files
    ///
    /// Both files are positional, so blank lines are kept: a blank line in
    /// the cluster file is a cluster with no input vectors.
    pub fn load(clusters_path: &Path, vectors_path: &Path) -> Result<Self> {
        let clusters = load_id_lists(clusters_path, "input vector id")?;
        let vectors = load_id_lists(vectors_path, "global id")?;
        Ok(Self { clusters, vectors })
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// All cluster ids in ascending order
    pub fn cluster_ids(&self) -> RangeInclusive<ClusterId> {
        1..=self.clusters.len()
    }

    pub fn input_vectors(&self, cluster: ClusterId) -> Result<&[InputVectorId]> {
        cluster
            .checked_sub(1)
            .and_then(|idx| self.clusters.get(idx))
            .map(Vec::as_slice)
            .ok_or(DiagnosisError::UnknownCluster(cluster))
    }

    fn vector(&self, cluster: ClusterId, vector: InputVectorId) -> Result<&[GlobalId]> {
        vector
            .checked_sub(1)
            .and_then(|idx| self.vectors.get(idx))
            .map(Vec::as_slice)
            .ok_or(DiagnosisError::UnknownInputVector { cluster, vector })
    }

    /// Member global ids: the sorted union over the cluster's input vectors
    pub fn members(&self, cluster: ClusterId) -> Result<Vec<GlobalId>> {
        let mut members = BTreeSet::new();
        for &vector in self.input_vectors(cluster)? {
            members.extend(self.vector(cluster, vector)?.iter().copied());
        }
        if members.is_empty() {
            return Err(DiagnosisError::EmptyCluster(cluster));
        }
        Ok(members.into_iter().collect())
    }

    /// First global id of the cluster's first non-empty input vector
    pub fn representative(&self, cluster: ClusterId) -> Result<GlobalId> {
        for &vector in self.input_vectors(cluster)? {
            if let Some(&first) = self.vector(cluster, vector)?.first() {
                return Ok(first);
            }
        }
        Err(DiagnosisError::EmptyCluster(cluster))
    }

    /// Every referenced global id must exist in the identity index
    pub fn validate(&self, identity: &IdentityIndex) -> Result<()> {
        for cluster in self.cluster_ids() {
            for global_id in self.members(cluster)? {
                identity.resolve(global_id)?;
            }
        }
        Ok(())
    }
}

fn load_id_lists<T: std::str::FromStr>(path: &Path, what: &str) -> Result<Vec<Vec<T>>> {
    let mut rows = read_fields(path)?;
    // A trailing run of blank lines is formatting, not empty entries
    while rows.last().is_some_and(|(_, fields)| fields.is_empty()) {
        rows.pop();
    }
    rows.into_iter()
        .map(|(line, fields)| {
            fields
                .iter()
                .map(|field| parse_field(path, line, Some(field), what))
                .collect()
        })
        .collect()
}
