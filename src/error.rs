//! Error taxonomy for indexing, graph access and cluster diagnosis
//!
//! Every variant here is fatal for the run: downstream global-id and
//! feature-column invariants are global, so no partial output is safe.
//! Statistical degradation (too few samples) is not an error; it is
//! recorded as [`crate::hypothesis::TestOutcome::NotRun`].

use std::path::PathBuf;
use thiserror::Error;

use crate::store::Snapshot;

/// Errors raised by the diagnosis pipeline
#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("Required input {path} is missing or unreadable: {source}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to format report text: {0}")]
    Format(#[from] std::fmt::Error),

    #[error(
        "Record at offset {offset} of snapshot {snapshot} declares local id {found}, expected {expected}"
    )]
    LocalIdMismatch {
        snapshot: Snapshot,
        offset: u64,
        expected: u64,
        found: u64,
    },

    #[error("Identity index violation: {0}")]
    IdentityViolation(String),

    #[error("Global id {0} is not present in the identity index")]
    UnknownGlobalId(u64),

    #[error("Local id {local_id} has no offset in snapshot {snapshot}")]
    UnknownLocalId { snapshot: Snapshot, local_id: u64 },

    #[error("Cluster {0} is not present in the cluster assignment")]
    UnknownCluster(usize),

    #[error("Cluster {cluster} references unknown input vector {vector}")]
    UnknownInputVector { cluster: usize, vector: usize },

    #[error("Cluster {0} resolves to no global ids")]
    EmptyCluster(usize),

    #[error("Annotated edge '{0}' could not be located in the request graph")]
    OverlayEdgeNotFound(String),

    #[error("Malformed request {global_id}: {reason}")]
    MalformedRequest { global_id: u64, reason: String },

    #[error("Invalid artifact {path} line {line}: {reason}")]
    InvalidArtifact {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hypothesis test execution failed: {0}")]
    HypothesisTest(String),
}

impl DiagnosisError {
    /// Build an [`DiagnosisError::InvalidArtifact`] for a one-indexed line
    pub fn invalid_artifact(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Result type for diagnosis operations
pub type Result<T> = std::result::Result<T, DiagnosisError>;
