// Configuration for cluster diagnosis
//
// Thresholds for hypothesis testing, originating-cluster detection and
// mutation cost weighting. Loaded from TOML; missing keys take defaults.

use crate::error::{DiagnosisError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the cluster statistics engine and mutation classifier
///
/// # Example
/// ```
/// use spectroscope::config::DiagnosisConfig;
///
/// let config = DiagnosisConfig::default();
/// assert_eq!(config.significance_level, 0.05);
/// assert!(!config.dont_enforce_one_to_n);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    /// Statistical significance level (alpha) for response-time and edge tests
    ///
    /// - 0.05 (default): 95% confidence
    /// - 0.01: stricter, fewer clusters flagged
    pub significance_level: f64,

    /// Minimum samples per period before a t-test is run
    ///
    /// Below this the comparison is recorded as "test not run".
    pub min_sample_size: usize,

    /// Multiply every p-value by the number of tests completed in the batch
    pub bonferroni_correction: bool,

    /// Percentage of problem-period requests a cluster must hold to be an
    /// originating cluster
    pub mutation_threshold: f64,

    /// Allow a structural mutation to list every equally-near originator
    /// instead of exactly one
    pub dont_enforce_one_to_n: bool,

    /// Render the occurrence-weighted structural and combined views
    pub use_weighted_costs: bool,

    /// Mean per-request occurrence delta beyond which an edge present in
    /// both periods counts as structurally different
    pub edge_occurrence_delta: f64,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_sample_size: 5,
            bonferroni_correction: false,
            mutation_threshold: 10.0,
            dont_enforce_one_to_n: false,
            use_weighted_costs: false,
            edge_occurrence_delta: 0.5,
        }
    }
}

impl DiagnosisConfig {
    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DiagnosisError::MissingInput {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            DiagnosisError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.significance_level) {
            return Err(DiagnosisError::InvalidConfig(format!(
                "significance_level must be in [0, 1], got {}",
                self.significance_level
            )));
        }

        if self.min_sample_size < 2 {
            return Err(DiagnosisError::InvalidConfig(format!(
                "min_sample_size must be >= 2 for t-test, got {}",
                self.min_sample_size
            )));
        }

        if !(0.0..=100.0).contains(&self.mutation_threshold) {
            return Err(DiagnosisError::InvalidConfig(format!(
                "mutation_threshold must be a percentage in [0, 100], got {}",
                self.mutation_threshold
            )));
        }

        if self.edge_occurrence_delta < 0.0 {
            return Err(DiagnosisError::InvalidConfig(format!(
                "edge_occurrence_delta must be non-negative, got {}",
                self.edge_occurrence_delta
            )));
        }

        Ok(())
    }
}
