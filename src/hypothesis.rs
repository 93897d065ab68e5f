// Paired-sample significance testing for cluster statistics
//
// Comparisons are submitted one at a time, keyed by a cluster-scoped id, and
// run together by `execute()`. Batch execution is what makes the
// multiple-comparison correction possible: the number of completed tests is
// only known once the whole batch has been seen.
//
// Uses aprender's Welch t-test (unequal variances) and trueno::Vector for the
// descriptive statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};
use trueno::Vector;

use crate::config::DiagnosisConfig;
use crate::error::{DiagnosisError, Result};

/// What a comparison measures within one cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Subject {
    /// Total request latency from the record headers
    ResponseTime,
    /// Latencies of one `"src->dest"` edge
    Edge(String),
}

/// Key of one submitted comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComparisonId {
    pub cluster: usize,
    pub subject: Subject,
}

impl ComparisonId {
    pub fn response_time(cluster: usize) -> Self {
        Self {
            cluster,
            subject: Subject::ResponseTime,
        }
    }

    pub fn edge(cluster: usize, edge_name: impl Into<String>) -> Self {
        Self {
            cluster,
            subject: Subject::Edge(edge_name.into()),
        }
    }
}

impl fmt::Display for ComparisonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Subject::ResponseTime => write!(f, "cluster {} response time", self.cluster),
            Subject::Edge(name) => write!(f, "cluster {} edge {}", self.cluster, name),
        }
    }
}

/// Result of a completed Welch's t-test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticalTest {
    /// t-statistic
    pub statistic: f64,
    /// Two-tailed p-value, after correction when enabled
    pub p_value: f64,
    /// Welch-Satterthwaite degrees of freedom
    pub df: f64,
    /// Mean per period
    pub mean: [f64; 2],
    /// Population standard deviation per period
    pub stddev: [f64; 2],
    /// `p_value < significance_level`
    pub significant: bool,
}

/// Why a comparison was recorded but not run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NotRunReason {
    InsufficientSamples {
        baseline: usize,
        problem: usize,
        required: usize,
    },
    /// The test produced no usable statistic (e.g. zero variance in both periods)
    Degenerate(String),
}

impl fmt::Display for NotRunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotRunReason::InsufficientSamples { required, .. } => {
                write!(f, "fewer than {} samples in a period", required)
            }
            NotRunReason::Degenerate(detail) => write!(f, "degenerate samples ({})", detail),
        }
    }
}

/// Outcome of one comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TestOutcome {
    Completed(StatisticalTest),
    NotRun { reason: NotRunReason },
}

impl TestOutcome {
    pub fn is_significant(&self) -> bool {
        matches!(self, TestOutcome::Completed(test) if test.significant)
    }

    pub fn p_value(&self) -> Option<f64> {
        match self {
            TestOutcome::Completed(test) => Some(test.p_value),
            TestOutcome::NotRun { .. } => None,
        }
    }

    pub fn was_run(&self) -> bool {
        matches!(self, TestOutcome::Completed(_))
    }
}

/// Batched hypothesis-test collaborator
///
/// `result` returns `None` for ids that were never submitted or whose batch
/// has not been executed yet.
pub trait HypothesisTester: Send {
    fn submit(&mut self, id: ComparisonId, baseline: Vec<f64>, problem: Vec<f64>) -> Result<()>;

    fn execute(&mut self) -> Result<()>;

    fn result(&self, id: &ComparisonId) -> Option<&TestOutcome>;
}

/// Mean and population standard deviation, 0 for an empty sample
///
/// The mean is taken in f64. Only the deviations from it are narrowed to
/// f32 for trueno, so large latencies never get squared at f32 precision.
pub fn describe(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let deviations = centered(samples, mean);
    let stddev = Vector::from_slice(&deviations)
        .stddev()
        .map(f64::from)
        .ok()
        .filter(|s| s.is_finite())
        .unwrap_or(0.0);
    (mean, stddev)
}

/// `samples - shift`, narrowed to f32
fn centered(samples: &[f64], shift: f64) -> Vec<f32> {
    samples.iter().map(|&s| (s - shift) as f32).collect()
}

/// Welch's two-sample t-test over every submitted comparison
#[derive(Debug)]
pub struct WelchTester {
    significance_level: f64,
    min_sample_size: usize,
    bonferroni_correction: bool,
    pending: BTreeMap<ComparisonId, [Vec<f64>; 2]>,
    results: BTreeMap<ComparisonId, TestOutcome>,
}

impl WelchTester {
    pub fn new(config: &DiagnosisConfig) -> Self {
        Self {
            significance_level: config.significance_level,
            min_sample_size: config.min_sample_size.max(2),
            bonferroni_correction: config.bonferroni_correction,
            pending: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    /// Number of comparisons awaiting `execute`
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// All executed outcomes in id order
    pub fn results(&self) -> impl Iterator<Item = (&ComparisonId, &TestOutcome)> {
        self.results.iter()
    }

    fn run_one(&self, baseline: &[f64], problem: &[f64]) -> TestOutcome {
        if baseline.len() < self.min_sample_size || problem.len() < self.min_sample_size {
            return TestOutcome::NotRun {
                reason: NotRunReason::InsufficientSamples {
                    baseline: baseline.len(),
                    problem: problem.len(),
                    required: self.min_sample_size,
                },
            };
        }

        // The t statistic is shift invariant; centring on the baseline mean
        // keeps the f32 inputs small
        let shift = baseline.iter().sum::<f64>() / baseline.len() as f64;
        let b = centered(baseline, shift);
        let p = centered(problem, shift);
        let ttest = match aprender::stats::hypothesis::ttest_ind(&b, &p, false) {
            Ok(ttest) => ttest,
            Err(e) => {
                return TestOutcome::NotRun {
                    reason: NotRunReason::Degenerate(e.to_string()),
                }
            }
        };
        if !ttest.pvalue.is_finite() || !ttest.statistic.is_finite() {
            return TestOutcome::NotRun {
                reason: NotRunReason::Degenerate("non-finite statistic".to_string()),
            };
        }

        let (mean0, stddev0) = describe(baseline);
        let (mean1, stddev1) = describe(problem);
        TestOutcome::Completed(StatisticalTest {
            statistic: ttest.statistic as f64,
            p_value: ttest.pvalue as f64,
            df: ttest.df as f64,
            mean: [mean0, mean1],
            stddev: [stddev0, stddev1],
            significant: false,
        })
    }
}

impl HypothesisTester for WelchTester {
    fn submit(&mut self, id: ComparisonId, baseline: Vec<f64>, problem: Vec<f64>) -> Result<()> {
        if self.pending.contains_key(&id) || self.results.contains_key(&id) {
            return Err(DiagnosisError::HypothesisTest(format!(
                "{} submitted twice",
                id
            )));
        }
        self.pending.insert(id, [baseline, problem]);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        let mut outcomes: Vec<(ComparisonId, TestOutcome)> = batch
            .into_iter()
            .map(|(id, [baseline, problem])| {
                let outcome = self.run_one(&baseline, &problem);
                (id, outcome)
            })
            .collect();

        let completed = outcomes.iter().filter(|(_, o)| o.was_run()).count();
        let factor = if self.bonferroni_correction {
            completed.max(1) as f64
        } else {
            1.0
        };

        let mut significant = 0usize;
        for (id, outcome) in &mut outcomes {
            if let TestOutcome::Completed(test) = outcome {
                test.p_value = (test.p_value * factor).min(1.0);
                test.significant = test.p_value < self.significance_level;
                if test.significant {
                    significant += 1;
                    debug!(p_value = test.p_value, "Significant difference in {}", id);
                }
            }
        }

        info!(
            comparisons = outcomes.len(),
            completed,
            significant,
            bonferroni = self.bonferroni_correction,
            "Executed hypothesis test batch"
        );

        self.results.extend(outcomes);
        Ok(())
    }

    fn result(&self, id: &ComparisonId) -> Option<&TestOutcome> {
        self.results.get(id)
    }
}
