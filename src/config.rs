//! Sweep configuration.
//!
//! Every knob of an experiment lives here and is handed to
//! `SweepOrchestrator::new`; there are no process-wide settings. Missing
//! fields in a JSON file fall back to the values in `Default`.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectivity::DegreePreservation;
use crate::error::{Error, Result};
use crate::metrics::{Metric, MetricSpec, MultiOutput, NonNegative};
use crate::readout::{Estimator, SplitPolicy};
use crate::reservoir::Activation;

fn default_task() -> String {
    "MemoryCapacity".to_string()
}

fn default_metrics() -> Vec<MetricSpec> {
    vec![MetricSpec {
        name: "corrcoef".to_string(),
        multioutput: MultiOutput::Sum,
        nonnegative: Some(NonNegative::Absolute),
    }]
}

/// `linspace(0, 2, 11)` without the degenerate zero coupling.
fn default_alphas() -> Vec<f64> {
    (1..=10).map(|i| 2.0 * i as f64 / 10.0).collect()
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SweepConfig {
    /// Name of the benchmark; only used for logging and bookkeeping.
    pub task: String,
    pub metrics: Vec<MetricSpec>,
    pub input_gain: f64,
    /// Coupling grid, strictly ascending.
    pub alphas: Vec<f64>,
    /// Leading steps dropped from train and test trajectories before fitting.
    pub washout: usize,
    pub split: SplitPolicy,
    /// Partition receiving the external input.
    pub input_nodes: String,
    /// Partition whose states feed the readout.
    pub output_nodes: String,
    pub activation: Activation,
    pub leak: f64,
    /// Explicit readout; when absent it is chosen from the target kind.
    pub estimator: Option<Estimator>,
    pub null_models: NullModelConfig,
    pub workers: usize,
    pub seed: u64,
    pub output_dir: Option<PathBuf>,
    pub data: Option<DataConfig>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            task: default_task(),
            metrics: default_metrics(),
            input_gain: 0.01,
            alphas: default_alphas(),
            washout: 0,
            split: SplitPolicy::default(),
            input_nodes: "subctx".to_string(),
            output_nodes: "ctx".to_string(),
            activation: Activation::Tanh,
            leak: 1.0,
            estimator: None,
            null_models: NullModelConfig::default(),
            workers: 1,
            seed: 1,
            output_dir: None,
            data: None,
        }
    }
}

/// Degree-preserving null networks run next to the empirical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NullModelConfig {
    pub count: usize,
    /// Rewiring attempts per edge.
    pub swaps: usize,
    pub preservation: DegreePreservation,
}

impl Default for NullModelConfig {
    fn default() -> Self {
        Self {
            count: 0,
            swaps: 10,
            preservation: DegreePreservation::Binary,
        }
    }
}

/// `.npy` inputs of an experiment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataConfig {
    pub connectivity: PathBuf,
    pub inputs: PathBuf,
    pub targets: PathBuf,
    /// Boolean/0-1 mask over nodes; registers `ctx` (true) and `subctx` (false).
    #[cfg_attr(feature = "serde", serde(default))]
    pub cortical: Option<PathBuf>,
    /// Module label per node (or per output node) for per-module scoring.
    #[cfg_attr(feature = "serde", serde(default))]
    pub modules: Option<PathBuf>,
}

impl SweepConfig {
    #[cfg(feature = "serde")]
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.alphas.is_empty() {
            return Err(Error::InvalidInput("coupling grid is empty".into()));
        }
        if self.alphas.iter().any(|a| !a.is_finite()) {
            return Err(Error::InvalidInput("coupling grid contains non-finite values".into()));
        }
        if self.alphas.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidInput(
                "coupling grid must be strictly ascending".into(),
            ));
        }
        if !(self.input_gain.is_finite() && self.input_gain > 0.0) {
            return Err(Error::InvalidInput(format!(
                "input gain must be positive, got {}",
                self.input_gain
            )));
        }
        if !(self.leak > 0.0 && self.leak <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "leak rate must lie in (0, 1], got {}",
                self.leak
            )));
        }
        if self.workers == 0 {
            return Err(Error::InvalidInput("worker pool needs at least one worker".into()));
        }
        if self.metrics.is_empty() {
            return Err(Error::InvalidInput("no metric configured".into()));
        }
        self.parsed_metrics().map(|_| ())
    }

    pub fn parsed_metrics(&self) -> Result<Vec<Metric>> {
        self.metrics.iter().map(MetricSpec::parse).collect()
    }
}
