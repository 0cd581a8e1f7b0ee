//! Coupling sweep.
//!
//! One pass over the configured `alphas`: for every coupling strength the
//! reservoir is driven with the train and test inputs, a readout is trained
//! per module, and one result row per module is appended to the table.

use nalgebra::DMatrix;
use tracing::{debug, error, info, warn};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::SweepConfig;
use crate::connectivity::{ConnectivityMatrix, NodeId};
use crate::error::{Error, Result};
use crate::metrics::Metric;
use crate::observer::TrajectorySummary;
use crate::readout::{split_rows, train_test_split, ReadoutEngine, ReadoutPartition, Targets};
use crate::reservoir::{InputWeights, ReservoirSimulator};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ResultRow {
    pub alpha: f64,
    pub module: String,
    pub n_nodes: usize,
    /// One value per metric, in the table's metric order.
    pub scores: Vec<f64>,
}

/// Append-only result table. Rows are ordered by alpha, then module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    metric_names: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(metric_names: Vec<String>) -> Self {
        Self {
            metric_names,
            rows: Vec::new(),
        }
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: ResultRow) -> Result<()> {
        if row.scores.len() != self.metric_names.len() {
            return Err(Error::mismatch(
                "result row scores",
                self.metric_names.len(),
                row.scores.len(),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// All values of one metric column, in row order.
    pub fn column(&self, metric: &str) -> Option<Vec<f64>> {
        let idx = self.metric_names.iter().position(|m| m == metric)?;
        Some(self.rows.iter().map(|r| r.scores[idx]).collect())
    }
}

/// Inputs and targets of one task, aligned on time.
#[derive(Debug, Clone)]
pub struct TaskData {
    pub inputs: DMatrix<f64>,
    pub targets: Targets,
    pub sample_weight: Option<Vec<f64>>,
}

impl TaskData {
    pub fn new(inputs: DMatrix<f64>, targets: Targets) -> Result<Self> {
        if inputs.nrows() != targets.len() {
            return Err(Error::mismatch("target length", inputs.nrows(), targets.len()));
        }
        Ok(Self {
            inputs,
            targets,
            sample_weight: None,
        })
    }

    /// Per-step weights over the whole sequence; only the training part is used.
    pub fn with_sample_weight(mut self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.inputs.nrows() {
            return Err(Error::mismatch(
                "sample weight length",
                self.inputs.nrows(),
                weights.len(),
            ));
        }
        self.sample_weight = Some(weights);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }
}

/// Everything an alpha iteration needs that does not depend on alpha.
struct Prepared<'a> {
    x_train: DMatrix<f64>,
    x_test: DMatrix<f64>,
    y_train: Targets,
    y_test: Targets,
    sample_weight: Option<Vec<f64>>,
    w_in: InputWeights,
    output_nodes: Vec<NodeId>,
    engine: ReadoutEngine,
    partition: &'a ReadoutPartition,
}

/// Runs the coupling sweep for a connectome and a task.
///
/// The orchestrator is immutable after construction and can be shared across
/// worker threads; every `run` builds its own state.
#[derive(Debug, Clone)]
pub struct SweepOrchestrator {
    cfg: SweepConfig,
    simulator: ReservoirSimulator,
    metrics: Vec<Metric>,
}

impl SweepOrchestrator {
    pub fn new(cfg: SweepConfig) -> Result<Self> {
        cfg.validate()?;
        let metrics = cfg.parsed_metrics()?;
        let simulator = ReservoirSimulator::new(cfg.activation).with_leak(cfg.leak)?;
        Ok(Self {
            cfg,
            simulator,
            metrics,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.cfg
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name().to_string()).collect()
    }

    /// `conn` is expected to be normalized already (`scale_and_normalize`).
    pub fn run(
        &self,
        conn: &ConnectivityMatrix,
        data: &TaskData,
        partition: &ReadoutPartition,
    ) -> Result<ResultTable> {
        let prepared = self.prepare(conn, data, partition)?;
        let mut table = ResultTable::new(self.metric_names());

        info!(
            task = %self.cfg.task,
            alphas = self.cfg.alphas.len(),
            n_nodes = conn.n_nodes(),
            train = prepared.x_train.nrows(),
            test = prepared.x_test.nrows(),
            "starting coupling sweep"
        );

        for &alpha in &self.cfg.alphas {
            let rows = self.run_alpha(conn, alpha, &prepared).map_err(|source| {
                error!(alpha, error = %source, "coupling iteration failed");
                Error::SweepAborted {
                    alpha,
                    source: Box::new(source),
                }
            })?;
            for row in rows {
                table.push(row)?;
            }
        }

        Ok(table)
    }

    fn prepare<'a>(
        &self,
        conn: &ConnectivityMatrix,
        data: &TaskData,
        partition: &'a ReadoutPartition,
    ) -> Result<Prepared<'a>> {
        // The fields are public, so the length set by `with_sample_weight`
        // is not guaranteed here.
        if let Some(sw) = &data.sample_weight {
            if sw.len() != data.inputs.nrows() {
                return Err(Error::mismatch("sample weight length", data.inputs.nrows(), sw.len()));
            }
        }
        let input_nodes = conn.get_nodes(&self.cfg.input_nodes)?;
        let output_nodes = conn.get_nodes(&self.cfg.output_nodes)?;
        if input_nodes.is_empty() {
            warn!(node_set = %self.cfg.input_nodes, "input node set is empty; the reservoir receives no drive");
        }
        if output_nodes.is_empty() {
            warn!(node_set = %self.cfg.output_nodes, "output node set is empty; readouts see no states");
        }

        let w_in = InputWeights::broadcast(data.inputs.ncols(), conn.n_nodes(), &input_nodes)?;
        let split = train_test_split(&data.inputs, &data.targets, self.cfg.split)?;

        let washout = self.cfg.washout;
        let shortest = split.x_train.nrows().min(split.x_test.nrows());
        if washout >= shortest {
            return Err(Error::InvalidInput(format!(
                "washout of {washout} steps leaves no samples (train {}, test {})",
                split.x_train.nrows(),
                split.x_test.nrows()
            )));
        }

        let sample_weight = data
            .sample_weight
            .as_ref()
            .map(|sw| sw[washout..split.x_train.nrows()].to_vec());

        let engine = match self.cfg.estimator {
            Some(estimator) => ReadoutEngine::new(estimator),
            None => ReadoutEngine::for_targets(&data.targets),
        };

        Ok(Prepared {
            y_train: split.y_train.skip(washout),
            y_test: split.y_test.skip(washout),
            x_train: split.x_train,
            x_test: split.x_test,
            sample_weight,
            w_in,
            output_nodes,
            engine,
            partition,
        })
    }

    fn run_alpha(
        &self,
        conn: &ConnectivityMatrix,
        alpha: f64,
        p: &Prepared<'_>,
    ) -> Result<Vec<ResultRow>> {
        let weights = conn.coupled(alpha);
        let gain = self.cfg.input_gain;

        let rs_train =
            self.simulator
                .simulate(&weights, &p.x_train, &p.w_in, gain, &p.output_nodes)?;
        let rs_test = self
            .simulator
            .simulate(&weights, &p.x_test, &p.w_in, gain, &p.output_nodes)?;

        let summary = TrajectorySummary::of(&rs_train);
        debug!(
            alpha,
            mean_abs = summary.mean_abs,
            max_abs = summary.max_abs,
            saturated = summary.saturated_fraction,
            "training trajectory"
        );

        let washout = self.cfg.washout;
        let (_, rs_train) = split_rows(&rs_train, washout);
        let (_, rs_test) = split_rows(&rs_test, washout);

        let scores = p.engine.run_task(
            (&rs_train, &rs_test),
            (&p.y_train, &p.y_test),
            p.sample_weight.as_deref(),
            &self.metrics,
            p.partition,
        )?;

        let tag = round_alpha(alpha);
        Ok(scores
            .into_iter()
            .map(|s| ResultRow {
                alpha: tag,
                module: s.module,
                n_nodes: s.n_nodes,
                scores: s.scores,
            })
            .collect())
    }
}

/// Alphas are reported with three decimals so grid arithmetic noise does not
/// leak into result files.
fn round_alpha(alpha: f64) -> f64 {
    (alpha * 1000.0).round() / 1000.0
}
