//! Readout scoring.
//!
//! Every metric is computed per output column; the per-column scores then pass
//! through the optional `nonnegative` transform and are reduced according to
//! `multioutput`.

use std::collections::BTreeSet;
use std::str::FromStr;

use nalgebra::{DMatrix, DVectorView};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    CorrCoef,
    R2Score,
    MeanSquaredError,
    RootMeanSquaredError,
    MeanAbsoluteError,
    AccuracyScore,
    BalancedAccuracyScore,
    F1Score,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::CorrCoef => "corrcoef",
            MetricKind::R2Score => "r2_score",
            MetricKind::MeanSquaredError => "mean_squared_error",
            MetricKind::RootMeanSquaredError => "root_mean_squared_error",
            MetricKind::MeanAbsoluteError => "mean_absolute_error",
            MetricKind::AccuracyScore => "accuracy_score",
            MetricKind::BalancedAccuracyScore => "balanced_accuracy_score",
            MetricKind::F1Score => "f1_score",
        }
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "corrcoef" => MetricKind::CorrCoef,
            "r2_score" => MetricKind::R2Score,
            "mean_squared_error" => MetricKind::MeanSquaredError,
            "root_mean_squared_error" => MetricKind::RootMeanSquaredError,
            "mean_absolute_error" => MetricKind::MeanAbsoluteError,
            "accuracy_score" => MetricKind::AccuracyScore,
            "balanced_accuracy_score" => MetricKind::BalancedAccuracyScore,
            "f1_score" => MetricKind::F1Score,
            other => return Err(Error::UnsupportedMetric(other.to_string())),
        })
    }
}

/// Reduction over output columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MultiOutput {
    Sum,
    #[default]
    UniformAverage,
}

/// Applied to each per-column score before the reduction, so correlations of
/// opposite sign do not cancel out when summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NonNegative {
    Absolute,
    Squared,
}

/// A metric as written in a configuration file: a name plus keyword options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricSpec {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub multioutput: MultiOutput,
    #[cfg_attr(feature = "serde", serde(default))]
    pub nonnegative: Option<NonNegative>,
}

impl MetricSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multioutput: MultiOutput::default(),
            nonnegative: None,
        }
    }

    pub fn parse(&self) -> Result<Metric> {
        Ok(Metric {
            kind: self.name.parse()?,
            multioutput: self.multioutput,
            nonnegative: self.nonnegative,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub kind: MetricKind,
    pub multioutput: MultiOutput,
    pub nonnegative: Option<NonNegative>,
}

impl Metric {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            multioutput: MultiOutput::default(),
            nonnegative: None,
        }
    }

    pub fn with_multioutput(mut self, multioutput: MultiOutput) -> Self {
        self.multioutput = multioutput;
        self
    }

    pub fn with_nonnegative(mut self, nonnegative: NonNegative) -> Self {
        self.nonnegative = Some(nonnegative);
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn score(&self, y_true: &DMatrix<f64>, y_pred: &DMatrix<f64>) -> Result<f64> {
        if y_true.nrows() != y_pred.nrows() {
            return Err(Error::mismatch("prediction rows", y_true.nrows(), y_pred.nrows()));
        }
        if y_true.ncols() != y_pred.ncols() {
            return Err(Error::mismatch(
                "prediction columns",
                y_true.ncols(),
                y_pred.ncols(),
            ));
        }
        if y_true.nrows() == 0 {
            return Err(Error::InvalidInput("cannot score an empty test set".into()));
        }

        let per_output = y_true
            .column_iter()
            .zip(y_pred.column_iter())
            .map(|(t, p)| {
                let s = self.column_score(t, p);
                match self.nonnegative {
                    Some(NonNegative::Absolute) => s.abs(),
                    Some(NonNegative::Squared) => s * s,
                    None => s,
                }
            });

        Ok(match self.multioutput {
            MultiOutput::Sum => per_output.sum::<f64>(),
            MultiOutput::UniformAverage => per_output.sum::<f64>() / y_true.ncols() as f64,
        })
    }

    fn column_score(&self, t: DVectorView<'_, f64>, p: DVectorView<'_, f64>) -> f64 {
        let n = t.len() as f64;
        match self.kind {
            MetricKind::CorrCoef => pearson(t, p),
            MetricKind::R2Score => {
                let mean = t.mean();
                let ss_res: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                let ss_tot: f64 = t.iter().map(|a| (a - mean).powi(2)).sum();
                if ss_tot == 0.0 {
                    if ss_res == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    1.0 - ss_res / ss_tot
                }
            }
            MetricKind::MeanSquaredError => {
                t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n
            }
            MetricKind::RootMeanSquaredError => {
                (t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n).sqrt()
            }
            MetricKind::MeanAbsoluteError => {
                t.iter().zip(p.iter()).map(|(a, b)| (a - b).abs()).sum::<f64>() / n
            }
            MetricKind::AccuracyScore => {
                t.iter()
                    .zip(p.iter())
                    .filter(|(a, b)| label(**a) == label(**b))
                    .count() as f64
                    / n
            }
            MetricKind::BalancedAccuracyScore => {
                let classes: BTreeSet<i64> = t.iter().map(|v| label(*v)).collect();
                let recall_sum: f64 = classes
                    .iter()
                    .map(|&c| {
                        let support = t.iter().filter(|v| label(**v) == c).count();
                        let hits = t
                            .iter()
                            .zip(p.iter())
                            .filter(|(a, b)| label(**a) == c && label(**b) == c)
                            .count();
                        hits as f64 / support as f64
                    })
                    .sum();
                recall_sum / classes.len() as f64
            }
            MetricKind::F1Score => {
                // Macro average over every label seen in truth or prediction.
                let classes: BTreeSet<i64> =
                    t.iter().chain(p.iter()).map(|v| label(*v)).collect();
                let f1_sum: f64 = classes
                    .iter()
                    .map(|&c| {
                        let mut tp = 0usize;
                        let mut fp = 0usize;
                        let mut fn_ = 0usize;
                        for (a, b) in t.iter().zip(p.iter()) {
                            match (label(*a) == c, label(*b) == c) {
                                (true, true) => tp += 1,
                                (false, true) => fp += 1,
                                (true, false) => fn_ += 1,
                                (false, false) => {}
                            }
                        }
                        let denom = 2 * tp + fp + fn_;
                        if denom == 0 {
                            0.0
                        } else {
                            2.0 * tp as f64 / denom as f64
                        }
                    })
                    .sum();
                f1_sum / classes.len() as f64
            }
        }
    }
}

#[inline]
fn label(v: f64) -> i64 {
    v.round() as i64
}

/// Pearson correlation. A constant series has no measurable linear relation,
/// so the result is 0.0 rather than NaN.
fn pearson(t: DVectorView<'_, f64>, p: DVectorView<'_, f64>) -> f64 {
    let mt = t.mean();
    let mp = p.mean();
    let mut cov = 0.0;
    let mut vt = 0.0;
    let mut vp = 0.0;
    for (a, b) in t.iter().zip(p.iter()) {
        cov += (a - mt) * (b - mp);
        vt += (a - mt).powi(2);
        vp += (b - mp).powi(2);
    }
    if vt == 0.0 || vp == 0.0 {
        return 0.0;
    }
    (cov / (vt.sqrt() * vp.sqrt())).clamp(-1.0, 1.0)
}
