use std::collections::BTreeMap;

use nalgebra::{DMatrix, RowDVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectivity::NodeId;
use crate::error::{Error, Result};
use crate::metrics::Metric;

/// Value domain of a target sequence, decided once when the data is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TargetKind {
    Continuous,
    Categorical,
}

/// Target sequence, `time x n_outputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    values: DMatrix<f64>,
    kind: TargetKind,
}

impl Targets {
    pub fn continuous(values: DMatrix<f64>) -> Self {
        Self {
            values,
            kind: TargetKind::Continuous,
        }
    }

    /// Class labels; every value must be a finite integer.
    pub fn categorical(values: DMatrix<f64>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || v.fract() != 0.0) {
            return Err(Error::InvalidInput(format!(
                "categorical targets must be integral, found {bad}"
            )));
        }
        Ok(Self {
            values,
            kind: TargetKind::Categorical,
        })
    }

    pub fn from_labels(labels: &[i64]) -> Self {
        Self {
            values: DMatrix::from_iterator(labels.len(), 1, labels.iter().map(|&l| l as f64)),
            kind: TargetKind::Categorical,
        }
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn n_outputs(&self) -> usize {
        self.values.ncols()
    }

    pub fn split_at(&self, n: usize) -> (Targets, Targets) {
        let (head, tail) = split_rows(&self.values, n);
        (
            Targets {
                values: head,
                kind: self.kind,
            },
            Targets {
                values: tail,
                kind: self.kind,
            },
        )
    }

    /// Drops the first `n` steps.
    pub fn skip(&self, n: usize) -> Targets {
        self.split_at(n).1
    }
}

/// Readout estimator. `Ridge` regresses continuous targets; `RidgeClassifier`
/// fits one-vs-rest ridge scores per target column and predicts the argmax.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Estimator {
    Ridge { alpha: f64, fit_intercept: bool },
    RidgeClassifier { alpha: f64, fit_intercept: bool },
}

/// Picks the estimator matching the target's value domain.
pub fn select_model(targets: &Targets) -> Estimator {
    match targets.kind() {
        TargetKind::Continuous => Estimator::Ridge {
            alpha: 0.5,
            fit_intercept: false,
        },
        TargetKind::Categorical => Estimator::RidgeClassifier {
            alpha: 0.0,
            fit_intercept: true,
        },
    }
}

/// Where the training prefix ends.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SplitPolicy {
    /// `floor(fraction * len)` steps go to training.
    Fraction(f64),
    /// Exactly this many steps go to training.
    Boundary(usize),
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::Fraction(0.7)
    }
}

impl SplitPolicy {
    pub fn train_len(&self, len: usize) -> Result<usize> {
        match *self {
            SplitPolicy::Fraction(f) => {
                if !(0.0..=1.0).contains(&f) {
                    return Err(Error::InvalidInput(format!(
                        "train fraction must lie in [0, 1], got {f}"
                    )));
                }
                Ok((f * len as f64).floor() as usize)
            }
            SplitPolicy::Boundary(n) => {
                if n > len {
                    return Err(Error::InvalidInput(format!(
                        "split boundary {n} exceeds sequence length {len}"
                    )));
                }
                Ok(n)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: DMatrix<f64>,
    pub x_test: DMatrix<f64>,
    pub y_train: Targets,
    pub y_test: Targets,
}

/// Temporal split: training prefix, test suffix, no shuffling.
pub fn train_test_split(x: &DMatrix<f64>, y: &Targets, policy: SplitPolicy) -> Result<Split> {
    if x.nrows() != y.len() {
        return Err(Error::mismatch("target length", x.nrows(), y.len()));
    }
    let n_train = policy.train_len(x.nrows())?;
    let (x_train, x_test) = split_rows(x, n_train);
    let (y_train, y_test) = y.split_at(n_train);
    Ok(Split {
        x_train,
        x_test,
        y_train,
        y_test,
    })
}

pub(crate) fn split_rows(m: &DMatrix<f64>, n: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = n.min(m.nrows());
    (
        m.rows(0, n).into_owned(),
        m.rows(n, m.nrows() - n).into_owned(),
    )
}

/// How the node axis of the reservoir states is grouped for scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReadoutPartition {
    /// Every column forms one module, reported as `all`.
    #[default]
    Whole,
    /// One label per state column; modules are the distinct labels, sorted.
    Modules(Vec<String>),
    /// Explicitly named column groups, scored in the given order.
    Groups(Vec<(String, Vec<NodeId>)>),
    /// A single subset of columns, reported as `nodes`.
    Nodes(Vec<NodeId>),
}

impl ReadoutPartition {
    pub fn resolve(&self, n_columns: usize) -> Result<Vec<(String, Vec<usize>)>> {
        let groups = match self {
            ReadoutPartition::Whole => vec![("all".to_string(), (0..n_columns).collect())],
            ReadoutPartition::Modules(labels) => {
                if labels.len() != n_columns {
                    return Err(Error::mismatch("readout module labels", n_columns, labels.len()));
                }
                let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
                for (col, label) in labels.iter().enumerate() {
                    by_label.entry(label.as_str()).or_default().push(col);
                }
                by_label
                    .into_iter()
                    .map(|(label, cols)| (label.to_string(), cols))
                    .collect()
            }
            ReadoutPartition::Groups(groups) => groups.clone(),
            ReadoutPartition::Nodes(nodes) => vec![("nodes".to_string(), nodes.clone())],
        };

        if groups.is_empty() {
            return Err(Error::EmptyModule {
                module: "<no modules>".to_string(),
            });
        }
        for (module, cols) in &groups {
            if cols.is_empty() {
                return Err(Error::EmptyModule {
                    module: module.clone(),
                });
            }
            if let Some(&bad) = cols.iter().find(|&&c| c >= n_columns) {
                return Err(Error::mismatch("readout node index bound", n_columns, bad + 1));
            }
        }
        Ok(groups)
    }
}

/// Score of one module: its name, how many nodes it spans, and one value per
/// requested metric, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleScore {
    pub module: String,
    pub n_nodes: usize,
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone)]
struct LinearFit {
    coef: DMatrix<f64>,
    intercept: RowDVector<f64>,
}

impl LinearFit {
    fn predict(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = x * &self.coef;
        for mut row in out.row_iter_mut() {
            row += &self.intercept;
        }
        out
    }
}

#[derive(Debug, Clone)]
struct ClassColumn {
    classes: Vec<f64>,
    // None when training saw a single class.
    fit: Option<LinearFit>,
}

/// A trained readout.
#[derive(Debug, Clone)]
pub struct FittedReadout {
    model: FittedModel,
}

#[derive(Debug, Clone)]
enum FittedModel {
    Regression(LinearFit),
    Classification(Vec<ClassColumn>),
}

impl FittedReadout {
    pub fn predict(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        match &self.model {
            FittedModel::Regression(fit) => fit.predict(x),
            FittedModel::Classification(columns) => {
                let mut out = DMatrix::zeros(x.nrows(), columns.len());
                for (j, column) in columns.iter().enumerate() {
                    match &column.fit {
                        None => out.column_mut(j).fill(column.classes[0]),
                        Some(fit) => {
                            let scores = fit.predict(x);
                            for (i, row) in scores.row_iter().enumerate() {
                                out[(i, j)] = column.classes[row.transpose().argmax().0];
                            }
                        }
                    }
                }
                out
            }
        }
    }
}

/// Trains and scores linear readouts on reservoir states.
///
/// The estimator is fixed at construction, either from the target kind
/// (`for_targets`) or explicitly (`new`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadoutEngine {
    estimator: Estimator,
}

impl ReadoutEngine {
    pub fn new(estimator: Estimator) -> Self {
        Self { estimator }
    }

    pub fn for_targets(targets: &Targets) -> Self {
        Self::new(select_model(targets))
    }

    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    pub fn fit(
        &self,
        x: &DMatrix<f64>,
        y: &Targets,
        sample_weight: Option<&[f64]>,
    ) -> Result<FittedReadout> {
        if x.nrows() != y.len() {
            return Err(Error::mismatch("training target length", x.nrows(), y.len()));
        }
        if x.nrows() == 0 {
            return Err(Error::InvalidInput("cannot fit a readout on zero samples".into()));
        }
        if let Some(sw) = sample_weight {
            check_sample_weight(sw, x.nrows())?;
        }

        let model = match self.estimator {
            Estimator::Ridge {
                alpha,
                fit_intercept,
            } => FittedModel::Regression(fit_ridge(x, y.values(), alpha, fit_intercept, sample_weight)?),
            Estimator::RidgeClassifier {
                alpha,
                fit_intercept,
            } => {
                if y.kind() != TargetKind::Categorical {
                    return Err(Error::InvalidInput(
                        "a classification readout needs categorical targets".into(),
                    ));
                }
                let mut columns = Vec::with_capacity(y.n_outputs());
                for labels in y.values().column_iter() {
                    let mut classes: Vec<f64> = labels.iter().copied().collect();
                    classes.sort_by(f64::total_cmp);
                    classes.dedup();

                    let fit = if classes.len() < 2 {
                        None
                    } else {
                        // One-vs-rest indicator scores in {-1, +1}.
                        let indicators = DMatrix::from_fn(labels.len(), classes.len(), |i, k| {
                            if labels[i] == classes[k] {
                                1.0
                            } else {
                                -1.0
                            }
                        });
                        Some(fit_ridge(x, &indicators, alpha, fit_intercept, sample_weight)?)
                    };
                    columns.push(ClassColumn { classes, fit });
                }
                FittedModel::Classification(columns)
            }
        };

        Ok(FittedReadout { model })
    }

    /// Fits one readout per module on the training states and scores its
    /// test-set predictions with every metric.
    pub fn run_task(
        &self,
        x: (&DMatrix<f64>, &DMatrix<f64>),
        y: (&Targets, &Targets),
        sample_weight: Option<&[f64]>,
        metrics: &[Metric],
        partition: &ReadoutPartition,
    ) -> Result<Vec<ModuleScore>> {
        let (x_train, x_test) = x;
        let (y_train, y_test) = y;

        if x_train.ncols() != x_test.ncols() {
            return Err(Error::mismatch("test state columns", x_train.ncols(), x_test.ncols()));
        }
        if x_test.nrows() != y_test.len() {
            return Err(Error::mismatch("test target length", x_test.nrows(), y_test.len()));
        }
        if y_train.n_outputs() != y_test.n_outputs() {
            return Err(Error::mismatch(
                "test target outputs",
                y_train.n_outputs(),
                y_test.n_outputs(),
            ));
        }
        if metrics.is_empty() {
            return Err(Error::InvalidInput("no metric requested".into()));
        }

        let modules = partition.resolve(x_train.ncols())?;
        let mut out = Vec::with_capacity(modules.len());

        for (module, cols) in modules {
            let train = x_train.select_columns(cols.iter());
            let test = x_test.select_columns(cols.iter());

            let fitted = self.fit(&train, y_train, sample_weight)?;
            let pred = fitted.predict(&test);

            let scores = metrics
                .iter()
                .map(|m| m.score(y_test.values(), &pred))
                .collect::<Result<Vec<_>>>()?;

            out.push(ModuleScore {
                module,
                n_nodes: cols.len(),
                scores,
            });
        }

        Ok(out)
    }
}

fn check_sample_weight(sw: &[f64], n: usize) -> Result<()> {
    if sw.len() != n {
        return Err(Error::mismatch("sample weight length", n, sw.len()));
    }
    if sw.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::InvalidInput(
            "sample weights must be finite and non-negative".into(),
        ));
    }
    if sw.iter().sum::<f64>() <= 0.0 {
        return Err(Error::InvalidInput("sample weights sum to zero".into()));
    }
    Ok(())
}

fn weighted_column_means(m: &DMatrix<f64>, sw: Option<&[f64]>) -> RowDVector<f64> {
    match sw {
        None => m.row_mean(),
        Some(sw) => {
            let total: f64 = sw.iter().sum();
            let mut mean = RowDVector::zeros(m.ncols());
            for (row, w) in m.row_iter().zip(sw) {
                mean += row * *w;
            }
            mean / total
        }
    }
}

/// Ridge least squares, `min ||sqrt(w) (Y - X B - 1 c)||^2 + alpha ||B||^2`.
fn fit_ridge(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    alpha: f64,
    fit_intercept: bool,
    sample_weight: Option<&[f64]>,
) -> Result<LinearFit> {
    if !(alpha.is_finite() && alpha >= 0.0) {
        return Err(Error::InvalidInput(format!(
            "ridge alpha must be finite and non-negative, got {alpha}"
        )));
    }

    let (x_mean, y_mean) = if fit_intercept {
        (
            weighted_column_means(x, sample_weight),
            weighted_column_means(y, sample_weight),
        )
    } else {
        (RowDVector::zeros(x.ncols()), RowDVector::zeros(y.ncols()))
    };

    let mut xc = x.clone();
    let mut yc = y.clone();
    for mut row in xc.row_iter_mut() {
        row -= &x_mean;
    }
    for mut row in yc.row_iter_mut() {
        row -= &y_mean;
    }
    if let Some(sw) = sample_weight {
        for (i, w) in sw.iter().enumerate() {
            let s = w.sqrt();
            let mut xr = xc.row_mut(i);
            xr *= s;
            let mut yr = yc.row_mut(i);
            yr *= s;
        }
    }

    let coef = if alpha > 0.0 {
        let mut gram = xc.tr_mul(&xc);
        for i in 0..gram.nrows() {
            gram[(i, i)] += alpha;
        }
        let rhs = xc.tr_mul(&yc);
        match gram.clone().cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => lstsq(gram, &rhs)?,
        }
    } else {
        lstsq(xc, &yc)?
    };

    let intercept = &y_mean - &x_mean * &coef;
    Ok(LinearFit { coef, intercept })
}

/// Minimum-norm least squares through the SVD.
fn lstsq(a: DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let svd = a.svd(true, true);
    let eps = svd.singular_values.max() * 1e-12;
    svd.solve(b, eps)
        .map_err(|e| Error::Numerical(format!("least squares solve failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricKind, MultiOutput, NonNegative};
    use crate::prng::Prng;

    fn noise(rows: usize, cols: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = Prng::new(seed);
        DMatrix::from_fn(rows, cols, |_, _| rng.next_f64_01() * 2.0 - 1.0)
    }

    #[test]
    fn model_follows_target_kind() {
        let cont = Targets::continuous(DMatrix::zeros(4, 2));
        let cat = Targets::from_labels(&[0, 1, 1, 0]);
        assert!(matches!(select_model(&cont), Estimator::Ridge { .. }));
        assert!(matches!(
            ReadoutEngine::for_targets(&cat).estimator(),
            Estimator::RidgeClassifier { .. }
        ));
    }

    #[test]
    fn categorical_rejects_fractions() {
        assert!(Targets::categorical(DMatrix::from_element(2, 1, 0.5)).is_err());
        assert!(Targets::categorical(DMatrix::from_element(2, 1, 2.0)).is_ok());
    }

    #[test]
    fn split_preserves_length_and_order() {
        for len in [0usize, 1, 7, 10, 33] {
            for frac in [0.0, 0.3, 0.7, 1.0] {
                let x = DMatrix::from_fn(len, 2, |t, c| (t * 2 + c) as f64);
                let y = Targets::continuous(DMatrix::from_fn(len, 1, |t, _| t as f64));
                let s = train_test_split(&x, &y, SplitPolicy::Fraction(frac)).unwrap();

                assert_eq!(s.x_train.nrows() + s.x_test.nrows(), len);
                assert_eq!(s.y_train.len() + s.y_test.len(), len);
                assert_eq!(s.x_train.nrows(), s.y_train.len());

                let order: Vec<f64> = s
                    .y_train
                    .values()
                    .iter()
                    .chain(s.y_test.values().iter())
                    .copied()
                    .collect();
                assert_eq!(order, (0..len).map(|t| t as f64).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn split_boundary_and_errors() {
        let x = DMatrix::zeros(10, 1);
        let y = Targets::continuous(DMatrix::zeros(10, 1));
        let s = train_test_split(&x, &y, SplitPolicy::Boundary(4)).unwrap();
        assert_eq!((s.x_train.nrows(), s.x_test.nrows()), (4, 6));

        assert!(train_test_split(&x, &y, SplitPolicy::Boundary(11)).is_err());
        assert!(train_test_split(&x, &y, SplitPolicy::Fraction(1.2)).is_err());
        let short = Targets::continuous(DMatrix::zeros(9, 1));
        assert!(matches!(
            train_test_split(&x, &short, SplitPolicy::default()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn ridge_recovers_linear_map() {
        let x = noise(60, 3, 1);
        let beta = DMatrix::from_row_slice(3, 2, &[1.0, -0.5, 2.0, 0.0, -1.0, 3.0]);
        let y = Targets::continuous(&x * &beta + DMatrix::from_element(60, 2, 0.25));

        let engine = ReadoutEngine::new(Estimator::Ridge {
            alpha: 0.0,
            fit_intercept: true,
        });
        let fitted = engine.fit(&x, &y, None).unwrap();
        let pred = fitted.predict(&x);

        assert!((pred - y.values()).abs().max() < 1e-8);
    }

    #[test]
    fn ridge_shrinks_with_alpha() {
        let x = noise(40, 2, 2);
        let y = Targets::continuous(&x * DMatrix::from_row_slice(2, 1, &[1.0, 1.0]));
        let small = ReadoutEngine::new(Estimator::Ridge {
            alpha: 1e-6,
            fit_intercept: false,
        });
        let big = ReadoutEngine::new(Estimator::Ridge {
            alpha: 1e3,
            fit_intercept: false,
        });
        let p_small = small.fit(&x, &y, None).unwrap().predict(&x);
        let p_big = big.fit(&x, &y, None).unwrap().predict(&x);
        assert!(p_big.norm() < p_small.norm());
    }

    #[test]
    fn zero_weight_rows_are_ignored() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut yv = &x * 2.0;
        yv[(5, 0)] = 100.0;
        let y = Targets::continuous(yv);
        let sw = [1.0, 1.0, 1.0, 1.0, 1.0, 0.0];

        let engine = ReadoutEngine::new(Estimator::Ridge {
            alpha: 0.0,
            fit_intercept: false,
        });
        let pred = engine.fit(&x, &y, Some(&sw)).unwrap().predict(&x);
        assert!((pred[(5, 0)] - 12.0).abs() < 1e-9);

        assert!(engine.fit(&x, &y, Some(&sw[..3])).is_err());
        assert!(engine.fit(&x, &y, Some(&[0.0; 6])).is_err());
    }

    #[test]
    fn classifier_separates_classes() {
        let labels: Vec<i64> = (0..40).map(|t| (t % 3) as i64).collect();
        let x = DMatrix::from_fn(40, 3, |t, c| {
            if labels[t] as usize == c {
                1.0
            } else {
                0.0
            }
        }) + noise(40, 3, 3) * 0.05;
        let y = Targets::from_labels(&labels);

        let engine = ReadoutEngine::for_targets(&y);
        let pred = engine.fit(&x, &y, None).unwrap().predict(&x);
        assert_eq!(pred, y.values().clone());
    }

    #[test]
    fn classifier_with_single_class() {
        let x = noise(5, 2, 4);
        let y = Targets::from_labels(&[3, 3, 3, 3, 3]);
        let pred = ReadoutEngine::for_targets(&y)
            .fit(&x, &y, None)
            .unwrap()
            .predict(&x);
        assert!(pred.iter().all(|v| *v == 3.0));
    }

    #[test]
    fn classifier_needs_categorical_targets() {
        let x = noise(5, 2, 5);
        let y = Targets::continuous(DMatrix::zeros(5, 1));
        let engine = ReadoutEngine::new(Estimator::RidgeClassifier {
            alpha: 0.0,
            fit_intercept: true,
        });
        assert!(matches!(engine.fit(&x, &y, None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn module_node_counts_cover_all_outputs() {
        let x_train = noise(50, 7, 6);
        let x_test = noise(20, 7, 7);
        let y_train = Targets::continuous(x_train.columns(0, 2).into_owned());
        let y_test = Targets::continuous(x_test.columns(0, 2).into_owned());
        let labels: Vec<String> = ["DMN", "VIS", "DMN", "SM", "VIS", "DMN", "SM"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let metric = Metric::new(MetricKind::CorrCoef)
            .with_multioutput(MultiOutput::Sum)
            .with_nonnegative(NonNegative::Absolute);
        let rows = ReadoutEngine::for_targets(&y_train)
            .run_task(
                (&x_train, &x_test),
                (&y_train, &y_test),
                None,
                &[metric, Metric::new(MetricKind::R2Score)],
                &ReadoutPartition::Modules(labels),
            )
            .unwrap();

        let names: Vec<&str> = rows.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, vec!["DMN", "SM", "VIS"]);
        assert_eq!(rows.iter().map(|r| r.n_nodes).sum::<usize>(), 7);
        assert!(rows.iter().all(|r| r.scores.len() == 2));
        assert!(rows.iter().all(|r| r.scores.iter().all(|s| s.is_finite())));
        // DMN holds columns 0 and 2, so it sees the first target column directly.
        assert!(rows[0].scores[0] > 0.9);
    }

    #[test]
    fn whole_and_subset_partitions() {
        let x = noise(30, 4, 8);
        let y = Targets::continuous(x.columns(1, 1).into_owned());
        let engine = ReadoutEngine::for_targets(&y);
        let metrics = [Metric::new(MetricKind::MeanSquaredError)];

        let whole = engine
            .run_task((&x, &x), (&y, &y), None, &metrics, &ReadoutPartition::Whole)
            .unwrap();
        assert_eq!(whole.len(), 1);
        assert_eq!((whole[0].module.as_str(), whole[0].n_nodes), ("all", 4));

        let subset = engine
            .run_task(
                (&x, &x),
                (&y, &y),
                None,
                &metrics,
                &ReadoutPartition::Nodes(vec![1, 3]),
            )
            .unwrap();
        assert_eq!(subset[0].n_nodes, 2);
    }

    #[test]
    fn empty_module_is_an_error() {
        let x = noise(10, 3, 9);
        let y = Targets::continuous(x.columns(0, 1).into_owned());
        let engine = ReadoutEngine::for_targets(&y);
        let metrics = [Metric::new(MetricKind::CorrCoef)];

        let groups = ReadoutPartition::Groups(vec![
            ("a".to_string(), vec![0, 1]),
            ("b".to_string(), vec![]),
        ]);
        assert!(matches!(
            engine.run_task((&x, &x), (&y, &y), None, &metrics, &groups),
            Err(Error::EmptyModule { module }) if module == "b"
        ));
        assert!(matches!(
            engine.run_task((&x, &x), (&y, &y), None, &metrics, &ReadoutPartition::Nodes(vec![])),
            Err(Error::EmptyModule { .. })
        ));
    }

    #[test]
    fn partition_without_modules_is_an_error() {
        for partition in [
            ReadoutPartition::Modules(vec![]),
            ReadoutPartition::Groups(vec![]),
            ReadoutPartition::Whole,
        ] {
            assert!(matches!(
                partition.resolve(0),
                Err(Error::EmptyModule { .. })
            ));
        }
    }

    #[test]
    fn label_count_must_match_columns() {
        let x = noise(10, 3, 10);
        let y = Targets::continuous(x.columns(0, 1).into_owned());
        let labels = ReadoutPartition::Modules(vec!["a".into(), "b".into()]);
        assert!(matches!(
            ReadoutEngine::for_targets(&y).run_task(
                (&x, &x),
                (&y, &y),
                None,
                &[Metric::new(MetricKind::CorrCoef)],
                &labels
            ),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
