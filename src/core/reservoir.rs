use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::connectivity::{CoupledWeights, NodeId};
use crate::error::{Error, Result};

/// Elementwise nonlinearity applied to the reservoir pre-activation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Activation {
    #[default]
    Tanh,
    Linear,
    Relu,
    LeakyRelu {
        slope: f64,
    },
    Sigmoid,
    Elu {
        alpha: f64,
    },
    Step,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu { slope } => {
                if x >= 0.0 {
                    x
                } else {
                    slope * x
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Elu { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Activation::Step => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// True when f(0) = 0, i.e. a silent reservoir with no input stays silent.
    pub fn fixes_zero(self) -> bool {
        !matches!(self, Activation::Sigmoid | Activation::Step)
    }
}

/// External input projection, shape `input_dim x n_nodes`, entries in {0, 1}.
#[derive(Debug, Clone, PartialEq)]
pub struct InputWeights {
    w: DMatrix<f64>,
}

impl InputWeights {
    /// Every input channel drives every node in `nodes`.
    pub fn broadcast(input_dim: usize, n_nodes: usize, nodes: &[NodeId]) -> Result<Self> {
        check_nodes(nodes, n_nodes, "input node index bound")?;
        let mut w = DMatrix::zeros(input_dim, n_nodes);
        for &node in nodes {
            w.column_mut(node).fill(1.0);
        }
        Ok(Self { w })
    }

    /// Channel `k` drives `nodes[k]` only.
    pub fn one_to_one(n_nodes: usize, nodes: &[NodeId]) -> Result<Self> {
        check_nodes(nodes, n_nodes, "input node index bound")?;
        let mut w = DMatrix::zeros(nodes.len(), n_nodes);
        for (k, &node) in nodes.iter().enumerate() {
            w[(k, node)] = 1.0;
        }
        Ok(Self { w })
    }

    pub fn input_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn n_nodes(&self) -> usize {
        self.w.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.w
    }
}

/// Single-layer recurrent reservoir.
///
/// The simulator only holds the node dynamics (nonlinearity and leak). The
/// coupling-scaled weights arrive with every `simulate` call, so no state or
/// weights survive from one call to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirSimulator {
    activation: Activation,
    leak: f64,
}

impl Default for ReservoirSimulator {
    fn default() -> Self {
        Self {
            activation: Activation::Tanh,
            leak: 1.0,
        }
    }
}

impl ReservoirSimulator {
    pub fn new(activation: Activation) -> Self {
        Self {
            activation,
            leak: 1.0,
        }
    }

    /// Leaky integration: `x(t+1) = (1 - leak) x(t) + leak f(pre)`.
    /// `leak = 1` is the plain update.
    pub fn with_leak(mut self, leak: f64) -> Result<Self> {
        if !(leak > 0.0 && leak <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "leak rate must lie in (0, 1], got {leak}"
            )));
        }
        self.leak = leak;
        Ok(self)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn leak(&self) -> f64 {
        self.leak
    }

    /// Drives the reservoir with `ext_input` (time x input_dim) from a zero
    /// state and returns one state per input step (the state after consuming
    /// that step), restricted to `output_nodes`.
    ///
    /// No transient is discarded here; callers that need a washout slice it off.
    pub fn simulate(
        &self,
        weights: &CoupledWeights,
        ext_input: &DMatrix<f64>,
        w_in: &InputWeights,
        input_gain: f64,
        output_nodes: &[NodeId],
    ) -> Result<DMatrix<f64>> {
        let n = weights.n_nodes();
        if w_in.n_nodes() != n {
            return Err(Error::mismatch("input weight columns", n, w_in.n_nodes()));
        }
        if ext_input.ncols() != w_in.input_dim() {
            return Err(Error::mismatch(
                "input dimension",
                w_in.input_dim(),
                ext_input.ncols(),
            ));
        }
        if !(input_gain.is_finite() && input_gain > 0.0) {
            return Err(Error::InvalidInput(format!(
                "input gain must be positive and finite, got {input_gain}"
            )));
        }
        check_nodes(output_nodes, n, "output node index bound")?;

        let w = weights.matrix();
        // Input drive for every step at once; the recurrence below is what
        // has to stay sequential.
        let drive = ext_input * w_in.matrix() * input_gain;

        let steps = ext_input.nrows();
        let mut states = DMatrix::zeros(steps, output_nodes.len());
        let mut state = DVector::<f64>::zeros(n);
        let keep = 1.0 - self.leak;

        for t in 0..steps {
            let mut pre = w * &state;
            pre += drive.row(t).transpose();

            let f = self.activation;
            state.zip_apply(&pre, |x, p| *x = keep * *x + self.leak * f.apply(p));

            for (col, &node) in output_nodes.iter().enumerate() {
                states[(t, col)] = state[node];
            }
        }

        Ok(states)
    }
}

fn check_nodes(nodes: &[NodeId], n_nodes: usize, what: &'static str) -> Result<()> {
    match nodes.iter().find(|&&i| i >= n_nodes) {
        Some(&bad) => Err(Error::mismatch(what, n_nodes, bad + 1)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMatrix;

    fn ring_conn() -> ConnectivityMatrix {
        let w = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        ConnectivityMatrix::new(w).unwrap()
    }

    fn pulse(steps: usize) -> DMatrix<f64> {
        DMatrix::from_fn(steps, 1, |t, _| if t == 0 { 1.0 } else { 0.0 })
    }

    #[test]
    fn zero_input_gives_zero_trajectory() {
        let conn = ring_conn();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let sim = ReservoirSimulator::default();

        let states = sim
            .simulate(&conn.coupled(1.0), &DMatrix::zeros(10, 1), &w_in, 0.01, &[0, 1, 2])
            .unwrap();

        assert_eq!(states.shape(), (10, 3));
        assert!(states.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn simulate_is_deterministic_and_hermetic() {
        let conn = ring_conn();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let sim = ReservoirSimulator::default();
        let input = DMatrix::from_fn(25, 1, |t, _| ((t * 13 % 7) as f64 - 3.0) / 3.0);

        let a = sim
            .simulate(&conn.coupled(0.9), &input, &w_in, 0.5, &[0, 1, 2])
            .unwrap();
        // A different run in between must not leak into the next one.
        sim.simulate(&conn.coupled(1.7), &input, &w_in, 1.0, &[1])
            .unwrap();
        let b = sim
            .simulate(&conn.coupled(0.9), &input, &w_in, 0.5, &[0, 1, 2])
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn one_state_per_input_step() {
        let conn = ring_conn();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let states = ReservoirSimulator::new(Activation::Linear)
            .simulate(&conn.coupled(1.0), &pulse(4), &w_in, 1.0, &[0, 1, 2])
            .unwrap();

        // W . x with W = ring: x0 <- x1, x1 <- x2, x2 <- x0.
        assert_eq!(states.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
        assert_eq!(states.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 1.0]);
        assert_eq!(states.row(2).iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 0.0]);
        assert_eq!(states.row(3).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn output_nodes_select_columns() {
        let conn = ring_conn();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let sim = ReservoirSimulator::new(Activation::Linear);
        let full = sim
            .simulate(&conn.coupled(1.0), &pulse(5), &w_in, 1.0, &[0, 1, 2])
            .unwrap();
        let part = sim
            .simulate(&conn.coupled(1.0), &pulse(5), &w_in, 1.0, &[2])
            .unwrap();
        assert_eq!(part.column(0), full.column(2));
    }

    #[test]
    fn leak_blends_previous_state() {
        let conn = ring_conn();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let sim = ReservoirSimulator::new(Activation::Linear)
            .with_leak(0.5)
            .unwrap();
        let states = sim
            .simulate(&conn.coupled(0.0), &pulse(3), &w_in, 1.0, &[0])
            .unwrap();
        assert_eq!(states.column(0).iter().copied().collect::<Vec<_>>(), vec![0.5, 0.25, 0.125]);
        assert!(ReservoirSimulator::default().with_leak(0.0).is_err());
        assert!(ReservoirSimulator::default().with_leak(1.5).is_err());
    }

    #[test]
    fn tanh_states_stay_bounded() {
        let mut conn = ring_conn();
        conn.scale_and_normalize().unwrap();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();
        let input = DMatrix::from_element(200, 1, 5.0);
        let states = ReservoirSimulator::default()
            .simulate(&conn.coupled(1.5), &input, &w_in, 1.0, &[0, 1, 2])
            .unwrap();
        assert!(states.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn shape_errors() {
        let conn = ring_conn();
        let sim = ReservoirSimulator::default();
        let w_in = InputWeights::broadcast(1, 3, &[0]).unwrap();

        let wide = DMatrix::zeros(5, 2);
        assert!(matches!(
            sim.simulate(&conn.coupled(1.0), &wide, &w_in, 1.0, &[0]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            sim.simulate(&conn.coupled(1.0), &pulse(3), &w_in, 1.0, &[3]),
            Err(Error::DimensionMismatch { .. })
        ));
        let small = InputWeights::broadcast(1, 2, &[0]).unwrap();
        assert!(sim
            .simulate(&conn.coupled(1.0), &pulse(3), &small, 1.0, &[0])
            .is_err());
        assert!(matches!(
            sim.simulate(&conn.coupled(1.0), &pulse(3), &w_in, 0.0, &[0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(InputWeights::broadcast(1, 3, &[4]).is_err());
    }

    #[test]
    fn input_weight_layouts() {
        let b = InputWeights::broadcast(2, 4, &[1, 3]).unwrap();
        assert_eq!(b.matrix().sum(), 4.0);
        assert_eq!(b.matrix()[(1, 3)], 1.0);
        assert_eq!(b.matrix()[(0, 0)], 0.0);

        let o = InputWeights::one_to_one(4, &[2, 0]).unwrap();
        assert_eq!(o.input_dim(), 2);
        assert_eq!(o.matrix()[(0, 2)], 1.0);
        assert_eq!(o.matrix()[(1, 0)], 1.0);
        assert_eq!(o.matrix().sum(), 2.0);
    }

    #[test]
    fn activations() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::LeakyRelu { slope: 0.1 }.apply(-2.0), -0.2);
        assert_eq!(Activation::Sigmoid.apply(0.0), 0.5);
        assert_eq!(Activation::Step.apply(0.3), 1.0);
        assert!((Activation::Elu { alpha: 1.0 }.apply(-1.0) + 0.632_120_558).abs() < 1e-8);
        assert!(Activation::Tanh.fixes_zero());
        assert!(!Activation::Sigmoid.fixes_zero());
    }
}
