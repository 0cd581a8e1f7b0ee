use nalgebra::DMatrix;

/// A read-only summary of a reservoir trajectory.
///
/// Design intent:
/// - Observers never touch the simulator; they only look at the states it returned.
/// - Summaries are computed on demand, outside the simulation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySummary {
    pub steps: usize,
    pub nodes: usize,
    pub mean_abs: f64,
    pub max_abs: f64,
    /// Share of activations with |x| > 0.99 (tanh saturation).
    pub saturated_fraction: f64,
    pub final_norm: f64,
}

impl TrajectorySummary {
    pub fn of(states: &DMatrix<f64>) -> Self {
        let (steps, nodes) = states.shape();
        let count = (steps * nodes).max(1) as f64;

        let mut sum_abs = 0.0;
        let mut max_abs = 0.0_f64;
        let mut saturated = 0usize;
        for v in states.iter() {
            let a = v.abs();
            sum_abs += a;
            max_abs = max_abs.max(a);
            if a > 0.99 {
                saturated += 1;
            }
        }

        let final_norm = if steps == 0 {
            0.0
        } else {
            states.row(steps - 1).norm()
        };

        Self {
            steps,
            nodes,
            mean_abs: sum_abs / count,
            max_abs,
            saturated_fraction: saturated as f64 / count,
            final_norm,
        }
    }

    /// True when nothing in the trajectory ever moved away from zero.
    pub fn is_silent(&self) -> bool {
        self.max_abs == 0.0
    }
}
