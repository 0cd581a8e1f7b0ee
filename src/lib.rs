//! Connectome-informed reservoir computing.
//!
//! A structural connectome is used as the recurrent weight matrix of an
//! echo-state reservoir. The reservoir is driven through a set of input nodes,
//! the states of a set of output nodes are recorded, and linear readouts are
//! trained per node module. The interesting quantity is how readout
//! performance changes with the global coupling strength `alpha`, on the
//! empirical connectome and on degree-preserving null models.
//!
//! Pipeline:
//! - [`connectivity::ConnectivityMatrix`]: load, rewire, normalize, look up node sets.
//! - [`reservoir::ReservoirSimulator`]: drive the network, record output states.
//! - [`readout::ReadoutEngine`]: fit ridge readouts and score them per module.
//! - [`sweep::SweepOrchestrator`]: repeat for every coupling strength.
//! - [`workflow`] and [`pool::WorkerPool`]: empirical and null-model runs side by side.

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/connectivity.rs"]
pub mod connectivity;

#[path = "core/reservoir.rs"]
pub mod reservoir;

#[path = "core/metrics.rs"]
pub mod metrics;

#[path = "core/readout.rs"]
pub mod readout;

#[path = "core/sweep.rs"]
pub mod sweep;

#[path = "core/pool.rs"]
pub mod pool;

#[path = "core/workflow.rs"]
pub mod workflow;

pub mod config;
pub mod io;
pub mod observer;
pub mod paths;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::config::{DataConfig, NullModelConfig, SweepConfig};
    pub use crate::connectivity::{ConnectivityMatrix, DegreePreservation, NodeId};
    pub use crate::error::{Error, Result};
    pub use crate::metrics::{Metric, MetricKind, MetricSpec, MultiOutput, NonNegative};
    pub use crate::pool::WorkerPool;
    pub use crate::prng::Prng;
    pub use crate::readout::{
        select_model, train_test_split, Estimator, ReadoutEngine, ReadoutPartition, SplitPolicy,
        Targets,
    };
    pub use crate::reservoir::{Activation, InputWeights, ReservoirSimulator};
    pub use crate::sweep::{ResultRow, ResultTable, SweepOrchestrator, TaskData};
    pub use crate::workflow::{null_model_jobs, run_batch, run_workflow, WorkflowJob};
}
