//! Whole experiment runs: optional rewiring, normalization, the coupling
//! sweep, and the files each run leaves behind.

use tracing::{error, info};

use crate::config::NullModelConfig;
use crate::connectivity::{ConnectivityMatrix, DegreePreservation};
use crate::error::Result;
use crate::io;
use crate::paths::OutputLayout;
use crate::pool::WorkerPool;
use crate::prng::Prng;
use crate::readout::ReadoutPartition;
use crate::sweep::{ResultTable, SweepOrchestrator, TaskData};

/// Label of the run on the unmodified connectome.
pub const EMPIRICAL: &str = "empirical";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewiring {
    pub swaps: usize,
    pub preservation: DegreePreservation,
    pub seed: u64,
}

/// One independent run. Owns everything it touches, so jobs can be handed
/// to separate workers without sharing.
#[derive(Debug, Clone)]
pub struct WorkflowJob {
    pub label: String,
    pub conn: ConnectivityMatrix,
    pub data: TaskData,
    pub partition: ReadoutPartition,
    pub rewiring: Option<Rewiring>,
}

impl WorkflowJob {
    pub fn empirical(conn: ConnectivityMatrix, data: TaskData, partition: ReadoutPartition) -> Self {
        Self {
            label: EMPIRICAL.to_string(),
            conn,
            data,
            partition,
            rewiring: None,
        }
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub label: String,
    pub result: Result<ResultTable>,
}

/// `count` null-model jobs labelled `null_0 .. null_{count-1}`. Job `i` is
/// rewired with seed `base_seed + i`, so a batch is reproducible whatever
/// the worker count.
pub fn null_model_jobs(
    conn: &ConnectivityMatrix,
    data: &TaskData,
    partition: &ReadoutPartition,
    nulls: NullModelConfig,
    base_seed: u64,
) -> Vec<WorkflowJob> {
    (0..nulls.count)
        .map(|i| WorkflowJob {
            label: format!("null_{i}"),
            conn: conn.clone(),
            data: data.clone(),
            partition: partition.clone(),
            rewiring: Some(Rewiring {
                swaps: nulls.swaps,
                preservation: nulls.preservation,
                seed: base_seed.wrapping_add(i as u64),
            }),
        })
        .collect()
}

/// Rewire (if requested), normalize, sweep. With a layout, the rewired
/// matrix is saved as `<label>.npy` and the table as `res_<label>.csv`.
pub fn run_workflow(
    job: WorkflowJob,
    sweep: &SweepOrchestrator,
    layout: Option<&OutputLayout>,
) -> Result<ResultTable> {
    let WorkflowJob {
        label,
        mut conn,
        data,
        partition,
        rewiring,
    } = job;

    if let Some(r) = rewiring {
        let mut rng = Prng::new(r.seed);
        let report = conn.randomize(r.swaps, r.preservation, &mut rng);
        info!(
            label = %label,
            attempted = report.attempted,
            accepted = report.accepted,
            "connectome rewired"
        );
        if let Some(layout) = layout {
            io::save_matrix(layout.matrix_file(&label), conn.weights())?;
        }
    }

    conn.scale_and_normalize()?;
    let table = sweep.run(&conn, &data, &partition)?;

    if let Some(layout) = layout {
        let path = layout.results_file(&label);
        io::write_results_csv(&path, &table)?;
        info!(label = %label, rows = table.len(), path = %path.display(), "results written");
    }
    Ok(table)
}

/// Runs every job on the pool. Outcomes are in job order; one failed job
/// does not stop the others.
pub fn run_batch(
    jobs: Vec<WorkflowJob>,
    sweep: &SweepOrchestrator,
    layout: Option<&OutputLayout>,
    pool: &WorkerPool,
) -> Vec<JobOutcome> {
    let labels: Vec<String> = jobs.iter().map(|j| j.label.clone()).collect();
    let results = pool.run(jobs, |job| run_workflow(job, sweep, layout));

    labels
        .into_iter()
        .zip(results)
        .map(|(label, result)| {
            if let Err(e) = &result {
                error!(label = %label, error = %e, "workflow job failed");
            }
            JobOutcome { label, result }
        })
        .collect()
}
