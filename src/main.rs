use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use connres::config::{DataConfig, SweepConfig};
use connres::connectivity::ConnectivityMatrix;
use connres::io;
use connres::paths::OutputLayout;
use connres::pool::WorkerPool;
use connres::readout::ReadoutPartition;
use connres::sweep::{SweepOrchestrator, TaskData};
use connres::workflow::{null_model_jobs, run_batch, WorkflowJob};
use connres::{Error, Result};

#[derive(Parser)]
#[command(name = "connres", version, about = "Coupling sweeps of connectome-based reservoirs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the empirical sweep and any configured null models.
    Run {
        /// JSON sweep configuration.
        #[arg(long)]
        config: PathBuf,
        /// Override the number of null models.
        #[arg(long)]
        null_models: Option<usize>,
        /// Override the worker count.
        #[arg(long)]
        workers: Option<usize>,
        /// Override the output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the default configuration as JSON.
    DefaultConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run {
            config,
            null_models,
            workers,
            output_dir,
        } => run(config, null_models, workers, output_dir),
        Command::DefaultConfig => print_default_config(),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "connres failed");
            ExitCode::FAILURE
        }
    }
}

fn print_default_config() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&SweepConfig::default())?);
    Ok(())
}

fn run(
    config: PathBuf,
    null_models: Option<usize>,
    workers: Option<usize>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = SweepConfig::from_json_file(&config)?;
    if let Some(n) = null_models {
        cfg.null_models.count = n;
    }
    if let Some(n) = workers {
        cfg.workers = n;
    }
    if output_dir.is_some() {
        cfg.output_dir = output_dir;
    }
    cfg.validate()?;

    let data_cfg = cfg
        .data
        .clone()
        .ok_or_else(|| Error::InvalidInput("configuration has no `data` section".into()))?;
    let (conn, data, partition) = load_experiment(&data_cfg, &cfg)?;
    let layout = OutputLayout::new(cfg.output_dir.as_deref())?;
    info!(dir = %layout.root().display(), "writing results");

    let mut jobs = vec![WorkflowJob::empirical(conn.clone(), data.clone(), partition.clone())];
    jobs.extend(null_model_jobs(&conn, &data, &partition, cfg.null_models, cfg.seed));

    let pool = WorkerPool::new(cfg.workers);
    let sweep = SweepOrchestrator::new(cfg)?;

    let started = Instant::now();
    let outcomes = run_batch(jobs, &sweep, Some(&layout), &pool);
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    info!(
        jobs = outcomes.len(),
        failed,
        workers = pool.workers(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "processing finished"
    );

    if failed > 0 {
        return Err(Error::BatchFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

fn load_experiment(
    data_cfg: &DataConfig,
    cfg: &SweepConfig,
) -> Result<(ConnectivityMatrix, TaskData, ReadoutPartition)> {
    let mut conn = ConnectivityMatrix::new(io::load_matrix(&data_cfg.connectivity)?)?;
    match &data_cfg.cortical {
        Some(path) => conn.register_mask("ctx", "subctx", &io::load_mask(path)?)?,
        None => warn!("no cortical mask configured; only the `all` node set is available"),
    }

    let inputs = io::load_matrix(&data_cfg.inputs)?;
    let targets = io::load_targets(&data_cfg.targets)?;
    let data = TaskData::new(inputs, targets)?;

    let partition = match &data_cfg.modules {
        Some(path) => {
            let labels = io::load_labels(path)?;
            let outputs = conn.get_nodes(&cfg.output_nodes)?;
            // Labels may cover every node or just the output nodes.
            let per_output = if labels.len() == conn.n_nodes() {
                outputs.iter().map(|&i| labels[i].clone()).collect()
            } else if labels.len() == outputs.len() {
                labels
            } else {
                return Err(Error::DimensionMismatch {
                    what: "module label count",
                    expected: outputs.len(),
                    got: labels.len(),
                });
            };
            ReadoutPartition::Modules(per_output)
        }
        None => ReadoutPartition::Whole,
    };

    info!(
        n_nodes = conn.n_nodes(),
        edges = conn.n_edges(),
        steps = data.len(),
        "experiment loaded"
    );
    Ok((conn, data, partition))
}
