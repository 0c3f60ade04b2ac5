use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{info, warn};

use hs_cli::{init_logging, resolve_objective};
use hs_config::{
    config_check, load_hyper_config, load_model_config, wall_time_from_sections,
};
use hs_objective::ObjectiveAdapter;
use hs_runner::{OptimizationRunner, RunStop, WallClockBudget};
use hs_study::{
    pruner_from_config, strategy_from_config, SearchSpace, Study, StudyOptions, StudyStorage,
};
use hs_types::ConfigError;

/// Run a wall-time-budgeted hyperparameter optimization study.
#[derive(Parser)]
#[command(name = "hs-run", version)]
struct Cli {
    /// Path to the hyperparameter configuration.
    hyperparameter: PathBuf,

    /// Path to the model configuration the parameter paths index into.
    model: PathBuf,

    /// Optional PBS/SLURM job identifier; also keys this worker's ledger.
    job_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Fail fast on the configuration before any study object is touched.
    let hyper = load_hyper_config(&cli.hyperparameter)?;
    let model = load_model_config(&cli.model)?;

    std::fs::create_dir_all(&hyper.save_path)?;
    let log_file = hyper.log.then(|| hyper.save_path.join("log.txt"));
    init_logging(log_file.as_deref())?;

    info!("Saving trial details to {}", hyper.save_path.display());
    match &cli.job_id {
        Some(id) => info!("Running on PBS/SLURM batch id: {id}"),
        None => info!("Running standalone"),
    }

    config_check(&hyper, &model);

    let wall_time_secs = wall_time_from_sections(hyper.slurm.as_ref(), hyper.pbs.as_ref());

    let directions = hyper.study.direction.directions();
    let metrics: Vec<String> = hyper
        .study
        .metric
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    info!("Optimizing {:?} ({:?})", metrics, directions);

    let space = SearchSpace::from_specs(&hyper.study.parameters)?;
    let strategy = strategy_from_config(space, &hyper.study.sampler)?;
    let pruner = pruner_from_config(&hyper.study.pruner, directions[0])?;
    let storage = StudyStorage::new(hyper.storage().root(&hyper.save_path))?;

    let study = Study::create(
        StudyOptions::new(&hyper.study.name)
            .with_directions(directions)
            .with_metrics(metrics)
            .with_worker(cli.job_id.clone()),
        strategy,
        pruner,
        storage,
        true,
    )?;

    let objective_name = hyper
        .study
        .objective
        .as_deref()
        .ok_or_else(|| ConfigError::MissingKey {
            key: "study.objective".to_string(),
        })?;
    info!("Using objective {objective_name}");
    let objective = resolve_objective(objective_name, &hyper.study.metric)?;

    let adapter = ObjectiveAdapter::new(
        objective,
        model,
        hyper.study.parameters.clone(),
        hyper.study.metric.clone(),
        hyper.save_path.clone(),
    )
    .with_worker(cli.job_id.clone())
    .with_gpu(hyper.study.gpu.clone());

    let runner = OptimizationRunner::new(
        hyper.study.n_trials,
        WallClockBudget::new(wall_time_secs as f64),
    );

    // Ctrl-c requests a graceful stop; the flag is checked between trials.
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(true, Ordering::SeqCst);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let mut study = study;
        let mut runner = runner;
        let mut adapter = adapter;
        runner.run(&mut study, &mut |ctx| adapter.run_trial(ctx))
    })
    .await??;

    info!(
        "Finished with {} successful trial(s): {:?}",
        outcome.successful_trials, outcome.stop
    );
    if let RunStop::TrialFailed(message) = &outcome.stop {
        warn!("The run ended on a trial failure: {message}");
        warn!("Trials persisted before the failure remain valid");
    }

    Ok(())
}
