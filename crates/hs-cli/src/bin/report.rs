use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use hs_cli::init_logging;
use hs_config::{load_hyper_config, load_model_config, tree};
use hs_study::{FanovaEvaluator, MdiEvaluator, StudyStorage};

/// Report the status/progress of a hyperparameter study.
#[derive(Parser)]
#[command(name = "hs-report", version)]
struct Cli {
    /// Path to the hyperparameter configuration.
    hyperparameter: PathBuf,

    /// Model configuration; enables best-parameter export to best.yml.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Number of trees in the parameter-importance forest.
    #[arg(short = 't', long, default_value_t = 64)]
    n_trees: usize,

    /// Maximum tree depth in the parameter-importance forest.
    #[arg(short = 'd', long, default_value_t = 64)]
    max_depth: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let hyper = load_hyper_config(&cli.hyperparameter)?;
    let model = cli.model.as_ref().map(load_model_config).transpose()?;

    init_logging(None)?;

    let storage = StudyStorage::new(hyper.storage().root(&hyper.save_path))?;
    let snapshot = storage.load(&hyper.study.name)?;

    let completed = snapshot.successful_trials();
    info!(
        "Study {}: {}/{} successful trial(s), {} recorded in total",
        snapshot.name,
        completed,
        hyper.study.n_trials,
        snapshot.trials.len()
    );

    match snapshot.best_trial() {
        Some(best) => {
            info!("Best trial: {} (value {:?})", best.number, best.values);
            info!("Best parameters in the study:");
            let mut names: Vec<&String> = best.parameters.keys().collect();
            names.sort();
            for name in names {
                info!("  {name}: {}", best.parameters[name]);
            }
        }
        None if snapshot.directions.len() > 1 => {
            info!("Best trial is undefined for a multi-objective study");
        }
        None => warn!("The study has no completed trials yet"),
    }

    let summary_path = hyper.save_path.join(format!("{}.csv", snapshot.name));
    snapshot.export_summary_csv(&summary_path)?;
    info!("Saved the study summary to {}", summary_path.display());

    // Plot-ready optimization history instead of rendered figures.
    if snapshot.directions.len() == 1 && completed > 0 {
        let history_path = hyper.save_path.join("optimization_history.csv");
        snapshot.export_history_csv(&history_path)?;
        info!("Saved the optimization history to {}", history_path.display());
    }

    export_best_model(&cli, &hyper, &snapshot, model)?;
    report_importances(&cli, &snapshot, completed);

    Ok(())
}

/// Write the model document with every matched leaf overwritten by the best
/// observed value.
fn export_best_model(
    cli: &Cli,
    hyper: &hs_config::HyperConfig,
    snapshot: &hs_study::StudySnapshot,
    model: Option<serde_yaml::Value>,
) -> anyhow::Result<()> {
    let Some(mut model) = model else {
        warn!("A model configuration is required to save the best hyperparameters");
        warn!("  re-run with --model; see hs-report --help");
        return Ok(());
    };
    let Some(best) = snapshot.best_trial() else {
        warn!("No completed trials; skipping best-parameter export");
        return Ok(());
    };

    for name in hyper.study.parameters.keys() {
        let Some(value) = best.parameters.get(name) else {
            continue;
        };
        if name.contains(':') {
            tree::update_colon_path(&mut model, name, value.to_yaml());
        } else if model.get(name.as_str()).is_some() {
            tree::update_path(&mut model, &[name.as_str()], value.to_yaml());
        }
    }

    let best_path = hyper.save_path.join("best.yml");
    std::fs::write(&best_path, serde_yaml::to_string(&model)?)?;
    info!(
        "Saved the best model configuration to {} (from {})",
        best_path.display(),
        cli.model
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
    Ok(())
}

/// Compute both importance scores; failures downgrade to warnings so the
/// rest of the report stands.
fn report_importances(cli: &Cli, snapshot: &hs_study::StudySnapshot, completed: usize) {
    if completed < 2 {
        info!("Skipping parameter importance: fewer than two completed trials");
        return;
    }

    info!("Computing fANOVA importances, this may take a while");
    let fanova = FanovaEvaluator::default().evaluate(snapshot);
    info!("Computing MDI importances, this may take a while");
    let mdi = MdiEvaluator::new(cli.n_trees, cli.max_depth).evaluate(snapshot);

    match (fanova, mdi) {
        (Ok(fanova), Ok(mdi)) => {
            let mdi: HashMap<String, f64> = mdi.into_iter().collect();
            info!("  Parameter\tfANOVA\tMDI");
            for (name, score) in &fanova {
                let mdi_score = mdi.get(name).copied().unwrap_or(0.0);
                info!("  {name}\t{score:.6}\t{mdi_score:.6}");
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to compute parameter importance: {e}");
        }
    }
}
