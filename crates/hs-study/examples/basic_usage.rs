use hs_study::*;
use hs_types::{Direction, ObjectiveValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Hypersweep basic usage example");

    // Define a small search space
    let space = SearchSpace::new()
        .add_float("x", -4.0, 4.0)
        .add_int("width", 1, 8);
    println!("Search space with {} parameters", space.parameters.len());

    // Random sampling with a fixed seed for reproducibility
    let strategy = RandomSearch::new(space, Some(42));

    // Local JSON storage under the system temp dir
    let storage = StudyStorage::new(std::env::temp_dir().join("hypersweep-example"))?;

    let mut study = Study::create(
        StudyOptions::new("basic_usage")
            .with_directions(vec![Direction::Minimize])
            .with_metrics(vec!["loss".to_string()]),
        Box::new(strategy),
        Box::new(NopPruner),
        storage,
        false,
    )?;

    // Run a handful of trials against an inline objective
    for _ in 0..10 {
        study.optimize_one(
            &mut |ctx| {
                let x = ctx.suggest_float("x")?;
                let width = ctx.suggest_int("width")? as f64;
                Ok(ObjectiveValue::Single(x * x + (width - 3.0).abs()))
            },
            None,
        )?;
    }
    println!("Ran {} trials", study.successful_trials());

    if let Some(best) = study.best_trial() {
        println!("Best trial: {} with loss {:.4}", best.number, best.values[0]);
        for (name, value) in &best.parameters {
            println!("  {name}: {value}");
        }
    }

    Ok(())
}
