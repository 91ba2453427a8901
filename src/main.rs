use std::{env, path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;
use spike_codegen::{
    codegen::{write_module_sources, Backend},
    config::{load_model, Preferences},
    error::SpikeCodegenError,
    merged::ModelMerged,
};


const USAGE: &str = "Usage: spike_codegen <model.toml> <output directory> [preferences.toml]";

fn generate(model_path: &PathBuf, output: &PathBuf, preferences: Preferences) -> Result<(), SpikeCodegenError> {
    let mut model = load_model(model_path)?;
    model.finalise()?;

    let merged = ModelMerged::new(&model)?;
    let backend = Backend::new(preferences)?;
    let files = write_module_sources(&merged, &backend, output)?;

    for file in files {
        println!("{}", output.join(file).display());
    }

    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 || args.len() > 4 {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    }

    let preferences = match args.get(3) {
        Some(path) => match Preferences::load(&PathBuf::from(path)) {
            Ok(preferences) => preferences,
            Err(e) => {
                eprintln!("Cannot read preferences '{}': {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Preferences::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&preferences.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let model_path = PathBuf::from(&args[1]);
    let output = PathBuf::from(&args[2]);

    match generate(&model_path, &output, preferences) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}: {}", model_path.display(), e);
            ExitCode::FAILURE
        }
    }
}
