use automutate_core::applier::{FileMutationsApplier, FileMutationsApplierSettings};
use automutate_core::config::{
    AutomutateConfig, CommandProviderSettings, DEFAULT_CONFIG_FILE, ProviderType,
    WavesFileSettings,
};
use automutate_core::file_provider::CachingFileProviderFactory;
use automutate_core::logger::{Logger, TracingLogger};
use automutate_core::provider::{CommandMutationsProvider, MutationsProvider};
use automutate_core::runner::{
    FileErrorPolicy, MutationRunResults, RunError, RunSettings, run_mutations,
};

use anyhow::{anyhow, bail};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Applies waves of text mutations to files until the provider runs dry.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults to ./automutate.toml when present.
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    /// Command printing a mutations wave as JSON. Takes the remaining arguments.
    #[clap(long, num_args = 1.., allow_hyphen_values = true, conflicts_with = "waves_file")]
    command: Option<Vec<String>>,
    /// JSON file holding an array of mutations waves.
    #[clap(long, value_parser)]
    waves_file: Option<PathBuf>,
    #[clap(long)]
    min_waves: Option<usize>,
    #[clap(long)]
    max_waves: Option<usize>,
    /// Directory that file names in waves are relative to.
    #[clap(long, value_parser)]
    root_dir: Option<PathBuf>,
    /// Stop after the first wave in which any file fails.
    #[clap(long)]
    abort_on_error: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AutomutateConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {config_path:?}");
            AutomutateConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("Loading default configuration from {default_config_path:?}");
                AutomutateConfig::load_from_file(&default_config_path)?
            } else {
                info!("No configuration file found, using built-in defaults");
                AutomutateConfig::default()
            }
        }
    };

    if let Some(minimum) = cli.min_waves {
        config.waves.minimum = minimum;
    }
    if let Some(maximum) = cli.max_waves {
        config.waves.maximum = Some(maximum);
    }
    if let Some(root_dir) = &cli.root_dir {
        config.files.root_dir = Some(root_dir.clone());
    }
    if cli.abort_on_error {
        config.errors.on_file_error = FileErrorPolicy::Abort;
    }
    if let Some(command) = &cli.command {
        config.provider.provider_type = ProviderType::Command;
        let settings = config
            .provider
            .command_settings
            .get_or_insert_with(CommandProviderSettings::default);
        settings.command = command.clone();
    }
    if let Some(path) = &cli.waves_file {
        config.provider.provider_type = ProviderType::WavesFile;
        config.provider.waves_file_settings = Some(WavesFileSettings { path: path.clone() });
    }

    config.validate()?;
    Ok(config)
}

fn build_provider(config: &AutomutateConfig) -> Result<Arc<dyn MutationsProvider>, anyhow::Error> {
    match config.provider.provider_type {
        ProviderType::Command => {
            let settings = config
                .provider
                .command_settings
                .as_ref()
                .ok_or_else(|| anyhow!("Command settings missing for command provider"))?;
            Ok(Arc::new(CommandMutationsProvider::new(
                settings.to_provider_config(),
            )))
        }
        ProviderType::WavesFile => {
            let settings = config
                .provider
                .waves_file_settings
                .as_ref()
                .ok_or_else(|| anyhow!("Waves file settings missing for waves-file provider"))?;
            Ok(Arc::new(settings.load()?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::debug!("Effective configuration: {config:#?}");

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let mutations_applier = FileMutationsApplier::new(FileMutationsApplierSettings {
        file_provider_factory: Some(Arc::new(CachingFileProviderFactory::local(
            config.files.root_dir.clone(),
        ))),
        logger: Some(logger.clone()),
        mutator_factory: None,
    });

    let outcome = run_mutations(RunSettings {
        mutations_provider: build_provider(&config)?,
        mutations_applier: Some(Arc::new(mutations_applier)),
        logger: Some(logger),
        waves: config.waves.to_policy()?,
        on_file_error: config.errors.on_file_error,
    })
    .await;

    match outcome {
        Ok(results) => report(&results),
        Err(RunError::Aborted { source, results }) => {
            print_mutated(&results);
            Err(source.into())
        }
        Err(error) => Err(error.into()),
    }
}

fn print_mutated(results: &MutationRunResults) {
    for file_name in &results.mutated_file_names {
        println!("{file_name}");
    }
}

/// Prints mutated files on stdout and fails if any file could not be mutated.
fn report(results: &MutationRunResults) -> Result<(), anyhow::Error> {
    print_mutated(results);

    if !results.failed_file_names.is_empty() {
        for file_name in &results.failed_file_names {
            warn!("Failed to mutate {file_name}");
        }
        bail!(
            "Mutations failed for {} file(s)",
            results.failed_file_names.len()
        );
    }

    Ok(())
}
