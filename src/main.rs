//! Main module for the People Search CLI application (ps).
//!
//! Parses the command line, loads the configuration and dispatches to the
//! library.
//!
//! # Examples
//!
//! Writing a default configuration:
//!
//! ```sh
//! ps init
//! ```
//!
//! Ingesting a directory of profiles and searching it:
//!
//! ```sh
//! ps ingest ./profiles
//! ps search "Rust engineers in Berlin" --data-dir ./profiles --top-k 3
//! ```
//!
//! Exploring the model registry:
//!
//! ```sh
//! ps models --scenario embedding
//! ps models --capability chat --task code-gen --best
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use people_search::{
    commands::{Cli, Commands},
    config::{self, AppConfig},
    default_config_path, display,
    error::{Error, Result},
    llm::{
        LlmModel, LlmTask, ModelCapability,
        registry::{ModelRegistry, ModelSelector, Scenario, UseCase},
    },
    people_search,
    vector_store::SearchDefaults,
};
use std::{
    fs,
    io::stdout,
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> ExitCode {
    let cli = Cli::parse();

    TRACING.get_or_init(|| {
        let default = if cli.verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Executes the parsed command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command fails.
async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::Init { force } => init(&config_path, force),
        Commands::Models {
            capability,
            task,
            scenario,
            best,
            cheapest,
            max_budget,
        } => models(capability, task, scenario, best, cheapest, max_budget),
        Commands::Ingest { dir } => {
            let config = load(&config_path)?;
            let ps = people_search(&config)?.with_progress(true);
            let results = ps.sync_plain_text(&dir).await?;
            display::print_sync_results(&mut stdout(), &results)?;
            Ok(())
        }
        Commands::Search {
            query,
            data_dir,
            top_k,
            threshold,
            json,
        } => {
            let mut config = load(&config_path)?;
            config.search = SearchDefaults {
                top_k: top_k.unwrap_or(config.search.top_k),
                threshold: threshold.unwrap_or(config.search.threshold),
            };
            let dir = data_dir.or_else(|| config.data_dir.clone()).ok_or_else(|| {
                Error::Config(
                    "No profiles to search: pass --data-dir or set data_dir in the config".into(),
                )
            })?;

            let ps = people_search(&config)?.with_progress(!json);
            let synced = ps.sync_plain_text(&dir).await?;
            if !json {
                display::print_sync_results(&mut stdout(), &synced)?;
            }

            let outcome = ps.search(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                display::print_search_outcome(&mut stdout(), &outcome)?;
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<AppConfig> {
    debug!("Loading config from: {}", path.display());
    let path = path
        .to_str()
        .ok_or_else(|| Error::Config(format!("Config path is not UTF-8: {}", path.display())))?;
    let config = config::load_config(path)?;
    if config.api_key.trim().is_empty() {
        return Err(Error::Config(format!(
            "No API key: set api_key in {path} or export {}",
            config::API_KEY_ENV
        )));
    }
    Ok(config)
}

/// Writes the default configuration to `path`.
///
/// # Errors
///
/// Returns an error if the file exists (without `force`), or if the directory
/// or file cannot be written.
fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        )));
    }
    if let Some(dir) = path.parent() {
        info!("Creating config directory: {}", dir.display());
        fs::create_dir_all(dir)?;
    }

    let config = AppConfig {
        data_dir: Some(PathBuf::from("profiles")),
        ..Default::default()
    };
    info!("Creating config file: {}", path.display());
    fs::write(path, serde_yaml::to_string(&config)?)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn models(
    capability: Option<ModelCapability>,
    task: Option<LlmTask>,
    scenario: Option<Scenario>,
    best: bool,
    cheapest: bool,
    max_budget: Option<f64>,
) -> Result<()> {
    let selected: Vec<&LlmModel> = match (scenario, capability) {
        (Some(scenario), _) => ModelSelector::models_for_scenario(scenario),
        (None, Some(capability)) if best => {
            let use_case = UseCase {
                task,
                max_budget,
                ..UseCase::new(capability)
            };
            ModelSelector::best_model_for_use_case(&use_case)
                .into_iter()
                .collect()
        }
        (None, Some(capability)) if cheapest => {
            ModelSelector::cheapest_by_capability_and_task(capability, task)
                .into_iter()
                .collect()
        }
        (None, capability) => ModelRegistry::all()
            .iter()
            .filter(|m| capability.is_none_or(|c| m.has_capability(c)))
            .filter(|m| task.is_none_or(|t| m.has_task(t)))
            .collect(),
    };
    display::print_models(&mut stdout(), &selected)?;
    Ok(())
}
