//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use people_search::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Search { query, .. } => println!("searching for {query}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::llm::{LlmTask, ModelCapability, registry::Scenario};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to the config file. Defaults to `config.yaml` in the platform config directory.
    #[arg(long, short = 'c', global = true, env = "PS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file. Existing files are kept unless `--force`.
    Init {
        #[arg(long)]
        force: bool,
    },

    /// List registered models, optionally filtered, or pick the best one for a use case.
    #[clap(name = "models", alias = "m")]
    Models {
        /// Only models with this capability.
        #[arg(long)]
        capability: Option<ModelCapability>,

        /// Only models suited to this task.
        #[arg(long)]
        task: Option<LlmTask>,

        /// Models for a scenario, best first.
        #[arg(long, conflicts_with_all = ["capability", "task"])]
        scenario: Option<Scenario>,

        /// Print only the highest scoring model for `--capability` / `--task`.
        #[arg(long, requires = "capability")]
        best: bool,

        /// Print only the cheapest model for `--capability` / `--task`.
        #[arg(long, requires = "capability", conflicts_with = "best")]
        cheapest: bool,

        /// Upper bound on input + output cost per 1K tokens, used with `--best`.
        #[arg(long, requires = "best")]
        max_budget: Option<f64>,
    },

    /// Extract and index every `.txt` / `.md` profile in a directory.
    #[clap(name = "ingest", alias = "i")]
    Ingest {
        dir: PathBuf,
    },

    /// Ingest the data directory, then answer a natural-language query.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        /// Profiles to ingest first. Defaults to `data_dir` from the config.
        #[arg(long, short = 'd')]
        data_dir: Option<PathBuf>,

        /// Maximum number of vector hits.
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Minimum similarity (0-1) of a vector hit.
        #[arg(long, short = 't')]
        threshold: Option<f32>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}
