//! # People Search (library root)
//!
//! This crate provides the plumbing for the **`ps`** CLI: semantic search over
//! people profiles that an LLM extracts from free text.
//!
//! - Provider-neutral LLM access and model selection (`llm`).
//! - An in-memory vector store with cosine search and metadata filters (`vector_store`).
//! - Profile extraction, storage and per-hit grading (`user`).
//! - The ingest and query pipeline (`search`).
//! - CLI parsing, configuration and terminal output (`commands`, `config`, `display`).
//!
//! ## Wiring
//!
//! ```text
//! AppConfig ──> LlmService (OpenAI client) ──┬──> VectorStoreService (in-memory)
//!                                            └──> UserService ──> PeopleSearch
//! ```
//!
//! [`people_search`] builds that graph from a loaded [`config::AppConfig`].
//!
//! ```no_run
//! # async fn run() -> people_search::error::Result<()> {
//! use people_search::{config::load_config, people_search};
//!
//! let config = load_config("config.yaml")?;
//! let ps = people_search(&config)?;
//! ps.sync_plain_text(std::path::Path::new("profiles/")).await?;
//! let outcome = ps.search("Rust engineers in Berlin").await?;
//! println!("{}", outcome.final_answer);
//! # Ok(()) }
//! ```
//!
//! Nothing is persisted: every process starts with an empty store.

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod llm;
pub mod search;
pub mod user;
pub mod vector_store;

use crate::{
    config::AppConfig,
    error::{Error, Result},
    llm::LlmService,
    search::PeopleSearch,
    user::UserService,
    vector_store::VectorStoreService,
};

/// Return the per-platform configuration directory used by `ps`.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "people-search", "ps")`, e.g. `~/.config/ps` on Linux.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "people-search", "ps")
        .ok_or_else(|| Error::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// `config.yaml` inside [`config_dir`].
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.yaml"))
}

/// Build the service graph for `config`.
///
/// The store embeds with the configured embedding model and searches with
/// `config.search`; extraction and grading ask the configured chat model
/// first.
pub fn people_search(config: &AppConfig) -> Result<PeopleSearch> {
    let llm = LlmService::from_config(config)?;
    let store = VectorStoreService::in_memory(llm.clone(), config.embedding_model()?.clone())
        .with_defaults(config.search);
    let users = UserService::new(llm, store).with_chat_model(config.chat_model()?.clone());
    Ok(PeopleSearch::new(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_file_name() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("config.yaml"));
        }
    }

    #[test]
    fn builds_from_default_config() {
        let config = AppConfig {
            api_key: "test".into(),
            ..Default::default()
        };
        let ps = people_search(&config).unwrap();
        assert_eq!(ps.users().store().defaults(), config.search);
    }
}
