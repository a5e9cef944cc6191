//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the [`AppConfig`] struct, which holds the configuration parameters,
//! and a [`load_config`] function to load the configuration from a YAML file.
//!
//! # Examples
//!
//! ```no_run
//! use people_search::config::{AppConfig, load_config};
//!
//! let config: AppConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```
//!
//! The API key may also come from the environment: `OPEN_AI_API_KEY` (or
//! `OPENAI_API_KEY`) overrides whatever the file says.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use tracing::debug;

use crate::{
    error::{Error, Result},
    llm::{
        LlmModel,
        registry::{GPT_4O, ModelRegistry, TEXT_EMBEDDING_3_LARGE},
    },
    vector_store::SearchDefaults,
};

pub const API_KEY_ENV: &str = "OPEN_AI_API_KEY";
const API_KEY_ENV_FALLBACK: &str = "OPENAI_API_KEY";

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct AppConfig {
    /// The API key used to authenticate requests to the API.
    #[serde(default)]
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// Registry id of the model used for extraction, relevancy and answers.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Registry id of the model used to embed profiles and queries.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Directory of plain-text profiles ingested before a search.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub search: SearchDefaults,
}

fn default_chat_model() -> String {
    GPT_4O.to_string()
}

fn default_embedding_model() -> String {
    TEXT_EMBEDDING_3_LARGE.to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_timeout(),
            data_dir: None,
            search: SearchDefaults::default(),
        }
    }
}

impl AppConfig {
    pub fn chat_model(&self) -> Result<&'static LlmModel> {
        Self::registry_model(&self.chat_model)
    }

    pub fn embedding_model(&self) -> Result<&'static LlmModel> {
        Self::registry_model(&self.embedding_model)
    }

    fn registry_model(id: &str) -> Result<&'static LlmModel> {
        ModelRegistry::find(id).ok_or_else(|| Error::Config(format!("unknown model id: {id}")))
    }

    /// Replace the API key with the environment's, if one is set.
    pub fn apply_env(&mut self) {
        let key = env::var(API_KEY_ENV).or_else(|_| env::var(API_KEY_ENV_FALLBACK));
        if let Ok(key) = key.map(|k| k.trim().to_string()) {
            if !key.is_empty() {
                debug!("Using API key from environment");
                self.api_key = key;
            }
        }
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML is invalid, or a
/// configured model id is not in the registry.
pub fn load_config(file: &str) -> Result<AppConfig> {
    debug!("Loading config: {file}");
    let content = fs::read_to_string(file)?;
    let mut config: AppConfig = serde_yaml::from_str(&content)?;
    config.chat_model()?;
    config.embedding_model()?;
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com"
chat_model: "gpt-4"
data_dir: "static-data/users"
search:
  top_k: 3
  threshold: 0.5
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.api_base, "http://example.com");
        assert_eq!(config.chat_model, "gpt-4");
        assert_eq!(config.embedding_model, TEXT_EMBEDDING_3_LARGE);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.data_dir, Some(PathBuf::from("static-data/users")));
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.threshold, 0.5);
    }

    #[test]
    fn test_load_config_unknown_model() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "api_base: \"http://example.com\"\nchat_model: \"gpt-5-ultra\""
        )
        .unwrap();

        let err = load_config(temp_file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_config_invalid_file() {
        assert!(load_config("non/existent/path").is_err());
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();
        assert!(load_config(temp_file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn default_config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&AppConfig::default()).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, AppConfig::default());
    }
}
