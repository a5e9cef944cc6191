//! # Ingest and query pipeline
//!
//! [`PeopleSearch`] ties the services together:
//!
//! ```text
//! ingest:  *.txt / *.md ──extract (LLM)──> User ──save──> vector store
//!
//! search:  query ──similarity──> hits ──relevancy (LLM)──> HIGH / MID hits
//!                                          │
//!                       final answer (LLM) ┴ explanation per hit (LLM)
//! ```
//!
//! The model calls for a batch of files or hits are issued concurrently.

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    user::{UserRelevancy, UserService},
    vector_store::{DocumentSearchResponse, Metadata},
};

/// Used when the model cannot explain a match.
pub const FALLBACK_MATCH_REASON: &str = "Matched on profile similarity.";

/// Outcome of a directory ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResults {
    /// Profiles saved from plain-text files.
    pub plain_text: usize,
    /// Files considered.
    pub total: usize,
    /// Files that could not be read, extracted, or were incomplete.
    pub failed: usize,
}

/// One person in a search answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub role: Option<String>,
    pub skills: Vec<String>,
    pub experience: Option<String>,
    pub interests: Vec<String>,
    pub previous_companies: Vec<String>,
    pub description: String,
    /// Similarity as a percentage.
    pub match_score: u32,
    pub match_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_found: usize,
    pub final_answer: String,
    pub processing_time_ms: u128,
}

enum FileOutcome {
    Saved,
    Failed,
}

/// Ingest and search over one [`UserService`].
#[derive(Clone)]
pub struct PeopleSearch {
    users: UserService,
    show_progress: bool,
}

impl PeopleSearch {
    pub fn new(users: UserService) -> Self {
        Self {
            users,
            show_progress: false,
        }
    }

    /// Draw a progress bar while ingesting.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// Extract and save every `.txt` / `.md` file directly inside `dir`.
    ///
    /// A file that fails is logged and counted; it never stops the others.
    ///
    /// The store is initialised first, so a sync that saves nothing still
    /// leaves it searchable.
    ///
    /// # Errors
    /// When the store cannot be initialised or `dir` cannot be listed.
    pub async fn sync_plain_text(&self, dir: &Path) -> Result<SyncResults> {
        info!("Syncing plain-text profiles from {}", dir.display());
        self.users.store().initialize(None).await?;
        let files = profile_files(dir).await?;

        let progress = if self.show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar.set_message("extracting profiles");
            bar
        } else {
            ProgressBar::hidden()
        };

        let outcomes = join_all(files.iter().map(|path| {
            let progress = progress.clone();
            async move {
                let outcome = self.ingest_file(path).await;
                progress.inc(1);
                outcome
            }
        }))
        .await;
        progress.finish_and_clear();

        let mut results = SyncResults {
            total: files.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                FileOutcome::Saved => results.plain_text += 1,
                FileOutcome::Failed => results.failed += 1,
            }
        }

        info!(
            "Sync complete: {} saved, {} failed, {} total",
            results.plain_text, results.failed, results.total
        );
        Ok(results)
    }

    async fn ingest_file(&self, path: &Path) -> FileOutcome {
        let text = match fs::read_to_string(path).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("Skipping empty file {}", path.display());
                return FileOutcome::Failed;
            }
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                return FileOutcome::Failed;
            }
        };

        let mut user = match self.users.extract_user_from_plain_text(&text).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to extract a profile from {}: {e}", path.display());
                return FileOutcome::Failed;
            }
        };
        user.description = Some(text.trim().to_string());

        match self.users.save_user(user).await {
            Ok(Some(_)) => FileOutcome::Saved,
            Ok(None) => {
                warn!("Incomplete profile in {}, not saved", path.display());
                FileOutcome::Failed
            }
            Err(e) => {
                warn!("Failed to save the profile from {}: {e}", path.display());
                FileOutcome::Failed
            }
        }
    }

    /// Answer a natural-language query.
    ///
    /// Vector hits are graded by the model; only HIGH and MID hits are kept,
    /// summarised into `final_answer`, explained one by one and returned best
    /// match first.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidRequest("Query is required".into()));
        }
        info!("Searching for: \"{query}\"");

        let found = self.users.store().similarity_search(query).await?;
        info!(
            "Found {} similarity matches, now filtering by relevancy...",
            found.results.len()
        );

        let graded = join_all(found.results.into_iter().map(|hit| async move {
            let relevancy = self
                .users
                .user_relevancy_to_query(&hit.document.metadata, &hit.document.page_content, query)
                .await
                .unwrap_or_else(|e| {
                    warn!("Relevancy check failed, treating hit {} as LOW: {e}", hit.id);
                    UserRelevancy::Low
                });
            (hit, relevancy)
        }))
        .await;

        let relevant: Vec<DocumentSearchResponse> = graded
            .into_iter()
            .filter_map(|(hit, relevancy)| {
                if relevancy.is_relevant() {
                    Some(hit)
                } else {
                    info!(
                        "Filtered out {} - LOW relevancy",
                        metadata_string(&hit.document.metadata, "name").unwrap_or_default()
                    );
                    None
                }
            })
            .collect();
        info!("After relevancy filtering: {} users remain", relevant.len());

        let final_answer = self.users.users_final_answer(query, &relevant).await?;

        let mut results = join_all(relevant.iter().enumerate().map(|(i, hit)| async move {
            let reason = self
                .users
                .user_match_explanation(&hit.document.metadata, &hit.document.page_content, query)
                .await
                .unwrap_or_else(|e| {
                    warn!("No explanation for hit {}: {e}", hit.id);
                    FALLBACK_MATCH_REASON.to_string()
                });
            to_search_hit(i, hit, reason)
        }))
        .await;
        results.sort_by(|a, b| b.match_score.cmp(&a.match_score));

        Ok(SearchOutcome {
            query: query.to_string(),
            total_found: results.len(),
            results,
            final_answer,
            processing_time_ms: start.elapsed().as_millis(),
        })
    }
}

/// `.txt` and `.md` files directly inside `dir`, sorted by path.
async fn profile_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_profile = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
        if is_profile && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn metadata_string(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn metadata_list(metadata: &Metadata, key: &str) -> Vec<String> {
    metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn to_search_hit(index: usize, hit: &DocumentSearchResponse, match_reason: String) -> SearchHit {
    let md = &hit.document.metadata;
    SearchHit {
        id: metadata_string(md, "uuid").unwrap_or_else(|| format!("result-{index}")),
        name: metadata_string(md, "name").unwrap_or_else(|| "Unknown".to_string()),
        email: metadata_string(md, "email"),
        location: metadata_string(md, "location"),
        role: metadata_string(md, "role"),
        skills: metadata_list(md, "skills"),
        experience: metadata_string(md, "experience"),
        interests: metadata_list(md, "interests"),
        previous_companies: metadata_list(md, "previousCompanies"),
        description: hit.document.page_content.clone(),
        match_score: (hit.score.clamp(0.0, 1.0) * 100.0).round() as u32,
        match_reason,
    }
}
