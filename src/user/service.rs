use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{RELEVANCY_SCHEMA, USER_SCHEMA, User, UserRelevancy, is_invalid_field};
use crate::{
    error::Result,
    llm::{
        LlmModel, LlmService, ModelConfig, StructuredOutputRequest, TextRequest,
        registry::ModelRegistry,
    },
    vector_store::{
        AddDocumentsRequest, Document, DocumentSearchResponse, Metadata, VectorStoreProvider,
        VectorStoreService,
    },
};

pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant users matching your query. \
Please try a different search term or check if users have been added to the system.";

/// Extracts, stores and grades user profiles.
///
/// Saved users are kept in memory next to their vector-store documents.
/// Clones share the same user list.
#[derive(Clone)]
pub struct UserService {
    llm: LlmService,
    store: VectorStoreService,
    priority: Vec<LlmModel>,
    users: Arc<RwLock<Vec<User>>>,
}

impl UserService {
    /// A service that asks GPT-4o first and GPT-4 second.
    pub fn new(llm: LlmService, store: VectorStoreService) -> Self {
        Self {
            llm,
            store,
            priority: vec![
                ModelRegistry::gpt_4o().clone(),
                ModelRegistry::gpt_4().clone(),
            ],
            users: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Put `model` at the front of the priority list.
    pub fn with_chat_model(mut self, model: LlmModel) -> Self {
        self.priority.retain(|m| m.id != model.id);
        self.priority.insert(0, model);
        self
    }

    pub fn store(&self) -> &VectorStoreService {
        &self.store
    }

    /// Extract a profile from free text.
    ///
    /// # Parameters
    /// - `text`: anything from a CV paragraph to an email signature.
    ///
    /// # Returns
    /// - The extracted [`User`]; fields the model could not determine are `None`.
    pub async fn extract_user_from_plain_text(&self, text: &str) -> Result<User> {
        info!("UserService | Extracting user data from text");
        debug!("UserService | Text to extract from:\n{text}");

        let prompt = format!(
            r#"
You are an expert data extraction agent specialized in extracting user information from various text formats.

Your task is to:
1. Carefully analyze the provided text
2. Extract relevant user information according to the provided schema
3. Return structured data that matches the schema exactly
4. If a field **cannot be confidently determined**, set it to null
5. Be precise and conservative - only extract information that is clearly stated

The text may contain:
- Personal information (name, email, location)
- Professional details (job title, company, experience)
- Skills and technologies
- Additional notes or context

Extract all relevant information and structure it according to the provided schema.

Text to analyze:
{text}
"#
        );

        let user: User = self
            .llm
            .generate_structured(&StructuredOutputRequest {
                prompt,
                schema_name: "user".into(),
                schema: USER_SCHEMA.clone(),
                priority: self.priority.clone(),
                config: ModelConfig {
                    temperature: Some(0.0),
                    max_tokens: Some(2000),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .inspect_err(|e| error!("UserService | Failed to extract user data: {e}"))?;

        info!(
            "UserService | Successfully extracted user data for {}",
            user.display_name()
        );
        Ok(user)
    }

    /// Store a profile in the vector store.
    ///
    /// Returns `Ok(None)` without touching the store when name, role or
    /// location is missing. Otherwise the saved user carries a uuid,
    /// `created_at` (kept if already set) and a fresh `updated_at`.
    pub async fn save_user(&self, user: User) -> Result<Option<User>> {
        if is_invalid_field(user.name.as_deref())
            || is_invalid_field(user.role.as_deref())
            || is_invalid_field(user.location.as_deref())
        {
            warn!(
                "UserService | Incomplete user data, cannot save: {}",
                serde_json::to_string(&user).unwrap_or_default()
            );
            return Ok(None);
        }

        let now = Utc::now();
        let user = User {
            uuid: user.uuid.or_else(|| Some(Uuid::new_v4().to_string())),
            created_at: user.created_at.or(Some(now)),
            updated_at: Some(now),
            ..user
        };

        info!(
            "UserService | Saving user {}({}) via VectorStoreService...",
            user.display_name(),
            user.id.as_deref().unwrap_or("-")
        );

        self.store
            .add_documents(AddDocumentsRequest {
                documents: vec![user_to_document(&user)],
                provider: Some(VectorStoreProvider::InMemory),
                ..Default::default()
            })
            .await
            .inspect_err(|e| error!("UserService | Failed to save user: {e}"))?;

        self.users.write().await.push(user.clone());
        info!(
            "UserService | Successfully saved user {}",
            user.display_name()
        );
        Ok(Some(user))
    }

    /// Save concurrently; incomplete users are skipped, the first error wins.
    pub async fn save_users(&self, users: Vec<User>) -> Result<Vec<User>> {
        let saved = join_all(users.into_iter().map(|u| self.save_user(u))).await;
        let mut out = Vec::new();
        for user in saved {
            if let Some(user) = user? {
                out.push(user);
            }
        }
        Ok(out)
    }

    /// Look a saved user up by source id or uuid.
    pub async fn user_by_id(&self, id: &str) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.id.as_deref() == Some(id) || u.uuid.as_deref() == Some(id))
            .cloned()
    }

    pub async fn all_users(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    /// Ask the model whether a hit really answers the query.
    ///
    /// An answer outside HIGH/MID/LOW counts as LOW.
    pub async fn user_relevancy_to_query(
        &self,
        metadata: &Metadata,
        text: &str,
        query: &str,
    ) -> Result<UserRelevancy> {
        let name = metadata_str(metadata, "name").unwrap_or("Unknown");
        debug!("UserService | Grading relevancy of {name} for \"{query}\"");

        let prompt = format!(
            r#"
A user searched a people directory for: "{query}"

Candidate profile:
{text}

Classify how well this person matches the search:
- HIGH: clearly satisfies every requirement in the query
- MID: satisfies the main requirement but not all of them, or only partially
- LOW: does not match the query

Answer with the relevancy only."#
        );

        let value = self
            .llm
            .generate_structured_output(&StructuredOutputRequest {
                prompt,
                schema_name: "user_relevancy".into(),
                schema: RELEVANCY_SCHEMA.clone(),
                priority: self.priority.clone(),
                config: ModelConfig {
                    temperature: Some(0.0),
                    max_tokens: Some(20),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .inspect_err(|e| error!("UserService | Relevancy check failed for {name}: {e}"))?;

        let relevancy = value
            .get("relevancy")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(UserRelevancy::Low);
        debug!("UserService | {name} is {relevancy} for \"{query}\"");
        Ok(relevancy)
    }

    /// One or two sentences on why a hit matches the query.
    pub async fn user_match_explanation(
        &self,
        metadata: &Metadata,
        text: &str,
        query: &str,
    ) -> Result<String> {
        let name = metadata_str(metadata, "name").unwrap_or("this person");
        let prompt = format!(
            r#"
A user searched a people directory for: "{query}"

Matching profile of {name}:
{text}

In one or two sentences, explain why {name} matches this search. Mention the specific skills, role, location or experience that fit. Do not repeat the query verbatim."#
        );

        let explanation = self
            .llm
            .generate_text(&TextRequest {
                prompt,
                priority: self.priority.clone(),
                config: ModelConfig {
                    temperature: Some(0.3),
                    max_tokens: Some(150),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .inspect_err(|e| error!("UserService | Match explanation failed for {name}: {e}"))?;
        Ok(explanation.trim().to_string())
    }

    /// Summarise the hits that survived relevancy filtering into an answer.
    ///
    /// No hits gives a fixed apology without calling the model.
    pub async fn users_final_answer(
        &self,
        query: &str,
        results: &[DocumentSearchResponse],
    ) -> Result<String> {
        info!("UserService | Generating final answer for query: \"{query}\"");
        if results.is_empty() {
            return Ok(NO_RESULTS_ANSWER.to_string());
        }
        info!("Processing {} user profiles...", results.len());

        let profiles = results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "--- User Profile {} (Similarity Score: {}%) ---\n{}\n",
                    i + 1,
                    (r.score * 100.0).round() as i64,
                    r.document.page_content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"
You are an intelligent search assistant for a user profile database. A user has searched for: "{query}"

I found {count} user profile(s) using vector similarity search:

{profiles}

IMPORTANT: The similarity scores are based on vector embeddings and may not always reflect true relevance. Please carefully analyze each user profile to determine if they actually match the query requirements.

Instructions:
1. Carefully examine each user profile to verify if they truly match the query requirements
2. Identify which users (if any) best match the query requirements
3. Provide specific details about the matching users (names, locations, skills, experience, etc.)
4. If multiple users match, present them in order of actual relevance (not just similarity score)
5. If no users truly match the query, clearly state this and suggest alternative search terms
6. Keep the response natural, conversational, and helpful

Your response:"#,
            count = results.len()
        );

        let answer = self
            .llm
            .generate_text(&TextRequest {
                prompt,
                priority: self.priority.clone(),
                config: ModelConfig {
                    temperature: Some(0.3),
                    max_tokens: Some(1000),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .inspect_err(|e| error!("UserService | Failed to generate final answer: {e}"))?;

        info!("UserService | Final answer generated successfully");
        Ok(answer)
    }
}

fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

/// The text that gets embedded for a user, one `Label: value` per line.
pub fn user_to_searchable_text(user: &User) -> String {
    let mut parts = Vec::new();

    if let Some(d) = user.description.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Description: {d}"));
    }
    if let Some(id) = user.id.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("user {id}"));
    }
    for (label, value) in [
        ("Name", &user.name),
        ("Email", &user.email),
        ("Role", &user.role),
        ("Location", &user.location),
    ] {
        if let Some(v) = value.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("{label}: {v}"));
        }
    }
    for (label, list) in [
        ("Skills", &user.skills),
        ("Previous Companies", &user.previous_companies),
        ("Interests", &user.interests),
    ] {
        if let Some(items) = list.as_ref().filter(|l| !l.is_empty()) {
            parts.push(format!("{label}: {}", items.join(", ")));
        }
    }
    if let Some(e) = user.experience.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Experience: {e}"));
    }

    parts.join("\n")
}

/// Vector-store document for a user. The metadata carries the fields shown
/// in search results so a hit never needs a second lookup.
pub fn user_to_document(user: &User) -> Document {
    let mut metadata = Metadata::new();
    let uuid = user
        .uuid
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    metadata.insert("uuid".into(), Value::String(uuid));

    let fields = [
        ("id", serde_json::to_value(&user.id)),
        ("name", serde_json::to_value(&user.name)),
        ("email", serde_json::to_value(&user.email)),
        ("role", serde_json::to_value(&user.role)),
        ("location", serde_json::to_value(&user.location)),
        ("skills", serde_json::to_value(&user.skills)),
        ("previousCompanies", serde_json::to_value(&user.previous_companies)),
        ("interests", serde_json::to_value(&user.interests)),
        ("experience", serde_json::to_value(&user.experience)),
    ];
    for (key, value) in fields {
        metadata.insert(key.into(), value.unwrap_or(Value::Null));
    }

    Document {
        page_content: user_to_searchable_text(user),
        metadata,
    }
}
