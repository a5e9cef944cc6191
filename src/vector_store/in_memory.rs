//! In-memory vector store with cosine similarity search.
//!
//! Entries live in a plain `Vec` behind an async `RwLock`; searches are a
//! linear scan (parallelised with rayon). Nothing is persisted.

use async_trait::async_trait;
use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    Document, DocumentSearchResponse, MemoryVector, Metadata, VectorRecord, VectorSearchResponse,
    VectorStoreClient, VectorStoreProvider,
};
use crate::{
    error::{Error, Result},
    llm::{EmbeddingRequest, LlmModel, LlmService},
};

/// Candidates fetched per result before threshold and metadata filtering.
const OVERSAMPLE: usize = 2;
/// Minimum candidate pool for raw vector searches.
const MIN_VECTOR_CANDIDATES: usize = 50;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    content: String,
    embedding: Vec<f32>,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct Store {
    /// Insertion order; ties in score keep this order.
    entries: Vec<Entry>,
    dimension: Option<usize>,
}

impl Store {
    fn upsert(&mut self, entry: Entry) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != entry.embedding.len() => {
                return Err(Error::DimensionMismatch {
                    expected,
                    got: entry.embedding.len(),
                });
            }
            None => self.dimension = Some(entry.embedding.len()),
            _ => {}
        }

        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Every vector of a batch must share one dimension, the store's if set.
    fn check_batch<'a>(&self, vectors: impl IntoIterator<Item = &'a [f32]>) -> Result<()> {
        let mut expected = self.dimension;
        for v in vectors {
            match expected {
                Some(expected) if expected != v.len() => {
                    return Err(Error::DimensionMismatch {
                        expected,
                        got: v.len(),
                    });
                }
                None => expected = Some(v.len()),
                _ => {}
            }
        }
        Ok(())
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != query.len() => Err(Error::DimensionMismatch {
                expected,
                got: query.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Every entry scored against `query`, best first, at most `limit`.
    fn ranked(&self, query: &[f32], limit: usize) -> Vec<(&Entry, f32)> {
        let query_norm = l2_norm(query);
        let mut scored: Vec<(&Entry, f32)> = self
            .entries
            .par_iter()
            .map(|e| (e, similarity(query, query_norm, &e.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Stores profile documents in memory and embeds them through [`LlmService`].
pub struct InMemoryVectorStoreClient {
    llm: LlmService,
    embedding_model: LlmModel,
    state: RwLock<Option<Store>>,
}

impl InMemoryVectorStoreClient {
    /// An uninitialised store that embeds with `embedding_model`.
    pub fn new(llm: LlmService, embedding_model: LlmModel) -> Self {
        Self {
            llm,
            embedding_model,
            state: RwLock::new(None),
        }
    }

    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let response = self
            .llm
            .execute_embedding(&EmbeddingRequest {
                input,
                priority: vec![self.embedding_model.clone()],
                ..Default::default()
            })
            .await?;
        Ok(response.embeddings)
    }
}

/// Key for a document: `metadata.uuid`, then `metadata.id`, then a fresh uuid.
fn document_key(doc: &Document) -> String {
    ["uuid", "id"]
        .iter()
        .filter_map(|k| doc.metadata.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine distance mapped to a `[0, 1]` similarity: `1 - (1 - cos) / 2`.
///
/// Zero vectors have no direction and score 0.
fn similarity(query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
    let target_norm = l2_norm(target);
    if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
        return 0.0;
    }
    let cosine: f32 = query.iter().zip(target).map(|(a, b)| a * b).sum::<f32>()
        / (query_norm * target_norm);
    distance_to_similarity(1.0 - cosine)
}

fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Does `metadata` satisfy every key of `filter`?
///
/// - the key must be present;
/// - array metadata matches a scalar filter value it contains, or an array
///   filter value it shares at least one element with;
/// - anything else must be equal.
pub fn matches_metadata_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, wanted)| {
        let Some(actual) = metadata.get(key) else {
            return false;
        };
        match (actual, wanted) {
            (Value::Array(have), Value::Array(want)) => want.iter().any(|w| have.contains(w)),
            (Value::Array(have), scalar) => have.contains(scalar),
            (value, wanted) => value == wanted,
        }
    })
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

#[async_trait]
impl VectorStoreClient for InMemoryVectorStoreClient {
    fn provider(&self) -> VectorStoreProvider {
        VectorStoreProvider::InMemory
    }

    async fn initialize(&self) -> Result<()> {
        info!("InMemoryVectorStoreClient | Initializing vector store for user search...");
        let mut state = self.state.write().await;
        if state.is_none() {
            *state = Some(Store::default());
        }
        info!("InMemoryVectorStoreClient | Vector store initialized successfully");
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn size(&self) -> Result<usize> {
        let state = self.state.read().await;
        let store = state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(store.entries.len())
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<()> {
        if !self.is_initialized().await {
            return Err(Error::NotInitialized);
        }
        info!(
            "InMemoryVectorStoreClient | Adding {} user documents...",
            documents.len()
        );

        let texts = documents.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self
            .embed(texts)
            .await
            .inspect_err(|e| error!("Failed to add documents: {e}"))?;

        if embeddings.len() != documents.len() {
            return Err(Error::MalformedOutput(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut state = self.state.write().await;
        let store = state.as_mut().ok_or(Error::NotInitialized)?;
        store.check_batch(embeddings.iter().map(Vec::as_slice))?;
        for (doc, embedding) in documents.iter().zip(embeddings) {
            store.upsert(Entry {
                id: document_key(doc),
                content: doc.page_content.clone(),
                embedding,
                metadata: doc.metadata.clone(),
            })?;
        }

        info!(
            "InMemoryVectorStoreClient | Current total documents count: {}",
            store.entries.len()
        );
        Ok(())
    }

    /// Natural-language search such as "data scientists in Germany".
    ///
    /// Fetches `2 * top_k` nearest candidates, then drops those under
    /// `threshold` or failing the metadata filter, then keeps `top_k`.
    async fn search_documents(
        &self,
        query: &str,
        top_k: usize,
        metadata_filter: Option<&Metadata>,
        threshold: f32,
    ) -> Result<Vec<DocumentSearchResponse>> {
        if !self.is_initialized().await {
            return Err(Error::NotInitialized);
        }
        info!("Searching for: \"{query}\" (topK: {top_k}, threshold: {threshold})");

        let query_vector = self
            .embed(vec![query.to_string()])
            .await
            .inspect_err(|e| error!("Document search failed: {e}"))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedOutput("no embedding for query".into()))?;

        let state = self.state.read().await;
        let store = state.as_ref().ok_or(Error::NotInitialized)?;
        store.check_query(&query_vector)?;

        let results: Vec<DocumentSearchResponse> = store
            .ranked(&query_vector, top_k.saturating_mul(OVERSAMPLE))
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .filter(|(entry, _)| {
                metadata_filter.is_none_or(|f| matches_metadata_filter(&entry.metadata, f))
            })
            .take(top_k)
            .map(|(entry, score)| DocumentSearchResponse {
                id: entry.id.clone(),
                score,
                document: Document {
                    page_content: entry.content.clone(),
                    metadata: entry.metadata.clone(),
                },
            })
            .collect();

        info!("Found {} matching users", results.len());
        Ok(results)
    }

    async fn upsert_vector(&self, record: VectorRecord) -> Result<()> {
        debug!(
            "Upserting vector for ID: {} ({}D)",
            record.id,
            record.vector.len()
        );
        let mut metadata = record.metadata;
        metadata.insert("id".into(), Value::String(record.id.clone()));
        metadata.insert("upsertedAt".into(), now());

        let mut state = self.state.write().await;
        let store = state.as_mut().ok_or(Error::NotInitialized)?;
        store.upsert(Entry {
            id: record.id,
            content: record.text,
            embedding: record.vector,
            metadata,
        })
    }

    async fn upsert_vectors_batch(&self, records: Vec<VectorRecord>) -> Result<()> {
        info!("Batch upserting {} vectors...", records.len());
        let mut state = self.state.write().await;
        let store = state.as_mut().ok_or(Error::NotInitialized)?;
        store.check_batch(records.iter().map(|r| r.vector.as_slice()))?;
        let stamp = now();
        for record in records {
            let mut metadata = record.metadata;
            metadata.insert("id".into(), Value::String(record.id.clone()));
            metadata.insert("batchUpsertedAt".into(), stamp.clone());
            store.upsert(Entry {
                id: record.id,
                content: record.text,
                embedding: record.vector,
                metadata,
            })?;
        }
        Ok(())
    }

    async fn get_vector(&self, id: &str) -> Result<Option<VectorSearchResponse>> {
        let state = self.state.read().await;
        let store = state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(store
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| VectorSearchResponse {
                id: e.id.clone(),
                score: 1.0,
                text: e.content.clone(),
                metadata: e.metadata.clone(),
            }))
    }

    async fn search_vector(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResponse>> {
        let state = self.state.read().await;
        let store = state.as_ref().ok_or(Error::NotInitialized)?;
        store.check_query(query)?;

        let results: Vec<VectorSearchResponse> = store
            .ranked(query, top_k.max(MIN_VECTOR_CANDIDATES))
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .take(top_k)
            .map(|(e, score)| VectorSearchResponse {
                id: e.id.clone(),
                score,
                text: e.content.clone(),
                metadata: e.metadata.clone(),
            })
            .collect();

        debug!(
            "Found {} vectors above threshold {}",
            results.len(),
            threshold
        );
        Ok(results)
    }

    async fn delete_vector(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let store = state.as_mut().ok_or(Error::NotInitialized)?;
        let before = store.entries.len();
        store.entries.retain(|e| e.id != id);
        let deleted = store.entries.len() != before;
        debug!("Delete vector {id}: {deleted}");
        Ok(deleted)
    }

    async fn clear(&self) -> Result<()> {
        info!("Clearing all vectors from InMemoryVectorStoreClient");
        let mut state = self.state.write().await;
        let store = state.as_mut().ok_or(Error::NotInitialized)?;
        *store = Store::default();
        Ok(())
    }

    async fn all_memory_vectors(&self) -> Result<Vec<MemoryVector>> {
        let state = self.state.read().await;
        let store = state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(store
            .entries
            .iter()
            .map(|e| MemoryVector {
                id: e.id.clone(),
                content: e.content.clone(),
                embedding: e.embedding.clone(),
                metadata: e.metadata.clone(),
            })
            .collect())
    }
}
