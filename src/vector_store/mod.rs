//! # Vector store
//!
//! Document storage with similarity search, behind a provider-neutral
//! [`VectorStoreClient`] trait. [`VectorStoreService`] keeps one client per
//! [`VectorStoreProvider`] and adds request validation, defaults, automatic
//! initialisation and timing on top.
//!
//! Only the in-memory provider has a client ([`InMemoryVectorStoreClient`]);
//! the other providers exist so callers can name them and get a clean
//! "no client" error.
//!
//! ## Scores
//! Every score handed out by this module is a similarity in `[0, 1]`,
//! higher meaning closer.

pub(crate) mod in_memory;
mod service;

pub use in_memory::{InMemoryVectorStoreClient, matches_metadata_filter};
pub use service::VectorStoreService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// Free-form document metadata (a JSON object).
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorStoreProvider {
    InMemory,
    #[serde(rename = "postgresql")]
    PostgreSql,
    Milvus,
    Chroma,
    Pinecone,
}

impl fmt::Display for VectorStoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VectorStoreProvider::InMemory => "in-memory",
            VectorStoreProvider::PostgreSql => "postgresql",
            VectorStoreProvider::Milvus => "milvus",
            VectorStoreProvider::Chroma => "chroma",
            VectorStoreProvider::Pinecone => "pinecone",
        })
    }
}

/// A piece of text plus the metadata used for filtering and display.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub page_content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResponse {
    pub id: String,
    /// Similarity in `[0, 1]`.
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSearchResponse {
    pub id: String,
    /// Similarity in `[0, 1]`.
    pub score: f32,
    pub document: Document,
}

/// A stored entry with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryVector {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// Input for a pre-embedded upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// Search defaults used when a request leaves `top_k` or `threshold` unset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub top_k: usize,
    pub threshold: f32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorStoreConfig {
    /// Documents per embedding call when adding.
    pub batch_size: Option<usize>,
    /// `Some(false)` turns off initialise-on-first-write.
    pub auto_initialize: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AddDocumentsRequest {
    pub documents: Vec<Document>,
    pub provider: Option<VectorStoreProvider>,
    pub config: VectorStoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddDocumentsResponse {
    pub success: bool,
    pub documents_added: usize,
    pub total_documents: usize,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct SearchDocumentsRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub metadata_filter: Option<Metadata>,
    pub threshold: Option<f32>,
    pub provider: Option<VectorStoreProvider>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocumentsResponse {
    pub results: Vec<DocumentSearchResponse>,
    pub total_found: usize,
    pub query: String,
    pub provider: VectorStoreProvider,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct GetDocumentRequest {
    pub id: String,
    pub provider: Option<VectorStoreProvider>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetDocumentResponse {
    pub result: Option<VectorSearchResponse>,
    pub found: bool,
    pub provider: VectorStoreProvider,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub provider: VectorStoreProvider,
    pub total_documents: usize,
    pub is_initialized: bool,
}

/// A vector store backend.
///
/// `initialize`, `is_initialized` and `size` are required; everything else
/// defaults to an "unsupported" error.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    fn provider(&self) -> VectorStoreProvider;

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            provider: self.provider().to_string(),
            operation,
        }
    }

    async fn initialize(&self) -> Result<()>;

    async fn is_initialized(&self) -> bool;

    async fn size(&self) -> Result<usize>;

    /// Embed and store documents; an existing id is replaced.
    async fn add_documents(&self, _documents: &[Document]) -> Result<()> {
        Err(self.unsupported("add_documents"))
    }

    async fn search_documents(
        &self,
        _query: &str,
        _top_k: usize,
        _metadata_filter: Option<&Metadata>,
        _threshold: f32,
    ) -> Result<Vec<DocumentSearchResponse>> {
        Err(self.unsupported("search_documents"))
    }

    async fn upsert_vector(&self, _record: VectorRecord) -> Result<()> {
        Err(self.unsupported("upsert_vector"))
    }

    async fn upsert_vectors_batch(&self, _records: Vec<VectorRecord>) -> Result<()> {
        Err(self.unsupported("upsert_vectors_batch"))
    }

    async fn get_vector(&self, _id: &str) -> Result<Option<VectorSearchResponse>> {
        Err(self.unsupported("get_vector"))
    }

    async fn search_vector(
        &self,
        _query: &[f32],
        _top_k: usize,
        _threshold: f32,
    ) -> Result<Vec<VectorSearchResponse>> {
        Err(self.unsupported("search_vector"))
    }

    async fn delete_vector(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_vector"))
    }

    async fn clear(&self) -> Result<()> {
        Err(self.unsupported("clear"))
    }

    async fn all_memory_vectors(&self) -> Result<Vec<MemoryVector>> {
        Err(self.unsupported("all_memory_vectors"))
    }
}
