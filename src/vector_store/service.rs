use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{error, info};

use super::{
    AddDocumentsRequest, AddDocumentsResponse, GetDocumentRequest, GetDocumentResponse,
    InMemoryVectorStoreClient, SearchDefaults, SearchDocumentsRequest, SearchDocumentsResponse,
    StoreStats, VectorStoreClient, VectorStoreProvider,
};
use crate::{
    error::{Error, Result},
    llm::{LlmModel, LlmService},
};

/// Front door to the vector stores.
///
/// Holds one client per provider and a default provider (in-memory). Request
/// fields left unset take the service's [`SearchDefaults`].
#[derive(Clone)]
pub struct VectorStoreService {
    clients: HashMap<VectorStoreProvider, Arc<dyn VectorStoreClient>>,
    default_provider: VectorStoreProvider,
    defaults: SearchDefaults,
}

impl VectorStoreService {
    /// A service with no clients; add them with [`with_client`](Self::with_client).
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            default_provider: VectorStoreProvider::InMemory,
            defaults: SearchDefaults::default(),
        }
    }

    /// A service with the in-memory client registered, embedding through `llm`.
    pub fn in_memory(llm: LlmService, embedding_model: LlmModel) -> Self {
        Self::new().with_client(Arc::new(InMemoryVectorStoreClient::new(
            llm,
            embedding_model,
        )))
    }

    pub fn with_client(mut self, client: Arc<dyn VectorStoreClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn with_defaults(mut self, defaults: SearchDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> SearchDefaults {
        self.defaults
    }

    fn client(
        &self,
        provider: Option<VectorStoreProvider>,
    ) -> Result<(VectorStoreProvider, &Arc<dyn VectorStoreClient>)> {
        let provider = provider.unwrap_or(self.default_provider);
        let client = self.clients.get(&provider).ok_or(Error::NoStore(provider))?;
        Ok((provider, client))
    }

    pub async fn initialize(&self, provider: Option<VectorStoreProvider>) -> Result<()> {
        info!("VectorStoreService | Initializing vector store...");
        let (provider, client) = self.client(provider)?;
        client.initialize().await?;
        info!("VectorStoreService | Initialized with provider: {provider}");
        Ok(())
    }

    /// Embed and store documents, initialising the store first unless the
    /// request turns that off. Large requests go to the client in chunks of
    /// `config.batch_size`.
    ///
    /// Each chunk is stored whole or not at all. Chunks before a failing one
    /// stay stored.
    pub async fn add_documents(&self, req: AddDocumentsRequest) -> Result<AddDocumentsResponse> {
        let start = Instant::now();
        info!("VectorStoreService | Adding documents to vector store...");

        if req.documents.is_empty() {
            return Err(Error::InvalidRequest(
                "Documents array is required and cannot be empty".into(),
            ));
        }

        let (provider, client) = self.client(req.provider)?;
        if req.config.auto_initialize != Some(false) && !client.is_initialized().await {
            self.initialize(Some(provider)).await?;
        }

        info!(
            "VectorStoreService | Using provider: {provider} for {} documents",
            req.documents.len()
        );

        let batch_size = req.config.batch_size.filter(|n| *n > 0).unwrap_or(req.documents.len());
        for chunk in req.documents.chunks(batch_size) {
            client
                .add_documents(chunk)
                .await
                .inspect_err(|e| error!("VectorStoreService | Failed to add documents: {e}"))?;
        }

        let total_documents = client.size().await?;
        let processing_time_ms = start.elapsed().as_millis();
        info!(
            "VectorStoreService | Added {} documents in {processing_time_ms}ms",
            req.documents.len()
        );

        Ok(AddDocumentsResponse {
            success: true,
            documents_added: req.documents.len(),
            total_documents,
            processing_time_ms,
        })
    }

    pub async fn search_documents(
        &self,
        req: SearchDocumentsRequest,
    ) -> Result<SearchDocumentsResponse> {
        let start = Instant::now();
        info!("VectorStoreService | Searching documents: \"{}\"", req.query);

        if req.query.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "Search query is required and cannot be empty".into(),
            ));
        }

        let (provider, client) = self.client(req.provider)?;
        let results = client
            .search_documents(
                &req.query,
                req.top_k.unwrap_or(self.defaults.top_k),
                req.metadata_filter.as_ref(),
                req.threshold.unwrap_or(self.defaults.threshold),
            )
            .await
            .inspect_err(|e| error!("VectorStoreService | Search failed: {e}"))?;

        let processing_time_ms = start.elapsed().as_millis();
        info!(
            "VectorStoreService | Found {} results in {processing_time_ms}ms",
            results.len()
        );

        Ok(SearchDocumentsResponse {
            total_found: results.len(),
            results,
            query: req.query,
            provider,
            processing_time_ms,
        })
    }

    /// [`search_documents`](Self::search_documents) on the default provider
    /// with the default `top_k` and threshold.
    pub async fn similarity_search(&self, query: &str) -> Result<SearchDocumentsResponse> {
        self.search_documents(SearchDocumentsRequest {
            query: query.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn get_document(&self, req: GetDocumentRequest) -> Result<GetDocumentResponse> {
        info!("VectorStoreService | Getting document: {}", req.id);

        if req.id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "Document ID is required and cannot be empty".into(),
            ));
        }

        let (provider, client) = self.client(req.provider)?;
        let result = client.get_vector(&req.id).await?;
        Ok(GetDocumentResponse {
            found: result.is_some(),
            result,
            provider,
        })
    }

    /// Size and state of a store. An uninitialised store reports 0 documents.
    pub async fn stats(&self, provider: Option<VectorStoreProvider>) -> Result<StoreStats> {
        let (provider, client) = self.client(provider)?;
        let is_initialized = client.is_initialized().await;
        let total_documents = if is_initialized { client.size().await? } else { 0 };
        Ok(StoreStats {
            provider,
            total_documents,
            is_initialized,
        })
    }

    pub fn set_default_provider(&mut self, provider: VectorStoreProvider) -> Result<()> {
        if !self.clients.contains_key(&provider) {
            return Err(Error::NoStore(provider));
        }
        self.default_provider = provider;
        info!("VectorStoreService | Default provider set to: {provider}");
        Ok(())
    }

    pub fn default_provider(&self) -> VectorStoreProvider {
        self.default_provider
    }

    pub fn available_providers(&self) -> Vec<VectorStoreProvider> {
        self.clients.keys().copied().collect()
    }

    /// `true` when the provider has a client and it is initialised.
    pub async fn health_check(&self, provider: Option<VectorStoreProvider>) -> bool {
        match self.client(provider) {
            Ok((_, client)) => client.is_initialized().await,
            Err(e) => {
                error!("VectorStoreService | Health check failed: {e}");
                false
            }
        }
    }
}

impl Default for VectorStoreService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        llm::{LlmProvider, registry::ModelRegistry},
        vector_store::{Document, VectorStoreConfig, in_memory::tests::TableEmbedder},
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn service() -> VectorStoreService {
        let table = HashMap::from([
            ("backend".to_string(), vec![1.0, 0.0, 0.0]),
            ("frontend".to_string(), vec![0.6, 0.8, 0.0]),
            ("backend engineers".to_string(), vec![1.0, 0.0, 0.0]),
        ]);
        let llm =
            LlmService::new().with_client(LlmProvider::OpenAi, Arc::new(TableEmbedder(table)));
        VectorStoreService::in_memory(llm, ModelRegistry::embedding_large().clone())
    }

    fn docs() -> Vec<Document> {
        ["backend", "frontend"]
            .iter()
            .map(|t| Document {
                page_content: t.to_string(),
                metadata: json!({ "uuid": t }).as_object().cloned().unwrap(),
            })
            .collect()
    }

    #[tokio::test]
    async fn add_auto_initializes() {
        let svc = service();
        assert!(!svc.health_check(None).await);

        let resp = svc
            .add_documents(AddDocumentsRequest {
                documents: docs(),
                config: VectorStoreConfig {
                    batch_size: Some(1),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(resp.success);
        assert_eq!(resp.documents_added, 2);
        assert_eq!(resp.total_documents, 2);
        assert!(svc.health_check(None).await);

        let stats = svc.stats(None).await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.provider, VectorStoreProvider::InMemory);
    }

    #[tokio::test]
    async fn add_without_auto_initialize_fails() {
        let err = service()
            .add_documents(AddDocumentsRequest {
                documents: docs(),
                config: VectorStoreConfig {
                    auto_initialize: Some(false),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected() {
        let svc = service();
        assert!(matches!(
            svc.add_documents(AddDocumentsRequest::default()).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            svc.similarity_search("   ").await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            svc.get_document(GetDocumentRequest::default()).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn similarity_search_uses_defaults() {
        let svc = service().with_defaults(SearchDefaults {
            top_k: 1,
            threshold: 0.0,
        });
        svc.add_documents(AddDocumentsRequest {
            documents: docs(),
            ..Default::default()
        })
        .await
        .unwrap();

        let resp = svc.similarity_search("backend engineers").await.unwrap();
        assert_eq!(resp.total_found, 1);
        assert_eq!(resp.results[0].id, "backend");
        assert_eq!(resp.query, "backend engineers");

        let got = svc
            .get_document(GetDocumentRequest {
                id: "frontend".into(),
                provider: None,
            })
            .await
            .unwrap();
        assert!(got.found);
        assert_eq!(got.result.unwrap().text, "frontend");
    }

    #[tokio::test]
    async fn unknown_provider() {
        let mut svc = service();
        assert!(svc.set_default_provider(VectorStoreProvider::Milvus).is_err());
        assert_eq!(svc.default_provider(), VectorStoreProvider::InMemory);
        assert_eq!(svc.available_providers(), vec![VectorStoreProvider::InMemory]);
        assert!(!svc.health_check(Some(VectorStoreProvider::Pinecone)).await);
        assert!(svc.stats(Some(VectorStoreProvider::Chroma)).await.is_err());
    }
}
