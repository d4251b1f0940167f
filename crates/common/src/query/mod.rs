//! Read-side query façade
//!
//! Thin service over the store that retries transient failures with a
//! bounded exponential backoff. Permanent errors (not-found, validation,
//! conflicts) surface immediately; only connectivity-shaped failures are
//! retried, and only within the configured time budget.

use crate::citemap::{build_citation_map, CitationMapEntry};
use crate::config::RetryConfig;
use crate::db::models::{Citation, Document};
use crate::db::Store;
use crate::errors::Result;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// A document together with its outgoing citation count
#[derive(Debug, Clone, Serialize)]
pub struct DocumentWithCounts {
    #[serde(flatten)]
    pub document: Document,
    pub citations_count: u64,
}

/// Both directions of a document's edges
#[derive(Debug, Clone, Serialize)]
pub struct DocumentCitations {
    /// Edges where the document is the source (what it cites)
    pub outgoing: Vec<Citation>,

    /// Edges where the document is the destination (what cites it)
    pub incoming: Vec<Citation>,
}

/// Read-side query service
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
    retry: RetryConfig,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    fn policy(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval())
            .with_max_elapsed_time(Some(self.retry.max_elapsed()))
            .build()
    }

    async fn with_retry<T, Fut, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry(self.policy(), || {
            let fut = op();
            async move {
                fut.await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    /// Fetch one document
    pub async fn get_document(&self, id: Uuid) -> Result<Document> {
        self.with_retry(|| self.store.get_document(id)).await
    }

    /// All documents of a case with their outgoing citation counts
    pub async fn get_case_documents(&self, case_id: Uuid) -> Result<Vec<DocumentWithCounts>> {
        self.with_retry(|| async move {
            let documents = self.store.list_case_documents(case_id).await?;
            let citations = self.store.list_case_citations(case_id).await?;
            Ok(documents
                .into_iter()
                .map(|document| {
                    let citations_count = citations
                        .iter()
                        .filter(|c| c.source_document_id == document.id)
                        .count() as u64;
                    DocumentWithCounts {
                        document,
                        citations_count,
                    }
                })
                .collect())
        })
        .await
    }

    /// Both edge directions for one document
    pub async fn get_document_citations(&self, id: Uuid) -> Result<DocumentCitations> {
        self.with_retry(|| async move {
            // Surface not-found before returning empty edge lists
            self.store.get_document(id).await?;
            let outgoing = self.store.list_citations_by_source(id).await?;
            let incoming = self.store.list_citations_by_destination(id).await?;
            Ok(DocumentCitations { outgoing, incoming })
        })
        .await
    }

    /// Aggregated citation map of a case
    pub async fn get_citation_map(&self, case_id: Uuid) -> Result<Vec<CitationMapEntry>> {
        self.with_retry(|| async move {
            let documents = self.store.list_case_documents(case_id).await?;
            let citations = self.store.list_case_citations(case_id).await?;
            Ok(build_citation_map(&documents, &citations))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CreationSource, DocType, ExtractionStatus, ProcessingStatus};
    use crate::db::{CitationStore, DocumentStore, NewCitation, NewDocument};
    use crate::db::MemoryStore;
    use crate::errors::AppError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_interval_ms: 1,
            max_elapsed_ms: 200,
        }
    }

    /// Store whose `get_document` fails transiently N times before delegating
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn create_document(&self, new: NewDocument) -> Result<Document> {
            self.inner.create_document(new).await
        }
        async fn get_document(&self, id: Uuid) -> Result<Document> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::DatabaseConnection {
                    message: "connection reset".to_string(),
                });
            }
            self.inner.get_document(id).await
        }
        async fn list_case_documents(&self, case_id: Uuid) -> Result<Vec<Document>> {
            self.inner.list_case_documents(case_id).await
        }
        async fn update_processing_status(
            &self,
            id: Uuid,
            status: ProcessingStatus,
        ) -> Result<Document> {
            self.inner.update_processing_status(id, status).await
        }
        async fn update_extraction_status(
            &self,
            id: Uuid,
            status: Option<ExtractionStatus>,
        ) -> Result<Document> {
            self.inner.update_extraction_status(id, status).await
        }
        async fn begin_extraction(&self, id: Uuid) -> Result<()> {
            self.inner.begin_extraction(id).await
        }
        async fn delete_document(&self, id: Uuid) -> Result<u64> {
            self.inner.delete_document(id).await
        }
    }

    #[async_trait]
    impl CitationStore for FlakyStore {
        async fn create_citation(&self, new: NewCitation) -> Result<Citation> {
            self.inner.create_citation(new).await
        }
        async fn bulk_create_citations(&self, edges: Vec<NewCitation>) -> Result<Vec<Citation>> {
            self.inner.bulk_create_citations(edges).await
        }
        async fn list_citations_by_source(&self, document_id: Uuid) -> Result<Vec<Citation>> {
            self.inner.list_citations_by_source(document_id).await
        }
        async fn list_citations_by_destination(&self, document_id: Uuid) -> Result<Vec<Citation>> {
            self.inner.list_citations_by_destination(document_id).await
        }
        async fn list_case_citations(&self, case_id: Uuid) -> Result<Vec<Citation>> {
            self.inner.list_case_citations(case_id).await
        }
        async fn delete_document_citations(&self, document_id: Uuid) -> Result<u64> {
            self.inner.delete_document_citations(document_id).await
        }
        async fn replace_automated_citations(
            &self,
            source_document_id: Uuid,
            edges: Vec<NewCitation>,
        ) -> Result<Vec<Citation>> {
            self.inner
                .replace_automated_citations(source_document_id, edges)
                .await
        }
    }

    async fn seed_main(store: &dyn Store, case_id: Uuid, title: &str) -> Document {
        store
            .create_document(NewDocument {
                case_id,
                title: title.to_string(),
                doc_type: DocType::Main,
                media_id: "m".to_string(),
                main_document_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let case_id = Uuid::new_v4();
        let main = seed_main(store.as_ref(), case_id, "Complaint").await;

        let service = QueryService::new(store.clone(), fast_retry());
        let fetched = service.get_document(main.id).await.unwrap();
        assert_eq!(fetched.id, main.id);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let store = Arc::new(FlakyStore::new(0));
        let service = QueryService::new(store.clone(), fast_retry());

        let err = service.get_document(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_case_documents_carry_citation_counts() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let a = seed_main(store.as_ref(), case_id, "A").await;
        let b = seed_main(store.as_ref(), case_id, "B").await;

        for _ in 0..2 {
            store
                .create_citation(NewCitation {
                    source_document_id: a.id,
                    destination_document_id: b.id,
                    source_text: "see B".to_string(),
                    source_page_number: None,
                    source_rectangle: None,
                    destination_page_number: None,
                    creation_source: CreationSource::Manual,
                })
                .await
                .unwrap();
        }

        let service = QueryService::new(store, fast_retry());
        let documents = service.get_case_documents(case_id).await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].document.id, a.id);
        assert_eq!(documents[0].citations_count, 2);
        assert_eq!(documents[1].citations_count, 0);
    }

    #[tokio::test]
    async fn test_document_citations_both_directions() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let a = seed_main(store.as_ref(), case_id, "A").await;
        let b = seed_main(store.as_ref(), case_id, "B").await;

        store
            .create_citation(NewCitation {
                source_document_id: a.id,
                destination_document_id: b.id,
                source_text: "see B".to_string(),
                source_page_number: None,
                source_rectangle: None,
                destination_page_number: None,
                creation_source: CreationSource::Manual,
            })
            .await
            .unwrap();

        let service = QueryService::new(store, fast_retry());
        let citations = service.get_document_citations(a.id).await.unwrap();
        assert_eq!(citations.outgoing.len(), 1);
        assert!(citations.incoming.is_empty());

        let citations = service.get_document_citations(b.id).await.unwrap();
        assert!(citations.outgoing.is_empty());
        assert_eq!(citations.incoming.len(), 1);

        let err = service
            .get_document_citations(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_citation_map_via_service() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let a = seed_main(store.as_ref(), case_id, "A").await;
        let b = seed_main(store.as_ref(), case_id, "B").await;

        store
            .create_citation(NewCitation {
                source_document_id: a.id,
                destination_document_id: b.id,
                source_text: "see B".to_string(),
                source_page_number: None,
                source_rectangle: None,
                destination_page_number: None,
                creation_source: CreationSource::Automated,
            })
            .await
            .unwrap();

        let service = QueryService::new(store, fast_retry());
        let map = service.get_citation_map(case_id).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].document.id, b.id);
        assert_eq!(map[0].document.title, "B");
        assert_eq!(map[0].cited_by[0].document.id, a.id);
    }
}
