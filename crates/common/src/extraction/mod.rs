//! Citation extraction pipeline
//!
//! The orchestrator drives one extraction run end to end: take the
//! per-document gate, call the provider, resolve textual hints against the
//! case roster, atomically swap the automated edge set, and settle the
//! status to completed or failed. The gate guarantees at most one live run
//! per document; a failed run always releases it.

mod client;

pub use client::{
    create_extractor, CitationExtractor, CitationSpan, CredentialProvider, HttpExtractor,
    MockExtractor, StaticCredential,
};

use crate::db::models::{Document, ExtractionStatus};
use crate::db::{NewCitation, Store};
use crate::db::models::CreationSource;
use crate::errors::Result;
use crate::metrics::{record_citations_created, record_extraction};
use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one extraction run
#[derive(Debug, Clone, Copy)]
pub struct ExtractionOutcome {
    /// Automated edges persisted
    pub citations_created: usize,

    /// Spans whose hint matched nothing in the case, or matched the
    /// source document itself
    pub spans_skipped: usize,
}

/// Resolves provider hints to document ids by normalized title match
///
/// Normalization lowercases, strips punctuation, collapses whitespace and
/// treats the "Exh." abbreviation as equivalent to "Exhibit". On duplicate
/// titles within a case the earliest-created document wins.
pub struct DestinationResolver {
    by_title: HashMap<String, Uuid>,
    separators: Regex,
}

impl DestinationResolver {
    pub fn new(documents: &[Document]) -> Self {
        let separators = Regex::new("[^a-z0-9]+").expect("valid pattern");
        let mut by_title: HashMap<String, Uuid> = HashMap::new();
        for document in documents {
            let key = normalize(&separators, &document.title);
            if !key.is_empty() {
                by_title.entry(key).or_insert(document.id);
            }
        }
        Self {
            by_title,
            separators,
        }
    }

    pub fn resolve(&self, hint: &str) -> Option<Uuid> {
        let key = normalize(&self.separators, hint);
        self.by_title.get(&key).copied()
    }
}

fn normalize(separators: &Regex, raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned = separators.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .map(|token| if token == "exh" { "exhibit" } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drives citation extraction runs
#[derive(Clone)]
pub struct ExtractionOrchestrator {
    store: Arc<dyn Store>,
    extractor: Arc<dyn CitationExtractor>,
}

impl ExtractionOrchestrator {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn CitationExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Run extraction for a document
    ///
    /// Fails with `InvalidState` when the document's content is not yet
    /// processed and with `ExtractionInProgress` when another run holds the
    /// gate. On provider or store failure the status settles to `failed`
    /// and the existing edge set is left untouched.
    pub async fn run(&self, document_id: Uuid) -> Result<ExtractionOutcome> {
        let document = self.store.get_document(document_id).await?;
        self.store.begin_extraction(document_id).await?;

        let started = Instant::now();
        match self.execute(&document).await {
            Ok(outcome) => {
                if let Err(e) = self
                    .store
                    .update_extraction_status(document_id, Some(ExtractionStatus::Completed))
                    .await
                {
                    self.settle_failed(document_id).await;
                    record_extraction(started.elapsed().as_secs_f64(), 0, 0, false);
                    return Err(e);
                }
                record_extraction(
                    started.elapsed().as_secs_f64(),
                    outcome.citations_created,
                    outcome.spans_skipped,
                    true,
                );
                info!(
                    document_id = %document_id,
                    citations_created = outcome.citations_created,
                    spans_skipped = outcome.spans_skipped,
                    "Citation extraction completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.settle_failed(document_id).await;
                record_extraction(started.elapsed().as_secs_f64(), 0, 0, false);
                Err(e)
            }
        }
    }

    // The gate must not stay held after a failed run
    async fn settle_failed(&self, document_id: Uuid) {
        if let Err(release) = self
            .store
            .update_extraction_status(document_id, Some(ExtractionStatus::Failed))
            .await
        {
            warn!(
                document_id = %document_id,
                error = %release,
                "Failed to settle extraction status after error"
            );
        }
    }

    async fn execute(&self, document: &Document) -> Result<ExtractionOutcome> {
        let spans = self.extractor.extract(&document.media_id).await?;
        let case_documents = self.store.list_case_documents(document.case_id).await?;
        let resolver = DestinationResolver::new(&case_documents);

        let mut edges = Vec::with_capacity(spans.len());
        let mut skipped = 0usize;
        for span in spans {
            match resolver.resolve(&span.destination_hint) {
                Some(destination) if destination != document.id => {
                    edges.push(NewCitation {
                        source_document_id: document.id,
                        destination_document_id: destination,
                        source_text: span.source_text,
                        source_page_number: span.source_page_number,
                        source_rectangle: span.source_rectangle,
                        destination_page_number: span.destination_page_number,
                        creation_source: CreationSource::Automated,
                    });
                }
                Some(_) => {
                    debug!(
                        document_id = %document.id,
                        hint = %span.destination_hint,
                        "Skipping self-referencing citation span"
                    );
                    skipped += 1;
                }
                None => {
                    debug!(
                        document_id = %document.id,
                        hint = %span.destination_hint,
                        "Skipping unresolvable citation span"
                    );
                    skipped += 1;
                }
            }
        }

        let created = self
            .store
            .replace_automated_citations(document.id, edges)
            .await?;
        record_citations_created(created.len(), "automated");

        Ok(ExtractionOutcome {
            citations_created: created.len(),
            spans_skipped: skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Citation, DocType, ProcessingStatus};
    use crate::db::{CitationStore, DocumentStore, NewDocument};
    use crate::db::MemoryStore;
    use crate::errors::AppError;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    async fn seed_document(
        store: &dyn Store,
        case_id: Uuid,
        title: &str,
        doc_type: DocType,
        main: Option<Uuid>,
        processed: bool,
    ) -> Document {
        let document = store
            .create_document(NewDocument {
                case_id,
                title: title.to_string(),
                doc_type,
                media_id: format!("media-{}", title),
                main_document_id: main,
            })
            .await
            .unwrap();
        if processed {
            store
                .update_processing_status(document.id, ProcessingStatus::Completed)
                .await
                .unwrap()
        } else {
            document
        }
    }

    fn span(hint: &str, text: &str) -> CitationSpan {
        CitationSpan {
            destination_hint: hint.to_string(),
            source_text: text.to_string(),
            source_page_number: Some(2),
            source_rectangle: None,
            destination_page_number: Some(1),
        }
    }

    #[tokio::test]
    async fn test_run_resolves_hints_and_settles_completed() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Motion to Dismiss", DocType::Main, None, true)
                .await;
        let exhibit = seed_document(
            store.as_ref(),
            case_id,
            "Exhibit 1",
            DocType::Exhibit,
            Some(main.id),
            false,
        )
        .await;

        let extractor = Arc::new(MockExtractor::with_spans(vec![
            span("Exhibit 1", "see Exhibit 1 at p. 4"),
            span("Exh. 1", "Exh. 1"),
            span("Exhibit 99", "see Exhibit 99"),
            span("Motion to Dismiss", "this motion"),
        ]));
        let orchestrator = ExtractionOrchestrator::new(store.clone(), extractor);

        let outcome = orchestrator.run(main.id).await.unwrap();
        assert_eq!(outcome.citations_created, 2);
        assert_eq!(outcome.spans_skipped, 2); // unknown exhibit + self match

        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(
            refreshed.extraction_status(),
            Some(ExtractionStatus::Completed)
        );

        let edges = store.list_citations_by_source(main.id).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges
            .iter()
            .all(|e| e.destination_document_id == exhibit.id && e.is_automated()));
        // Provider order is preserved
        assert_eq!(edges[0].source_text, "see Exhibit 1 at p. 4");
        assert_eq!(edges[1].source_text, "Exh. 1");
    }

    #[tokio::test]
    async fn test_rerun_replaces_automated_but_keeps_manual() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let main = seed_document(store.as_ref(), case_id, "Complaint", DocType::Main, None, true).await;
        let exhibit = seed_document(
            store.as_ref(),
            case_id,
            "Exhibit A",
            DocType::Exhibit,
            Some(main.id),
            false,
        )
        .await;

        store
            .create_citation(NewCitation {
                source_document_id: main.id,
                destination_document_id: exhibit.id,
                source_text: "hand-linked".to_string(),
                source_page_number: None,
                source_rectangle: None,
                destination_page_number: None,
                creation_source: CreationSource::Manual,
            })
            .await
            .unwrap();

        let extractor = Arc::new(MockExtractor::with_spans(vec![span("Exhibit A", "Exh. A")]));
        let orchestrator = ExtractionOrchestrator::new(store.clone(), extractor);

        orchestrator.run(main.id).await.unwrap();
        orchestrator.run(main.id).await.unwrap();

        let edges = store.list_citations_by_source(main.id).await.unwrap();
        assert_eq!(edges.len(), 2); // one manual + one automated, never accumulating
        assert_eq!(edges.iter().filter(|e| e.is_automated()).count(), 1);
        assert_eq!(edges.iter().filter(|e| !e.is_automated()).count(), 1);
    }

    #[tokio::test]
    async fn test_run_requires_processed_content() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Answer", DocType::Main, None, false).await;

        let orchestrator =
            ExtractionOrchestrator::new(store.clone(), Arc::new(MockExtractor::new()));
        let err = orchestrator.run(main.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState { .. }));

        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(refreshed.extraction_status(), None);
    }

    #[tokio::test]
    async fn test_run_unknown_document() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator =
            ExtractionOrchestrator::new(store, Arc::new(MockExtractor::new()));
        let err = orchestrator.run(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }

    /// Extractor that parks inside `extract` until the test releases it
    #[derive(Default)]
    struct GatedExtractor {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CitationExtractor for GatedExtractor {
        async fn extract(&self, _media_id: &str) -> Result<Vec<CitationSpan>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }

        fn provider_name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_mutually_exclusive() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Brief", DocType::Main, None, true).await;

        let gated = Arc::new(GatedExtractor::default());
        let orchestrator = ExtractionOrchestrator::new(store.clone(), gated.clone());

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            let id = main.id;
            async move { orchestrator.run(id).await }
        });

        // Wait until the first run is inside the provider, then race it
        gated.entered.notified().await;
        let err = orchestrator.run(main.id).await.unwrap_err();
        assert!(matches!(err, AppError::ExtractionInProgress { .. }));

        gated.release.notify_one();
        first.await.unwrap().unwrap();

        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(
            refreshed.extraction_status(),
            Some(ExtractionStatus::Completed)
        );
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Fault {
        /// Fail the automated-edge swap
        ReplaceCitations,
        /// Fail the final write that marks the run completed
        CompletionWrite,
    }

    /// Store that injects one failure mode, delegating everything else
    struct FaultyStore {
        inner: MemoryStore,
        fault: Fault,
    }

    impl FaultyStore {
        fn new(fault: Fault) -> Self {
            Self {
                inner: MemoryStore::new(),
                fault,
            }
        }

        fn reset() -> AppError {
            AppError::DatabaseConnection {
                message: "connection reset".to_string(),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FaultyStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn create_document(&self, new: NewDocument) -> Result<Document> {
            self.inner.create_document(new).await
        }
        async fn get_document(&self, id: Uuid) -> Result<Document> {
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
            if self.fault == Fault::CompletionWrite && status == Some(ExtractionStatus::Completed) {
                return Err(Self::reset());
            }
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
    impl CitationStore for FaultyStore {
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
            if self.fault == Fault::ReplaceCitations {
                return Err(Self::reset());
            }
            self.inner
                .replace_automated_citations(source_document_id, edges)
                .await
        }
    }

    #[tokio::test]
    async fn test_store_failure_settles_failed_and_keeps_old_edges() {
        let store = Arc::new(FaultyStore::new(Fault::ReplaceCitations));
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Petition", DocType::Main, None, true).await;
        let exhibit = seed_document(
            store.as_ref(),
            case_id,
            "Exhibit B",
            DocType::Exhibit,
            Some(main.id),
            false,
        )
        .await;

        store
            .create_citation(NewCitation {
                source_document_id: main.id,
                destination_document_id: exhibit.id,
                source_text: "see Exhibit B".to_string(),
                source_page_number: None,
                source_rectangle: None,
                destination_page_number: None,
                creation_source: CreationSource::Automated,
            })
            .await
            .unwrap();

        let extractor = Arc::new(MockExtractor::with_spans(vec![span("Exhibit B", "Exh. B")]));
        let orchestrator = ExtractionOrchestrator::new(store.clone(), extractor);

        let err = orchestrator.run(main.id).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection { .. }));

        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(refreshed.extraction_status(), Some(ExtractionStatus::Failed));

        // The pre-existing edge set survived the failed swap
        let edges = store.list_citations_by_source(main.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_text, "see Exhibit B");
    }

    #[tokio::test]
    async fn test_completion_write_failure_still_releases_gate() {
        let store = Arc::new(FaultyStore::new(Fault::CompletionWrite));
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Opposition", DocType::Main, None, true).await;
        seed_document(
            store.as_ref(),
            case_id,
            "Exhibit C",
            DocType::Exhibit,
            Some(main.id),
            false,
        )
        .await;

        let extractor = Arc::new(MockExtractor::with_spans(vec![span("Exhibit C", "Exh. C")]));
        let orchestrator = ExtractionOrchestrator::new(store.clone(), extractor);

        let err = orchestrator.run(main.id).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection { .. }));

        // The edge swap succeeded, but a run that could not settle completed
        // must not stay in progress
        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(refreshed.extraction_status(), Some(ExtractionStatus::Failed));
        store.begin_extraction(main.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_failure_releases_gate_for_retry() {
        let store = Arc::new(MemoryStore::new());
        let case_id = Uuid::new_v4();
        let main =
            seed_document(store.as_ref(), case_id, "Reply", DocType::Main, None, true).await;

        let extractor = Arc::new(MockExtractor::with_spans(vec![]));
        extractor.enqueue(Err(AppError::Extractor {
            message: "provider down".to_string(),
        }));
        let orchestrator = ExtractionOrchestrator::new(store.clone(), extractor.clone());

        let err = orchestrator.run(main.id).await.unwrap_err();
        assert!(matches!(err, AppError::Extractor { .. }));
        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(refreshed.extraction_status(), Some(ExtractionStatus::Failed));

        // A later run can take the gate again
        orchestrator.run(main.id).await.unwrap();
        let refreshed = store.get_document(main.id).await.unwrap();
        assert_eq!(
            refreshed.extraction_status(),
            Some(ExtractionStatus::Completed)
        );
        assert_eq!(extractor.call_count(), 2);
    }

    #[test]
    fn test_resolver_normalization() {
        let case_id = Uuid::new_v4();
        let mk = |title: &str| Document {
            id: Uuid::new_v4(),
            case_id,
            title: title.to_string(),
            doc_type: String::from(DocType::Exhibit),
            main_document_id: None,
            media_id: "m".to_string(),
            processing_status: String::from(ProcessingStatus::Pending),
            citations_extraction_status: None,
            created_at: chrono::Utc::now().into(),
        };
        let docs = vec![mk("Exhibit 1"), mk("Smith Deposition (Vol. II)")];
        let resolver = DestinationResolver::new(&docs);

        assert_eq!(resolver.resolve("Exhibit 1"), Some(docs[0].id));
        assert_eq!(resolver.resolve("exh. 1"), Some(docs[0].id));
        assert_eq!(resolver.resolve("EXHIBIT   1"), Some(docs[0].id));
        assert_eq!(
            resolver.resolve("smith deposition vol ii"),
            Some(docs[1].id)
        );
        assert_eq!(resolver.resolve("Exhibit 2"), None);
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn test_resolver_duplicate_titles_first_wins() {
        let case_id = Uuid::new_v4();
        let mk = |title: &str| Document {
            id: Uuid::new_v4(),
            case_id,
            title: title.to_string(),
            doc_type: String::from(DocType::Exhibit),
            main_document_id: None,
            media_id: "m".to_string(),
            processing_status: String::from(ProcessingStatus::Pending),
            citations_extraction_status: None,
            created_at: chrono::Utc::now().into(),
        };
        let docs = vec![mk("Exhibit 1"), mk("exhibit 1")];
        let resolver = DestinationResolver::new(&docs);
        assert_eq!(resolver.resolve("Exhibit 1"), Some(docs[0].id));
    }
}
