//! Store contract for the citation graph
//!
//! Two traits cover the document and citation sides of the graph; `Store`
//! combines them for trait objects. Backends: the SeaORM [`Repository`] for
//! Postgres and the [`MemoryStore`] used by tests and local development.
//! Both enforce the same invariants, so callers never care which one they
//! are holding.
//!
//! [`Repository`]: crate::db::Repository
//! [`MemoryStore`]: crate::db::MemoryStore

use crate::db::models::{Citation, CreationSource, DocType, Document, ExtractionStatus, ProcessingStatus};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input for creating a document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub case_id: Uuid,
    pub title: String,
    pub doc_type: DocType,
    pub media_id: String,
    /// Required for exhibits, must be absent for main documents
    pub main_document_id: Option<Uuid>,
}

/// Optional spatial locator of a citation on the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Input for creating a citation edge
#[derive(Debug, Clone)]
pub struct NewCitation {
    pub source_document_id: Uuid,
    pub destination_document_id: Uuid,
    pub source_text: String,
    pub source_page_number: Option<i32>,
    pub source_rectangle: Option<Rectangle>,
    pub destination_page_number: Option<i32>,
    pub creation_source: CreationSource,
}

impl NewCitation {
    /// A citation edge must never point at its own source
    pub fn validate(&self) -> Result<()> {
        if self.source_document_id == self.destination_document_id {
            return Err(AppError::Validation {
                message: "a document cannot cite itself".to_string(),
                field: Some("destination_document_id".to_string()),
            });
        }
        Ok(())
    }
}

/// Document-side store operations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check backend connectivity
    async fn ping(&self) -> Result<()>;

    /// Create a document. Exhibits must reference an existing main document
    /// in the same case; main documents must not carry a parent.
    async fn create_document(&self, new: NewDocument) -> Result<Document>;

    /// Fetch a document, failing with `DocumentNotFound` if absent
    async fn get_document(&self, id: Uuid) -> Result<Document>;

    /// All documents belonging to a case, in creation order
    async fn list_case_documents(&self, case_id: Uuid) -> Result<Vec<Document>>;

    /// Idempotent: setting the same status twice is a no-op success
    async fn update_processing_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
    ) -> Result<Document>;

    /// Idempotent: setting the same status twice is a no-op success.
    /// A non-null status requires the document's content to be ingested
    /// (`processing_status == completed`).
    async fn update_extraction_status(
        &self,
        id: Uuid,
        status: Option<ExtractionStatus>,
    ) -> Result<Document>;

    /// Atomic compare-and-set gate to `in_progress`. Fails with
    /// `ExtractionInProgress` when another run holds the gate, with
    /// `InvalidState` when the document's content is not ingested, and with
    /// `DocumentNotFound` when the document is absent.
    async fn begin_extraction(&self, id: Uuid) -> Result<()>;

    /// Cascading delete: dependent exhibits and every citation edge touching
    /// the document or its exhibits are removed in one atomic boundary.
    /// Returns the number of documents removed.
    async fn delete_document(&self, id: Uuid) -> Result<u64>;
}

/// Citation-side store operations
#[async_trait]
pub trait CitationStore: Send + Sync {
    /// Create a single edge; fails with `ValidationError` on self-reference
    async fn create_citation(&self, new: NewCitation) -> Result<Citation>;

    /// Persist a batch in one atomic operation: all edges or none
    async fn bulk_create_citations(&self, edges: Vec<NewCitation>) -> Result<Vec<Citation>>;

    /// Edges where the document is the source (what it cites)
    async fn list_citations_by_source(&self, document_id: Uuid) -> Result<Vec<Citation>>;

    /// Edges where the document is the destination (what cites it)
    async fn list_citations_by_destination(&self, document_id: Uuid) -> Result<Vec<Citation>>;

    /// The full edge set for a case, in insertion order
    async fn list_case_citations(&self, case_id: Uuid) -> Result<Vec<Citation>>;

    /// Remove all edges where the document is source or destination
    async fn delete_document_citations(&self, document_id: Uuid) -> Result<u64>;

    /// Atomically drop the automated edges of a source document and insert
    /// the replacement batch. Manual edges are untouched. Used by re-runs of
    /// citation extraction so edges never accumulate.
    async fn replace_automated_citations(
        &self,
        source_document_id: Uuid,
        edges: Vec<NewCitation>,
    ) -> Result<Vec<Citation>>;
}

/// Combined store handle for trait objects
pub trait Store: DocumentStore + CitationStore {}

impl<T: DocumentStore + CitationStore> Store for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_citation_rejected() {
        let id = Uuid::new_v4();
        let edge = NewCitation {
            source_document_id: id,
            destination_document_id: id,
            source_text: "Exhibit 1".to_string(),
            source_page_number: None,
            source_rectangle: None,
            destination_page_number: None,
            creation_source: CreationSource::Manual,
        };
        let err = edge.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
