//! In-memory store backend
//!
//! Implements the full store contract against plain vectors behind a mutex.
//! Backs the test suite and local development (`database.url = "memory"`);
//! the same invariants as the Postgres repository apply, so the two are
//! interchangeable behind `Arc<dyn Store>`.

use crate::db::models::{
    Citation, CreationSource, DocType, Document, ExtractionStatus, ProcessingStatus,
};
use crate::db::store::{CitationStore, DocumentStore, NewCitation, NewDocument};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    documents: Vec<Document>,
    citations: Vec<Citation>,
}

/// In-memory store; insertion order doubles as creation order
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn now() -> DateTimeWithTimeZone {
    chrono::Utc::now().into()
}

fn citation_row(new: NewCitation) -> Citation {
    let rect = new.source_rectangle;
    Citation {
        id: Uuid::new_v4(),
        source_document_id: new.source_document_id,
        destination_document_id: new.destination_document_id,
        source_text: new.source_text,
        source_page_number: new.source_page_number,
        source_rectangle_x1: rect.map(|r| r.x1),
        source_rectangle_y1: rect.map(|r| r.y1),
        source_rectangle_x2: rect.map(|r| r.x2),
        source_rectangle_y2: rect.map(|r| r.y2),
        destination_page_number: new.destination_page_number,
        creation_source: String::from(new.creation_source),
        created_at: now(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn document(&self, id: Uuid) -> Result<&Document> {
        self.documents
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }

    fn document_mut(&mut self, id: Uuid) -> Result<&mut Document> {
        self.documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let mut inner = self.inner.lock().await;

        match new.doc_type {
            DocType::Exhibit => {
                let parent_id = new.main_document_id.ok_or_else(|| AppError::Validation {
                    message: "an exhibit requires a main document".to_string(),
                    field: Some("main_document_id".to_string()),
                })?;
                let parent = inner.documents.iter().find(|d| d.id == parent_id);
                match parent {
                    Some(p) if p.is_main() && p.case_id == new.case_id => {}
                    _ => {
                        return Err(AppError::Validation {
                            message: "main_document_id must reference an existing main document in the same case"
                                .to_string(),
                            field: Some("main_document_id".to_string()),
                        });
                    }
                }
            }
            DocType::Main => {
                if new.main_document_id.is_some() {
                    return Err(AppError::Validation {
                        message: "a main document cannot have a parent document".to_string(),
                        field: Some("main_document_id".to_string()),
                    });
                }
            }
        }

        let document = Document {
            id: Uuid::new_v4(),
            case_id: new.case_id,
            title: new.title,
            doc_type: String::from(new.doc_type),
            main_document_id: new.main_document_id,
            media_id: new.media_id,
            processing_status: String::from(ProcessingStatus::Pending),
            citations_extraction_status: None,
            created_at: now(),
        };
        inner.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Document> {
        let inner = self.inner.lock().await;
        inner.document(id).cloned()
    }

    async fn list_case_documents(&self, case_id: Uuid) -> Result<Vec<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .documents
            .iter()
            .filter(|d| d.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn update_processing_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
    ) -> Result<Document> {
        let mut inner = self.inner.lock().await;
        let document = inner.document_mut(id)?;
        if status != ProcessingStatus::Completed {
            if document.extraction_status() == Some(ExtractionStatus::InProgress) {
                return Err(AppError::InvalidState {
                    message: format!(
                        "cannot change processing status of document {} while citation extraction is running",
                        id
                    ),
                });
            }
            // Extraction state never outlives processed content
            document.citations_extraction_status = None;
        }
        document.processing_status = String::from(status);
        Ok(document.clone())
    }

    async fn update_extraction_status(
        &self,
        id: Uuid,
        status: Option<ExtractionStatus>,
    ) -> Result<Document> {
        let mut inner = self.inner.lock().await;
        let document = inner.document_mut(id)?;
        if status.is_some() && document.processing_status() != ProcessingStatus::Completed {
            return Err(AppError::InvalidState {
                message: format!(
                    "cannot track citation extraction for document {} before its content is processed",
                    id
                ),
            });
        }
        document.citations_extraction_status = status.map(String::from);
        Ok(document.clone())
    }

    async fn begin_extraction(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let document = inner.document_mut(id)?;
        if document.processing_status() != ProcessingStatus::Completed {
            return Err(AppError::InvalidState {
                message: format!("document {} is not processed yet", id),
            });
        }
        if document.extraction_status() == Some(ExtractionStatus::InProgress) {
            return Err(AppError::ExtractionInProgress { id: id.to_string() });
        }
        document.citations_extraction_status =
            Some(String::from(ExtractionStatus::InProgress));
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.document(id)?;

        let mut victims: HashSet<Uuid> = HashSet::new();
        victims.insert(id);
        for d in &inner.documents {
            if d.main_document_id == Some(id) {
                victims.insert(d.id);
            }
        }

        inner.documents.retain(|d| !victims.contains(&d.id));
        inner.citations.retain(|c| {
            !victims.contains(&c.source_document_id)
                && !victims.contains(&c.destination_document_id)
        });

        Ok(victims.len() as u64)
    }
}

#[async_trait]
impl CitationStore for MemoryStore {
    async fn create_citation(&self, new: NewCitation) -> Result<Citation> {
        new.validate()?;
        let mut inner = self.inner.lock().await;
        let row = citation_row(new);
        inner.citations.push(row.clone());
        Ok(row)
    }

    async fn bulk_create_citations(&self, edges: Vec<NewCitation>) -> Result<Vec<Citation>> {
        for edge in &edges {
            edge.validate()?;
        }
        let mut inner = self.inner.lock().await;
        let rows: Vec<Citation> = edges.into_iter().map(citation_row).collect();
        inner.citations.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn list_citations_by_source(&self, document_id: Uuid) -> Result<Vec<Citation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .citations
            .iter()
            .filter(|c| c.source_document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_citations_by_destination(&self, document_id: Uuid) -> Result<Vec<Citation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .citations
            .iter()
            .filter(|c| c.destination_document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_case_citations(&self, case_id: Uuid) -> Result<Vec<Citation>> {
        let inner = self.inner.lock().await;
        let case_docs: HashSet<Uuid> = inner
            .documents
            .iter()
            .filter(|d| d.case_id == case_id)
            .map(|d| d.id)
            .collect();
        Ok(inner
            .citations
            .iter()
            .filter(|c| {
                case_docs.contains(&c.source_document_id)
                    || case_docs.contains(&c.destination_document_id)
            })
            .cloned()
            .collect())
    }

    async fn delete_document_citations(&self, document_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.citations.len();
        inner.citations.retain(|c| {
            c.source_document_id != document_id && c.destination_document_id != document_id
        });
        Ok((before - inner.citations.len()) as u64)
    }

    async fn replace_automated_citations(
        &self,
        source_document_id: Uuid,
        edges: Vec<NewCitation>,
    ) -> Result<Vec<Citation>> {
        for edge in &edges {
            edge.validate()?;
        }
        let mut inner = self.inner.lock().await;
        inner
            .citations
            .retain(|c| !(c.source_document_id == source_document_id && c.is_automated()));
        let rows: Vec<Citation> = edges.into_iter().map(citation_row).collect();
        inner.citations.extend(rows.iter().cloned());
        Ok(rows)
    }
}
