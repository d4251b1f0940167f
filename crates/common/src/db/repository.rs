//! Repository pattern for database operations
//!
//! Postgres backend for the store contract. Multi-row mutations (cascade
//! deletes, batch inserts, automated-edge replacement) run inside a single
//! transaction; the extraction gate is a compare-and-set `UPDATE` so two
//! concurrent runs can never both pass it.

use crate::db::models::*;
use crate::db::store::{CitationStore, DocumentStore, NewCitation, NewDocument};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

fn citation_model(new: NewCitation) -> Citation {
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
        created_at: chrono::Utc::now().into(),
    }
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    async fn require_document<C: ConnectionTrait>(&self, conn: &C, id: Uuid) -> Result<Document> {
        DocumentEntity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl DocumentStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document> {
        match new.doc_type {
            DocType::Exhibit => {
                let parent_id = new.main_document_id.ok_or_else(|| AppError::Validation {
                    message: "an exhibit requires a main document".to_string(),
                    field: Some("main_document_id".to_string()),
                })?;
                let parent = DocumentEntity::find_by_id(parent_id)
                    .one(self.write_conn())
                    .await?;
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

        let now = chrono::Utc::now();
        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(new.case_id),
            title: Set(new.title),
            doc_type: Set(String::from(new.doc_type)),
            main_document_id: Set(new.main_document_id),
            media_id: Set(new.media_id),
            processing_status: Set(String::from(ProcessingStatus::Pending)),
            citations_extraction_status: Set(None),
            created_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn get_document(&self, id: Uuid) -> Result<Document> {
        self.require_document(self.read_conn(), id).await
    }

    async fn list_case_documents(&self, case_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::CaseId.eq(case_id))
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_processing_status(
        &self,
        id: Uuid,
        status: ProcessingStatus,
    ) -> Result<Document> {
        let current = self.require_document(self.write_conn(), id).await?;
        let demoted = status != ProcessingStatus::Completed;
        if demoted && current.extraction_status() == Some(ExtractionStatus::InProgress) {
            return Err(AppError::InvalidState {
                message: format!(
                    "cannot change processing status of document {} while citation extraction is running",
                    id
                ),
            });
        }
        let mut document: DocumentActiveModel = current.into();
        document.processing_status = Set(String::from(status));
        if demoted {
            // Extraction state never outlives processed content
            document.citations_extraction_status = Set(None);
        }
        document.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn update_extraction_status(
        &self,
        id: Uuid,
        status: Option<ExtractionStatus>,
    ) -> Result<Document> {
        let current = self.require_document(self.write_conn(), id).await?;
        if status.is_some() && current.processing_status() != ProcessingStatus::Completed {
            return Err(AppError::InvalidState {
                message: format!(
                    "cannot track citation extraction for document {} before its content is processed",
                    id
                ),
            });
        }
        let mut document: DocumentActiveModel = current.into();
        document.citations_extraction_status = Set(status.map(String::from));
        document.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn begin_extraction(&self, id: Uuid) -> Result<()> {
        // Single-statement compare-and-set: only one caller can move the
        // status to in_progress, everyone else sees zero rows affected.
        let result = DocumentEntity::update_many()
            .col_expr(
                DocumentColumn::CitationsExtractionStatus,
                Expr::value(String::from(ExtractionStatus::InProgress)),
            )
            .filter(DocumentColumn::Id.eq(id))
            .filter(DocumentColumn::ProcessingStatus.eq(String::from(ProcessingStatus::Completed)))
            .filter(
                Condition::any()
                    .add(DocumentColumn::CitationsExtractionStatus.is_null())
                    .add(
                        DocumentColumn::CitationsExtractionStatus
                            .ne(String::from(ExtractionStatus::InProgress)),
                    ),
            )
            .exec(self.write_conn())
            .await?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        // Gate not taken; figure out why
        let document = self.require_document(self.write_conn(), id).await?;
        if document.processing_status() != ProcessingStatus::Completed {
            return Err(AppError::InvalidState {
                message: format!("document {} is not processed yet", id),
            });
        }
        Err(AppError::ExtractionInProgress { id: id.to_string() })
    }

    async fn delete_document(&self, id: Uuid) -> Result<u64> {
        let txn = self.write_conn().begin().await?;

        self.require_document(&txn, id).await?;

        let mut victims: Vec<Uuid> = DocumentEntity::find()
            .filter(DocumentColumn::MainDocumentId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        victims.push(id);

        CitationEntity::delete_many()
            .filter(
                Condition::any()
                    .add(CitationColumn::SourceDocumentId.is_in(victims.clone()))
                    .add(CitationColumn::DestinationDocumentId.is_in(victims.clone())),
            )
            .exec(&txn)
            .await?;

        let deleted = DocumentEntity::delete_many()
            .filter(DocumentColumn::Id.is_in(victims))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(deleted.rows_affected)
    }
}

#[async_trait]
impl CitationStore for Repository {
    async fn create_citation(&self, new: NewCitation) -> Result<Citation> {
        new.validate()?;
        let row = citation_model(new);
        row.clone()
            .into_active_model()
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn bulk_create_citations(&self, edges: Vec<NewCitation>) -> Result<Vec<Citation>> {
        for edge in &edges {
            edge.validate()?;
        }
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Citation> = edges.into_iter().map(citation_model).collect();
        let txn = self.write_conn().begin().await?;
        CitationEntity::insert_many(rows.iter().cloned().map(IntoActiveModel::into_active_model))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(rows)
    }

    async fn list_citations_by_source(&self, document_id: Uuid) -> Result<Vec<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::SourceDocumentId.eq(document_id))
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_citations_by_destination(&self, document_id: Uuid) -> Result<Vec<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::DestinationDocumentId.eq(document_id))
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_case_citations(&self, case_id: Uuid) -> Result<Vec<Citation>> {
        let doc_ids: Vec<Uuid> = DocumentEntity::find()
            .filter(DocumentColumn::CaseId.eq(case_id))
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();

        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }

        CitationEntity::find()
            .filter(
                Condition::any()
                    .add(CitationColumn::SourceDocumentId.is_in(doc_ids.clone()))
                    .add(CitationColumn::DestinationDocumentId.is_in(doc_ids)),
            )
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_document_citations(&self, document_id: Uuid) -> Result<u64> {
        let result = CitationEntity::delete_many()
            .filter(
                Condition::any()
                    .add(CitationColumn::SourceDocumentId.eq(document_id))
                    .add(CitationColumn::DestinationDocumentId.eq(document_id)),
            )
            .exec(self.write_conn())
            .await?;
        Ok(result.rows_affected)
    }

    async fn replace_automated_citations(
        &self,
        source_document_id: Uuid,
        edges: Vec<NewCitation>,
    ) -> Result<Vec<Citation>> {
        for edge in &edges {
            edge.validate()?;
        }

        let rows: Vec<Citation> = edges.into_iter().map(citation_model).collect();
        let txn = self.write_conn().begin().await?;

        CitationEntity::delete_many()
            .filter(CitationColumn::SourceDocumentId.eq(source_document_id))
            .filter(CitationColumn::CreationSource.eq(String::from(CreationSource::Automated)))
            .exec(&txn)
            .await?;

        if !rows.is_empty() {
            CitationEntity::insert_many(
                rows.iter().cloned().map(IntoActiveModel::into_active_model),
            )
            .exec(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(rows)
    }
}
