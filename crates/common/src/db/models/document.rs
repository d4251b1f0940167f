//! Document entity
//!
//! A document is either a main filing (the carrier of citations) or an
//! exhibit grouped under a main filing via `main_document_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document type enum (closed variant, never a raw string comparison)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    Main,
    Exhibit,
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Exhibit" => DocType::Exhibit,
            _ => DocType::Main,
        }
    }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self {
        match t {
            DocType::Main => "Main".to_string(),
            DocType::Exhibit => "Exhibit".to_string(),
        }
    }
}

/// Content ingestion status (OCR etc., independent of citation extraction)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl From<String> for ProcessingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

impl From<ProcessingStatus> for String {
    fn from(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Pending => "pending".to_string(),
            ProcessingStatus::Completed => "completed".to_string(),
            ProcessingStatus::Failed => "failed".to_string(),
        }
    }
}

/// Citation extraction status; absence means extraction was never requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<String> for ExtractionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in_progress" => ExtractionStatus::InProgress,
            "completed" => ExtractionStatus::Completed,
            "failed" => ExtractionStatus::Failed,
            _ => ExtractionStatus::Pending,
        }
    }
}

impl From<ExtractionStatus> for String {
    fn from(status: ExtractionStatus) -> Self {
        match status {
            ExtractionStatus::Pending => "pending".to_string(),
            ExtractionStatus::InProgress => "in_progress".to_string(),
            ExtractionStatus::Completed => "completed".to_string(),
            ExtractionStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning case; immutable after creation
    pub case_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// "Main" or "Exhibit"
    #[sea_orm(column_type = "Text")]
    pub doc_type: String,

    /// For an exhibit, the main document it was uploaded under
    pub main_document_id: Option<Uuid>,

    /// Opaque reference to the stored file, resolved externally to a URL
    #[sea_orm(column_type = "Text")]
    pub media_id: String,

    #[sea_orm(column_type = "Text")]
    pub processing_status: String,

    /// Null means extraction was never requested for this document
    #[sea_orm(column_type = "Text", nullable)]
    pub citations_extraction_status: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the document type as an enum
    pub fn doc_type(&self) -> DocType {
        DocType::from(self.doc_type.clone())
    }

    /// Get the processing status as an enum
    pub fn processing_status(&self) -> ProcessingStatus {
        ProcessingStatus::from(self.processing_status.clone())
    }

    /// Get the extraction status as an enum, if extraction was ever requested
    pub fn extraction_status(&self) -> Option<ExtractionStatus> {
        self.citations_extraction_status
            .clone()
            .map(ExtractionStatus::from)
    }

    pub fn is_main(&self) -> bool {
        self.doc_type() == DocType::Main
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::MainDocumentId",
        to = "Column::Id"
    )]
    MainDocument,
}

impl ActiveModelBehavior for ActiveModel {}
