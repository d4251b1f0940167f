//! Citation entity for graph relationships
//!
//! A directed, textually-grounded edge from the document carrying the citing
//! text to the document being cited. Each row is one textual occurrence;
//! duplicates are collapsed only at aggregation time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a citation edge was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationSource {
    Automated,
    Manual,
}

impl From<String> for CreationSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "manual" => CreationSource::Manual,
            _ => CreationSource::Automated,
        }
    }
}

impl From<CreationSource> for String {
    fn from(source: CreationSource) -> Self {
        match source {
            CreationSource::Automated => "automated".to_string(),
            CreationSource::Manual => "manual".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Document where the citing text appears
    pub source_document_id: Uuid,

    /// Document being cited
    pub destination_document_id: Uuid,

    /// The literal string used in the source to refer to the destination
    #[sea_orm(column_type = "Text")]
    pub source_text: String,

    /// Spatial locators for highlighting; not part of graph semantics
    pub source_page_number: Option<i32>,
    pub source_rectangle_x1: Option<f64>,
    pub source_rectangle_y1: Option<f64>,
    pub source_rectangle_x2: Option<f64>,
    pub source_rectangle_y2: Option<f64>,
    pub destination_page_number: Option<i32>,

    /// "automated" or "manual"
    #[sea_orm(column_type = "Text")]
    pub creation_source: String,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the creation source as an enum
    pub fn creation_source(&self) -> CreationSource {
        CreationSource::from(self.creation_source.clone())
    }

    pub fn is_automated(&self) -> bool {
        self.creation_source() == CreationSource::Automated
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::SourceDocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    SourceDocument,

    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DestinationDocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    DestinationDocument,
}

impl ActiveModelBehavior for ActiveModel {}
