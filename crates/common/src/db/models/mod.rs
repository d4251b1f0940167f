//! SeaORM entity models
//!
//! Database entities for the citation graph

mod citation;
mod document;

pub use document::{
    Column as DocumentColumn,
    DocType,
    Entity as DocumentEntity,
    ExtractionStatus,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    ProcessingStatus,
};

pub use citation::{
    Column as CitationColumn,
    CreationSource,
    Entity as CitationEntity,
    Model as Citation,
    ActiveModel as CitationActiveModel,
};
