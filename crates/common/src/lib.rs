//! CaseGraph Common Library
//!
//! Shared code for the CaseGraph services including:
//! - Database models and store backends
//! - Citation extraction pipeline
//! - Citation map aggregation
//! - Read-side query façade
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod citemap;
pub mod config;
pub mod db;
pub mod errors;
pub mod extraction;
pub mod metrics;
pub mod query;

// Re-export commonly used types
pub use citemap::{build_citation_map, CitationMapEntry, CitingDocument};
pub use config::AppConfig;
pub use db::{MemoryStore, Repository, Store};
pub use errors::{AppError, Result};
pub use extraction::{CitationExtractor, ExtractionOrchestrator};
pub use query::QueryService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
