//! Document management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use casegraph_common::{
    auth::AuthContext,
    citemap::CitationMapEntry,
    db::models::{DocType, Document, ProcessingStatus},
    db::{DocumentStore, NewDocument},
    errors::{AppError, Result},
    metrics,
    query::DocumentWithCounts,
};

/// Request to register a new document
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    pub doc_type: DocType,

    #[validate(length(min = 1, max = 255))]
    pub media_id: String,

    /// Required for exhibits, must be absent for main documents
    #[serde(default)]
    pub main_document_id: Option<Uuid>,
}

/// Request to set the content processing status
#[derive(Debug, Deserialize)]
pub struct UpdateProcessingStatusRequest {
    pub status: ProcessingStatus,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub items: Vec<DocumentWithCounts>,
}

#[derive(Serialize)]
pub struct CitationMapResponse {
    pub entries: Vec<CitationMapEntry>,
}

/// Register a document within a case
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let document = state
        .store
        .create_document(NewDocument {
            case_id,
            title: request.title,
            doc_type: request.doc_type,
            media_id: request.media_id,
            main_document_id: request.main_document_id,
        })
        .await?;

    tracing::info!(
        document_id = %document.id,
        case_id = %case_id,
        doc_type = %document.doc_type,
        subject = %auth.subject,
        "Document registered"
    );

    Ok((StatusCode::CREATED, Json(document)))
}

/// List all documents of a case with their citation counts
pub async fn list_case_documents(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<DocumentListResponse>> {
    let items = state.query.get_case_documents(case_id).await?;
    Ok(Json(DocumentListResponse { items }))
}

/// Aggregated citation map of a case
pub async fn get_citation_map(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<CitationMapResponse>> {
    let entries = state.query.get_citation_map(case_id).await?;
    Ok(Json(CitationMapResponse { entries }))
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Document>> {
    let document = state.query.get_document(document_id).await?;
    Ok(Json(document))
}

/// Set the content processing status of a document
pub async fn update_processing_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<UpdateProcessingStatusRequest>,
) -> Result<Json<Document>> {
    let document = state
        .store
        .update_processing_status(document_id, request.status)
        .await?;
    Ok(Json(document))
}

/// Delete a document, cascading to its exhibits and all touching edges
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode> {
    let removed = state.store.delete_document(document_id).await?;
    metrics::record_documents_deleted(removed as usize);

    tracing::info!(
        document_id = %document_id,
        documents_removed = removed,
        subject = %auth.subject,
        "Document deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}
