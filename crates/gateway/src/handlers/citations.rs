//! Citation edge handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use casegraph_common::{
    auth::AuthContext,
    db::models::{Citation, CreationSource},
    db::{CitationStore, DocumentStore, NewCitation, Rectangle},
    errors::{AppError, Result},
    metrics,
    query::DocumentCitations,
};

/// Request to hand-link a citation
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCitationRequest {
    pub destination_document_id: Uuid,

    #[validate(length(min = 1, max = 10000))]
    pub source_text: String,

    #[serde(default)]
    pub source_page_number: Option<i32>,

    #[serde(default)]
    pub source_rectangle: Option<Rectangle>,

    #[serde(default)]
    pub destination_page_number: Option<i32>,
}

/// Both edge directions of a document
pub async fn get_document_citations(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentCitations>> {
    let citations = state.query.get_document_citations(document_id).await?;
    Ok(Json(citations))
}

/// Hand-link a citation from a document
///
/// Manual edges survive automated extraction re-runs.
pub async fn create_citation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<CreateCitationRequest>,
) -> Result<(StatusCode, Json<Citation>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    // Both endpoints must exist before the edge does
    state.store.get_document(document_id).await?;
    state
        .store
        .get_document(request.destination_document_id)
        .await?;

    let citation = state
        .store
        .create_citation(NewCitation {
            source_document_id: document_id,
            destination_document_id: request.destination_document_id,
            source_text: request.source_text,
            source_page_number: request.source_page_number,
            source_rectangle: request.source_rectangle,
            destination_page_number: request.destination_page_number,
            creation_source: CreationSource::Manual,
        })
        .await?;
    metrics::record_citations_created(1, "manual");

    tracing::info!(
        citation_id = %citation.id,
        source_document_id = %document_id,
        destination_document_id = %request.destination_document_id,
        subject = %auth.subject,
        "Citation hand-linked"
    );

    Ok((StatusCode::CREATED, Json(citation)))
}
