//! Citation extraction handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use casegraph_common::{auth::AuthContext, errors::Result};

/// Result of a synchronous extraction run
#[derive(Serialize)]
pub struct ExtractionRunResponse {
    pub citations_created: usize,
    pub spans_skipped: usize,
}

/// Run citation extraction for a document
///
/// Returns 409 while another run is live for the same document and 409 when
/// the document's content is not yet processed; provider failures surface
/// as 502 with the status settled to failed.
pub async fn extract_citations(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ExtractionRunResponse>> {
    tracing::info!(
        document_id = %document_id,
        subject = %auth.subject,
        "Citation extraction requested"
    );

    let outcome = state.orchestrator.run(document_id).await?;

    Ok(Json(ExtractionRunResponse {
        citations_created: outcome.citations_created,
        spans_skipped: outcome.spans_skipped,
    }))
}
