//! Caller identity utilities
//!
//! Authentication itself is delegated to the external identity provider; the
//! engine only carries an opaque caller identity for audit logging and edge
//! provenance. No token validation happens here.

use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Extracted caller context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Opaque subject from the bearer token (as issued by the identity provider)
    pub subject: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// Extract the bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        // Extract request ID
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let subject = extract_bearer(auth_header)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header is not a bearer token".to_string(),
            })?
            .to_string();

        Ok(AuthContext {
            subject,
            request_id,
        })
    }
}
