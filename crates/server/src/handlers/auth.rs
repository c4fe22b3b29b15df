//! Authentication-related endpoints.

use crate::auth::AuthenticatedUser;
use axum::Json;
use nimbus_core::SessionClaims;

/// GET /auth/whoami - Return the caller's identity claims.
pub async fn whoami(user: AuthenticatedUser) -> Json<SessionClaims> {
    tracing::debug!(subject = %user.claims.subject, "whoami");
    Json(user.claims)
}
