use crate::common::response::ApiError;
use crate::modules::gateway::dto::TokenClaims;
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

/// Only admin tokens may upload or download.
pub async fn admin_guard(
    Extension(claims): Extension<TokenClaims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !claims.admin {
        return Err(ApiError::unauthorized("Not authorized"));
    }

    Ok(next.run(req).await)
}
