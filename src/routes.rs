use crate::docs::ApiDoc;
use crate::state::AppState;
use axum::{Json, Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

pub fn configure_routes(state: AppState) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(crate::modules::gateway::router(state))
        .layer(cors)
}
