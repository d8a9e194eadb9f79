use super::dto::{DownloadQuery, TokenClaims, UploadResponse};
use super::service::GatewayService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 204, description = "Gateway is up")
    ),
    tag = "Gateway"
)]
pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Upload a video for MP3 conversion
/// Exactly one file part is accepted; the job is queued before this returns.
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Conversion queued", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Exactly 1 file required"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Gateway",
    security(("bearer_auth" = []))
)]
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<TokenClaims>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let video = single_file(multipart).await?;
    info!("Upload of {} bytes from {}", video.len(), claims.username);

    let job = GatewayService::submit(
        state.video_store.as_ref(),
        state.publisher.as_ref(),
        &state.config.video_queue,
        video,
        &claims.username,
    )
    .await?;

    Ok(ApiSuccess(
        ApiResponse::success(UploadResponse::from(job), "Conversion queued"),
        StatusCode::OK,
    )
    .into_response())
}

async fn single_file(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(&e.body_text()))?
    {
        if field.file_name().is_none() {
            continue;
        }
        if file.is_some() {
            return Err(ApiError::bad_request("Exactly 1 file required"));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(&e.body_text()))?;
        file = Some(data);
    }

    file.ok_or_else(|| ApiError::bad_request("Exactly 1 file required"))
}

/// Download a converted MP3
#[utoipa::path(
    get,
    path = "/download",
    params(DownloadQuery),
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg"),
        (status = 400, description = "fid is required"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No such MP3"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Gateway",
    security(("bearer_auth" = []))
)]
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let fid = query
        .fid
        .filter(|fid| !fid.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("fid is required"))?;

    let audio = GatewayService::fetch_audio(state.audio_store.as_ref(), &fid).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.mp3\"", fid),
            ),
        ],
        audio,
    )
        .into_response())
}
