use crate::config::env::EnvKey;
use crate::config::settings::AppConfig;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::S3BlobStore;
use crate::state::AppState;
use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn create_app(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    crate::routes::configure_routes(state.clone())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_gateway(
    config: AppConfig,
    port: Option<u16>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let jwt_secret = AppConfig::require(&config.jwt_secret, EnvKey::JwtSecret)?.to_string();

    let client = S3BlobStore::client_from_config(&config)?;
    let video_store = S3BlobStore::new(client.clone(), &config.minio_bucket_videos);
    let audio_store = S3BlobStore::new(client, &config.minio_bucket_mp3s);
    video_store.ensure_bucket().await?;
    audio_store.ensure_bucket().await?;

    let broker = RabbitMqService::new(&config.rabbitmq_url, &[config.video_queue.as_str()])
        .await
        .context("Failed to connect to RabbitMQ")?;

    let port = port.unwrap_or(config.server_port);
    let state = AppState::new(
        config,
        &jwt_secret,
        Arc::new(video_store),
        Arc::new(audio_store),
        Arc::new(broker),
    );
    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 Gateway running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Gateway stopped");
    Ok(())
}
