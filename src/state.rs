use crate::config::settings::AppConfig;
use crate::infrastructure::queue::Publisher;
use crate::infrastructure::storage::BlobStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub jwt_secret: Arc<str>,
    pub video_store: Arc<dyn BlobStore>,
    pub audio_store: Arc<dyn BlobStore>,
    pub publisher: Arc<dyn Publisher>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        jwt_secret: &str,
        video_store: Arc<dyn BlobStore>,
        audio_store: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            jwt_secret: Arc::from(jwt_secret),
            video_store,
            audio_store,
            publisher,
        }
    }
}
