use crate::modules::jobs::ConversionJob;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Claims the gateway reads from an externally issued access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// The ConversionJob that was enqueued for an upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub video_file_id: String,
    pub mp3_file_id: Option<String>,
    pub username: String,
}

impl From<ConversionJob> for UploadResponse {
    fn from(job: ConversionJob) -> Self {
        Self {
            video_file_id: job.video_file_id.to_string(),
            mp3_file_id: None,
            username: job.username,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// `mp3_file_id` from the completion notification
    pub fid: Option<String>,
}
