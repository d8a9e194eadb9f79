use crate::config::settings::ConfigError;
use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    RabbitMqUrl,
    VideoQueue,
    Mp3Queue,
    PrefetchCount,
    MaxDeliveryAttempts,
    RetryDelaySecs,
    MinioUrl,
    MinioBucketVideos,
    MinioBucketMp3s,
    MinioAccessKey,
    MinioSecretKey,
    JwtSecret,
    MaxUploadMb,
    ExtractionTimeoutSecs,
    FfmpegPath,
    NotifyFailurePolicy,
    MailRelayUrl,
    MailSender,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::VideoQueue => "VIDEO_QUEUE",
            EnvKey::Mp3Queue => "MP3_QUEUE",
            EnvKey::PrefetchCount => "PREFETCH_COUNT",
            EnvKey::MaxDeliveryAttempts => "MAX_DELIVERY_ATTEMPTS",
            EnvKey::RetryDelaySecs => "RETRY_DELAY_SECS",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucketVideos => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioBucketMp3s => "MINIO_BUCKET_MP3S",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::MaxUploadMb => "MAX_UPLOAD_MB",
            EnvKey::ExtractionTimeoutSecs => "EXTRACTION_TIMEOUT_SECS",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::NotifyFailurePolicy => "NOTIFY_FAILURE_POLICY",
            EnvKey::MailRelayUrl => "MAIL_RELAY_URL",
            EnvKey::MailSender => "MAIL_SENDER",
        }
    }
}

/// Reads settings through a lookup function so tests can supply a map
/// instead of mutating the process environment.
pub struct EnvReader<F> {
    lookup: F,
}

impl EnvReader<fn(&str) -> Option<String>> {
    pub fn process() -> Self {
        Self {
            lookup: |key| env::var(key).ok(),
        }
    }
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Blank values count as unset.
    pub fn get(&self, key: EnvKey) -> Option<String> {
        (self.lookup)(key.as_str()).filter(|v| !v.trim().is_empty())
    }

    pub fn get_or(&self, key: EnvKey, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_parsed<T: FromStr>(&self, key: EnvKey, default: T) -> Result<T, ConfigError> {
        let name = key.as_str();
        match self.get(key) {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => Ok(value),
                Err(_) => Err(ConfigError::Invalid { key: name, value: raw }),
            },
            None => Ok(default),
        }
    }
}
