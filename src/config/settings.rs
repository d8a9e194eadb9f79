use crate::config::env::{EnvKey, EnvReader};
use crate::workers::notifier::NotifyFailurePolicy;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub rabbitmq_url: String,
    pub video_queue: String,
    pub mp3_queue: String,
    pub prefetch_count: u16,
    pub max_delivery_attempts: u32,
    pub retry_delay: Duration,
    pub minio_url: Option<String>,
    pub minio_bucket_videos: String,
    pub minio_bucket_mp3s: String,
    pub minio_access_key: Option<String>,
    pub minio_secret_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub max_upload_bytes: usize,
    pub extraction_timeout: Duration,
    pub ffmpeg_path: Option<String>,
    pub notify_failure_policy: NotifyFailurePolicy,
    pub mail_relay_url: Option<String>,
    pub mail_sender: Option<String>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_reader(&EnvReader::process())
    }

    /// Role-specific settings stay optional here and are checked with
    /// [`AppConfig::require`] by the role that needs them.
    pub fn from_reader<F>(env: &EnvReader<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_upload_mb: usize = env.get_parsed(EnvKey::MaxUploadMb, 512)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid {
                key: EnvKey::MaxUploadMb.as_str(),
                value: max_upload_mb.to_string(),
            })?;
        let retry_delay_secs: u64 = env.get_parsed(EnvKey::RetryDelaySecs, 5)?;
        let extraction_timeout_secs: u64 = env.get_parsed(EnvKey::ExtractionTimeoutSecs, 300)?;
        let max_delivery_attempts: u32 = env.get_parsed(EnvKey::MaxDeliveryAttempts, 5)?;
        if max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: EnvKey::MaxDeliveryAttempts.as_str(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_port: env.get_parsed(EnvKey::ServerPort, 8080)?,
            rabbitmq_url: env
                .get(EnvKey::RabbitMqUrl)
                .ok_or(ConfigError::Missing(EnvKey::RabbitMqUrl.as_str()))?,
            video_queue: env.get_or(EnvKey::VideoQueue, "video"),
            mp3_queue: env.get_or(EnvKey::Mp3Queue, "mp3"),
            prefetch_count: env.get_parsed(EnvKey::PrefetchCount, 1)?,
            max_delivery_attempts,
            retry_delay: Duration::from_secs(retry_delay_secs),
            minio_url: env.get(EnvKey::MinioUrl),
            minio_bucket_videos: env.get_or(EnvKey::MinioBucketVideos, "videos"),
            minio_bucket_mp3s: env.get_or(EnvKey::MinioBucketMp3s, "mp3s"),
            minio_access_key: env.get(EnvKey::MinioAccessKey),
            minio_secret_key: env.get(EnvKey::MinioSecretKey),
            jwt_secret: env.get(EnvKey::JwtSecret),
            max_upload_bytes,
            extraction_timeout: Duration::from_secs(extraction_timeout_secs),
            ffmpeg_path: env.get(EnvKey::FfmpegPath),
            notify_failure_policy: env.get_parsed(
                EnvKey::NotifyFailurePolicy,
                NotifyFailurePolicy::Retry,
            )?,
            mail_relay_url: env.get(EnvKey::MailRelayUrl),
            mail_sender: env.get(EnvKey::MailSender),
        })
    }

    pub fn require(value: &Option<String>, key: EnvKey) -> Result<&str, ConfigError> {
        value.as_deref().ok_or(ConfigError::Missing(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_reader(&EnvReader::new(|key: &str| vars.get(key).cloned()))
    }

    #[test]
    fn defaults_apply_when_only_broker_is_set() {
        let config = load(&[("RABBITMQ_URL", "amqp://rabbitmq:5672")]).unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.video_queue, "video");
        assert_eq!(config.mp3_queue, "mp3");
        assert_eq!(config.prefetch_count, 1);
        assert_eq!(config.max_delivery_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.minio_bucket_videos, "videos");
        assert_eq!(config.minio_bucket_mp3s, "mp3s");
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
        assert_eq!(config.extraction_timeout, Duration::from_secs(300));
        assert_eq!(config.notify_failure_policy, NotifyFailurePolicy::Retry);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn broker_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RABBITMQ_URL")));
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = load(&[("RABBITMQ_URL", "amqp://x"), ("VIDEO_QUEUE", "  ")]).unwrap();
        assert_eq!(config.video_queue, "video");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("RABBITMQ_URL", "amqp://x"),
            ("APP_PORT", "9000"),
            ("PREFETCH_COUNT", "4"),
            ("MAX_DELIVERY_ATTEMPTS", "2"),
            ("EXTRACTION_TIMEOUT_SECS", "30"),
            ("RETRY_DELAY_SECS", "1"),
            ("MAX_UPLOAD_MB", "2"),
            ("NOTIFY_FAILURE_POLICY", "dead_letter"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.prefetch_count, 4);
        assert_eq!(config.max_delivery_attempts, 2);
        assert_eq!(config.extraction_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.notify_failure_policy, NotifyFailurePolicy::DeadLetter);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = load(&[("RABBITMQ_URL", "amqp://x"), ("APP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "APP_PORT", .. }));
    }

    #[test]
    fn zero_delivery_attempts_is_rejected() {
        let err = load(&[("RABBITMQ_URL", "amqp://x"), ("MAX_DELIVERY_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_DELIVERY_ATTEMPTS", .. }));
    }

    #[test]
    fn upload_limit_that_overflows_is_rejected() {
        let huge = usize::MAX.to_string();
        let err = load(&[("RABBITMQ_URL", "amqp://x"), ("MAX_UPLOAD_MB", huge.as_str())]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_UPLOAD_MB", .. }));
    }

    #[test]
    fn require_reports_missing_key() {
        let config = load(&[("RABBITMQ_URL", "amqp://x")]).unwrap();
        let err = AppConfig::require(&config.jwt_secret, EnvKey::JwtSecret).unwrap_err();
        assert_eq!(err.to_string(), "JWT_SECRET must be set");
    }
}
