use crate::common::error::PipelineError;
use crate::infrastructure::storage::BlobId;
use serde::{Deserialize, Serialize};

/// Wire shape shared by both queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    video_file_id: BlobId,
    #[serde(default)]
    mp3_file_id: Option<BlobId>,
    username: String,
}

impl JobEnvelope {
    fn validate(&self) -> Result<(), String> {
        if self.video_file_id.is_empty() {
            return Err("video_file_id must not be empty".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("username must not be empty".to_string());
        }
        Ok(())
    }
}

/// Request to extract audio from an uploaded video. Published on `video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobEnvelope", into = "JobEnvelope")]
pub struct ConversionJob {
    pub video_file_id: BlobId,
    pub username: String,
}

/// A finished conversion. Published on `mp3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobEnvelope", into = "JobEnvelope")]
pub struct CompletionJob {
    pub video_file_id: BlobId,
    pub mp3_file_id: BlobId,
    pub username: String,
}

impl ConversionJob {
    pub fn new(video_file_id: BlobId, username: impl Into<String>) -> Self {
        Self {
            video_file_id,
            username: username.into(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(payload).map_err(|e| PipelineError::MalformedMessage(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self).map_err(|e| PipelineError::MalformedMessage(e.to_string()))
    }

    /// Attaches the stored audio, carrying `username` through unchanged.
    pub fn complete(self, mp3_file_id: BlobId) -> CompletionJob {
        CompletionJob {
            video_file_id: self.video_file_id,
            mp3_file_id,
            username: self.username,
        }
    }
}

impl CompletionJob {
    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(payload).map_err(|e| PipelineError::MalformedMessage(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self).map_err(|e| PipelineError::MalformedMessage(e.to_string()))
    }
}

impl TryFrom<JobEnvelope> for ConversionJob {
    type Error = String;

    fn try_from(envelope: JobEnvelope) -> Result<Self, Self::Error> {
        envelope.validate()?;
        if envelope.mp3_file_id.is_some() {
            return Err("conversion job must not carry an mp3_file_id".to_string());
        }
        Ok(Self {
            video_file_id: envelope.video_file_id,
            username: envelope.username,
        })
    }
}

impl From<ConversionJob> for JobEnvelope {
    fn from(job: ConversionJob) -> Self {
        Self {
            video_file_id: job.video_file_id,
            mp3_file_id: None,
            username: job.username,
        }
    }
}

impl TryFrom<JobEnvelope> for CompletionJob {
    type Error = String;

    fn try_from(envelope: JobEnvelope) -> Result<Self, Self::Error> {
        envelope.validate()?;
        let mp3_file_id = envelope
            .mp3_file_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "completion job requires an mp3_file_id".to_string())?;
        Ok(Self {
            video_file_id: envelope.video_file_id,
            mp3_file_id,
            username: envelope.username,
        })
    }
}

impl From<CompletionJob> for JobEnvelope {
    fn from(job: CompletionJob) -> Self {
        Self {
            video_file_id: job.video_file_id,
            mp3_file_id: Some(job.mp3_file_id),
            username: job.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn conversion_job_serializes_null_mp3_id() {
        let job = ConversionJob::new(BlobId::from("v1"), "a@example.com");
        let value: Value = serde_json::from_slice(&job.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({ "video_file_id": "v1", "mp3_file_id": null, "username": "a@example.com" })
        );
    }

    #[test]
    fn conversion_job_accepts_missing_mp3_id() {
        let job = ConversionJob::decode(br#"{"video_file_id":"v1","username":"a@example.com"}"#)
            .unwrap();
        assert_eq!(job.video_file_id.as_str(), "v1");
    }

    #[test]
    fn conversion_job_ignores_unknown_keys() {
        let job = ConversionJob::decode(
            br#"{"video_file_id":"v1","mp3_file_id":null,"username":"a@example.com","extra":1}"#,
        )
        .unwrap();
        assert_eq!(job.username, "a@example.com");
    }

    #[test]
    fn invalid_conversion_payloads_are_malformed() {
        let cases: [&[u8]; 6] = [
            b"not-json",
            br#""not-json""#,
            br#"{"video_file_id":"v1"}"#,
            br#"{"video_file_id":"","username":"a@example.com"}"#,
            br#"{"video_file_id":"v1","username":"  "}"#,
            br#"{"video_file_id":"v1","mp3_file_id":"m1","username":"a@example.com"}"#,
        ];

        for payload in cases {
            let err = ConversionJob::decode(payload).unwrap_err();
            assert!(
                matches!(err, PipelineError::MalformedMessage(_)),
                "{:?} should be malformed",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn complete_carries_username_through() {
        let job = ConversionJob::new(BlobId::from("v1"), "a@example.com");
        let done = job.clone().complete(BlobId::from("m1"));

        assert_eq!(done.username, job.username);
        assert_eq!(done.video_file_id, job.video_file_id);
        assert_eq!(done.mp3_file_id.as_str(), "m1");
    }

    #[test]
    fn completion_job_wire_format() {
        let done = ConversionJob::new(BlobId::from("v1"), "a@example.com").complete(BlobId::from("m1"));
        let value: Value = serde_json::from_slice(&done.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({ "video_file_id": "v1", "mp3_file_id": "m1", "username": "a@example.com" })
        );
        assert_eq!(CompletionJob::decode(&done.encode().unwrap()).unwrap(), done);
    }

    #[test]
    fn completion_job_requires_mp3_id() {
        for payload in [
            br#"{"video_file_id":"v1","mp3_file_id":null,"username":"a@example.com"}"#.as_slice(),
            br#"{"video_file_id":"v1","mp3_file_id":"","username":"a@example.com"}"#.as_slice(),
        ] {
            assert!(matches!(
                CompletionJob::decode(payload),
                Err(PipelineError::MalformedMessage(_))
            ));
        }
    }
}
