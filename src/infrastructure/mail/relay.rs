use super::{NotifyError, Notifier};
use crate::infrastructure::storage::BlobId;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MailRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailRequest {
    pub fn mp3_ready(sender: &str, recipient: &str, mp3_file_id: &BlobId) -> Self {
        Self {
            from: sender.to_string(),
            to: recipient.to_string(),
            subject: "MP3 Download".to_string(),
            body: format!("mp3 file_id: {} is now ready!", mp3_file_id),
        }
    }
}

/// Hands mail to an HTTP relay that owns the SMTP session.
#[derive(Clone)]
pub struct MailRelayNotifier {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
}

impl MailRelayNotifier {
    pub fn new(endpoint: &str, sender: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            sender: sender.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn notify(&self, recipient: &str, mp3_file_id: &BlobId) -> Result<(), NotifyError> {
        let request = MailRequest::mp3_ready(&self.sender, recipient, mp3_file_id);

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(mp3_file_id = %mp3_file_id, "📧 Mail sent to {}", recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ready_message_names_the_file() {
        let request = MailRequest::mp3_ready("noreply@example.com", "a@example.com", &BlobId::from("m1"));

        assert_eq!(request.to, "a@example.com");
        assert_eq!(request.subject, "MP3 Download");
        assert_eq!(request.body, "mp3 file_id: m1 is now ready!");
    }

    #[tokio::test]
    async fn posts_mail_to_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(serde_json::json!({
                "from": "noreply@example.com",
                "to": "a@example.com",
                "subject": "MP3 Download",
                "body": "mp3 file_id: m1 is now ready!"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            MailRelayNotifier::new(&format!("{}/send", server.uri()), "noreply@example.com").unwrap();

        notifier
            .notify("a@example.com", &BlobId::from("m1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relay_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("smtp down"))
            .mount(&server)
            .await;

        let notifier = MailRelayNotifier::new(&server.uri(), "noreply@example.com").unwrap();
        let err = notifier
            .notify("a@example.com", &BlobId::from("m1"))
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Rejected { status: 503, ref body } if body == "smtp down"));
    }
}
