//! Recording doubles for broker, codec and mail collaborators.

use crate::infrastructure::codec::{AudioExtractor, ExtractError};
use crate::infrastructure::mail::{NotifyError, Notifier};
use crate::infrastructure::queue::{
    Acknowledger, Delivery, DeliveryStream, InboundMessage, OutboundMessage, Publisher, QueueError,
    Subscriber,
};
use crate::infrastructure::storage::BlobId;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Ordered record of broker-visible side effects shared between doubles.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct RecordingPublisher {
    log: EventLog,
    failing: AtomicBool,
    published: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingPublisher {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            failing: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), QueueError> {
        if self.failing.load(Ordering::SeqCst) {
            self.log.record(format!("publish-failed:{}", queue));
            return Err(QueueError::Publish("broker unreachable".to_string()));
        }
        self.log.record(format!("publish:{}", queue));
        self.published.lock().unwrap().push((queue.to_string(), message));
        Ok(())
    }
}

pub struct RecordingAcker {
    log: EventLog,
}

impl RecordingAcker {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.log.record("ack");
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), QueueError> {
        self.log.record(format!("nack:requeue={}", requeue));
        Ok(())
    }
}

/// Hands out one scripted subscription per `subscribe` call. Each session
/// yields its payloads and then closes; once the script runs out the stream
/// stays open and idle.
pub struct ScriptedSubscriber {
    log: EventLog,
    sessions: Mutex<VecDeque<Option<Vec<&'static str>>>>,
}

impl ScriptedSubscriber {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            sessions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn session(self, payloads: &[&'static str]) -> Self {
        self.sessions.lock().unwrap().push_back(Some(payloads.to_vec()));
        self
    }

    pub fn refusing(self) -> Self {
        self.sessions.lock().unwrap().push_back(None);
        self
    }
}

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    async fn subscribe(
        &self,
        queue: &str,
        _consumer_tag: &str,
        _prefetch: u16,
    ) -> Result<DeliveryStream, QueueError> {
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(None) => {
                self.log.record(format!("subscribe-refused:{}", queue));
                Err(QueueError::Consume("channel closed".to_string()))
            }
            Some(Some(payloads)) => {
                self.log.record(format!("subscribe:{}", queue));
                let log = self.log.clone();
                let queue = queue.to_string();
                let deliveries = payloads.into_iter().map(move |payload| {
                    Ok::<_, QueueError>(Delivery {
                        message: InboundMessage {
                            queue: queue.clone(),
                            payload: payload.as_bytes().to_vec(),
                            attempt: 1,
                            redelivered: false,
                        },
                        acker: Box::new(RecordingAcker::new(log.clone())),
                    })
                });
                Ok(stream::iter(deliveries).boxed())
            }
            None => {
                self.log.record(format!("subscribe:{}", queue));
                Ok(stream::pending().boxed())
            }
        }
    }
}

/// Returns fixed audio, or fails like ffmpeg does on corrupt input.
pub struct StubExtractor {
    audio: Option<Bytes>,
}

impl StubExtractor {
    pub fn producing(audio: &'static [u8]) -> Self {
        Self {
            audio: Some(Bytes::from_static(audio)),
        }
    }

    pub fn failing() -> Self {
        Self { audio: None }
    }
}

#[async_trait]
impl AudioExtractor for StubExtractor {
    async fn extract(&self, _video: Bytes) -> Result<Bytes, ExtractError> {
        self.audio.clone().ok_or_else(|| ExtractError::Failed {
            code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        })
    }
}

#[derive(Default)]
pub struct StubNotifier {
    failing: bool,
    sent: Mutex<Vec<(String, BlobId)>>,
}

impl StubNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, BlobId)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn notify(&self, recipient: &str, mp3_file_id: &BlobId) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "relay down".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), mp3_file_id.clone()));
        Ok(())
    }
}
