use async_trait::async_trait;
use exam_lookup_core::contract::LookupResult;
use exam_lookup_core::lookup::BoxError;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not serialize notification payload")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to send notification to the downstream queue")]
    Send(#[source] BoxError),
}

/// Hands a resolved lookup to the downstream queue.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, result: &LookupResult) -> Result<PublishReceipt, PublishError>;
}

pub struct SqsNotificationPublisher {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsNotificationPublisher {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for SqsNotificationPublisher {
    async fn publish(&self, result: &LookupResult) -> Result<PublishReceipt, PublishError> {
        let body = serde_json::to_string(result).map_err(PublishError::Serialize)?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|error| PublishError::Send(Box::new(error)))?;

        let receipt = PublishReceipt {
            message_id: output.message_id().map(str::to_string),
        };
        info!(
            queue_url = %self.queue_url,
            message_id = receipt.message_id.as_deref().unwrap_or("unknown"),
            "notification published"
        );
        Ok(receipt)
    }
}
