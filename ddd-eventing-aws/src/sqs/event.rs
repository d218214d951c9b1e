//! SQS 事件（SqsEvent）
//!
//! 在领域事件之上携带 SQS 投递元信息，并持有远端客户端句柄，
//! 使处理器可以直接为本次投递续期可见期。
//!
use super::client::QueueClient;
use super::codec::DecodedMessage;
use async_trait::async_trait;
use ddd_eventing::error::EventingResult as Result;
use ddd_eventing::event::{Event, Payload, QueuedEvent};
use std::fmt;
use std::sync::Arc;

pub struct SqsEvent {
    name: String,
    data: Payload,
    receipt_handle: String,
    deduplication_id: Option<String>,
    retry_count: u32,
    client: Arc<dyn QueueClient>,
    queue_url: Arc<str>,
}

impl SqsEvent {
    pub(crate) fn new(
        decoded: DecodedMessage,
        client: Arc<dyn QueueClient>,
        queue_url: Arc<str>,
    ) -> Self {
        Self {
            name: decoded.name,
            data: decoded.data,
            receipt_handle: decoded.receipt_handle,
            deduplication_id: decoded.deduplication_id,
            retry_count: decoded.retry_count,
            client,
            queue_url,
        }
    }
}

impl fmt::Debug for SqsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsEvent")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("receipt_handle", &self.receipt_handle)
            .field("deduplication_id", &self.deduplication_id)
            .field("retry_count", &self.retry_count)
            .field("queue_url", &self.queue_url)
            .finish()
    }
}

impl Event for SqsEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> &Payload {
        &self.data
    }
}

#[async_trait]
impl QueuedEvent for SqsEvent {
    fn receipt_token(&self) -> &str {
        &self.receipt_handle
    }

    fn deduplication_key(&self) -> Option<&str> {
        self.deduplication_id.as_deref()
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    async fn update_visibility_timeout(&self, seconds: i32) -> Result<()> {
        self.client
            .change_message_visibility(&self.queue_url, &self.receipt_handle, seconds)
            .await
    }
}
