//! SQS 事件源（SqsProvider）
//!
//! 单个后台任务长轮询队列：解码消息并推入有界事件流（默认深度 100，满则阻塞形成背压），
//! 传输错误与解码错误推入错误流后继续轮询，不会因单次失败终止。
//! 删除与重投直接调用远端，失败同样经错误流上报；错误流满时最多等待
//! `ERROR_SEND_TIMEOUT`，仍无空位则只记录日志。
//!
use super::client::{AwsSqsClient, OutgoingMessage, QueueClient};
use super::codec::{self, RETRY_COUNT_ATTRIBUTE};
use super::event::SqsEvent;
use async_trait::async_trait;
use bon::Builder;
use ddd_eventing::error::{EventingError, EventingResult as Result};
use ddd_eventing::event::QueuedEvent;
use ddd_eventing::provider::{Provider, ProviderStreams};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 删除/重投失败写入错误流的最长等待
const ERROR_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// SQS Provider 配置
#[derive(Clone, Builder)]
pub struct SqsProviderConfig {
    /// 队列 URL（必填）
    #[builder(into)]
    queue_url: String,
    /// 自定义客户端；缺省时使用默认凭证链构建 AWS 客户端
    client: Option<Arc<dyn QueueClient>>,
    /// 最大重试次数
    #[builder(default = 25)]
    maximum_retry_count: u32,
    #[builder(into, default = String::from("us-east-1"))]
    region: String,
    /// 自定义端点（LocalStack、ElasticMQ 等）
    #[builder(into)]
    endpoint_url: Option<String>,
    /// 长轮询等待秒数
    #[builder(default = 20)]
    wait_time_seconds: i32,
    #[builder(default = 10)]
    max_messages: i32,
    /// 事件流缓冲深度
    #[builder(default = 100)]
    event_buffer: usize,
    #[builder(default = 16)]
    error_buffer: usize,
    /// 接收失败后的暂停时长
    #[builder(default = Duration::from_secs(1))]
    poll_error_delay: Duration,
}

pub struct SqsProvider {
    client: Arc<dyn QueueClient>,
    queue_url: Arc<str>,
    maximum_retry_count: u32,
    wait_time_seconds: i32,
    max_messages: i32,
    event_buffer: usize,
    error_buffer: usize,
    poll_error_delay: Duration,
    started: AtomicBool,
    done: CancellationToken,
    errors: Mutex<Option<mpsc::Sender<EventingError>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SqsProvider {
    pub async fn new(config: SqsProviderConfig) -> Result<Self> {
        if config.queue_url.trim().is_empty() {
            return Err(EventingError::invalid_config("queue_url is required"));
        }
        if config.event_buffer == 0 || config.error_buffer == 0 {
            return Err(EventingError::invalid_config("stream buffers must be positive"));
        }

        let client = match config.client {
            Some(client) => client,
            None => Arc::new(
                AwsSqsClient::from_env(&config.region, config.endpoint_url.as_deref()).await,
            ),
        };

        Ok(Self {
            client,
            queue_url: Arc::from(config.queue_url),
            maximum_retry_count: config.maximum_retry_count,
            wait_time_seconds: config.wait_time_seconds,
            max_messages: config.max_messages,
            event_buffer: config.event_buffer,
            error_buffer: config.error_buffer,
            poll_error_delay: config.poll_error_delay,
            started: AtomicBool::new(false),
            done: CancellationToken::new(),
            errors: Mutex::new(None),
            poller: Mutex::new(None),
        })
    }

    /// 修改指定投递的可见期，错误同步返回
    pub async fn update_visibility_timeout(
        &self,
        receipt_handle: &str,
        seconds: i32,
    ) -> Result<()> {
        self.client
            .change_message_visibility(&self.queue_url, receipt_handle, seconds)
            .await
    }

    async fn report(&self, err: EventingError) {
        warn!(queue_url = %self.queue_url, error = %err, "sqs operation failed");
        let sender = lock(&self.errors).clone();
        let Some(sender) = sender else {
            return;
        };
        if tokio::time::timeout(ERROR_SEND_TIMEOUT, sender.send(err))
            .await
            .is_err()
        {
            warn!("error stream full, dropping error");
        }
    }
}

#[async_trait]
impl Provider for SqsProvider {
    async fn start(&self) -> Result<ProviderStreams> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EventingError::provider("sqs provider already started"));
        }

        let (event_tx, event_rx) = mpsc::channel(self.event_buffer);
        let (error_tx, error_rx) = mpsc::channel(self.error_buffer);
        *lock(&self.errors) = Some(error_tx.clone());

        let poller = Poller {
            client: self.client.clone(),
            queue_url: self.queue_url.clone(),
            wait_time_seconds: self.wait_time_seconds,
            max_messages: self.max_messages,
            poll_error_delay: self.poll_error_delay,
            done: self.done.clone(),
            events: event_tx,
            errors: error_tx,
        };
        *lock(&self.poller) = Some(tokio::spawn(poller.run()));
        info!(queue_url = %self.queue_url, "listening for events");

        Ok(ProviderStreams {
            events: ReceiverStream::new(event_rx).boxed(),
            errors: ReceiverStream::new(error_rx).boxed(),
        })
    }

    async fn delete(&self, event: &dyn QueuedEvent) {
        if let Err(err) = self
            .client
            .delete_message(&self.queue_url, event.receipt_token())
            .await
        {
            self.report(err).await;
        }
    }

    async fn requeue(&self, event: &dyn QueuedEvent) {
        self.delete(event).await;

        let body = match codec::encode(event.name(), event.data()) {
            Ok(body) => body,
            Err(err) => {
                self.report(err).await;
                return;
            }
        };

        let retry_count = event.retry_count().saturating_add(1);
        let delay_seconds = event.delay_seconds();
        let message = OutgoingMessage {
            body,
            delay_seconds: i32::try_from(delay_seconds).unwrap_or(i32::MAX),
            deduplication_id: event.deduplication_key().map(str::to_string),
            number_attributes: HashMap::from([(
                RETRY_COUNT_ATTRIBUTE.to_string(),
                retry_count.to_string(),
            )]),
        };

        debug!(
            event = event.name(),
            retries = retry_count,
            delay = delay_seconds,
            "requeueing event"
        );
        if let Err(err) = self.client.send_message(&self.queue_url, message).await {
            self.report(err).await;
        }
    }

    async fn stop(&self) {
        self.done.cancel();
        lock(&self.errors).take();

        let poller = lock(&self.poller).take();
        if let Some(handle) = poller {
            if let Err(err) = handle.await {
                error!(error = %err, "sqs poll loop crashed");
            }
        }
        info!(queue_url = %self.queue_url, "stopped listening for events");
    }

    fn maximum_retry_count(&self) -> u32 {
        self.maximum_retry_count
    }
}

struct Poller {
    client: Arc<dyn QueueClient>,
    queue_url: Arc<str>,
    wait_time_seconds: i32,
    max_messages: i32,
    poll_error_delay: Duration,
    done: CancellationToken,
    events: mpsc::Sender<Arc<dyn QueuedEvent>>,
    errors: mpsc::Sender<EventingError>,
}

impl Poller {
    async fn run(self) {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.done.cancelled() => break,
                res = self.client.receive_messages(
                    &self.queue_url,
                    self.wait_time_seconds,
                    self.max_messages,
                ) => res,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(error = %err, "receive failed");
                    if !self.publish_error(err).await {
                        break;
                    }
                    tokio::select! {
                        _ = self.done.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_error_delay) => continue,
                    }
                }
            };

            if !messages.is_empty() {
                debug!(batch_size = messages.len(), "received sqs batch");
            }

            for message in &messages {
                let delivered = match codec::decode(message) {
                    Ok(decoded) => {
                        let event =
                            SqsEvent::new(decoded, self.client.clone(), self.queue_url.clone());
                        self.publish_event(Arc::new(event)).await
                    }
                    Err(err) => {
                        warn!(error = %err, "skipping undecodable message");
                        self.publish_error(err).await
                    }
                };
                if !delivered {
                    debug!("poll loop stopped mid-batch");
                    return;
                }
            }
        }
        debug!("poll loop stopped");
    }

    async fn publish_event(&self, event: Arc<dyn QueuedEvent>) -> bool {
        tokio::select! {
            biased;
            _ = self.done.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    /// 错误流无人消费时直接丢弃，仅在停止时返回 false
    async fn publish_error(&self, err: EventingError) -> bool {
        tokio::select! {
            biased;
            _ = self.done.cancelled() => false,
            _ = self.errors.send(err) => true,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
