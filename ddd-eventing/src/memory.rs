//! 内存版事件源（InMemoryProvider）
//!
//! 基于 `tokio::sync::mpsc` 的轻量 Provider，同时实现 `Publisher`：
//! - `push`/`publish`：以新回执入队一个事件；
//! - `delete`/`requeue`：记录确认与重投，可选地立即以 `retry_count + 1` 重新投递；
//! - 典型用途：测试环境、示例与本地开发。
//!
//! 注意：重投不等待退避延迟，延迟值仅记录在 `RequeuedEvent` 中；
//! 缓冲区已满时重新投递被丢弃（仅记录日志）。

use crate::error::{EventingError, EventingResult as Result};
use crate::event::{Event, Payload, QueuedEvent};
use crate::provider::{Provider, ProviderStreams};
use crate::publisher::Publisher;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// 内存事件
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryEvent {
    name: String,
    data: Payload,
    receipt_token: String,
    deduplication_key: Option<String>,
    retry_count: u32,
}

impl InMemoryEvent {
    pub fn new(name: impl Into<String>, data: Payload) -> Self {
        Self {
            name: name.into(),
            data,
            receipt_token: Uuid::new_v4().to_string(),
            deduplication_key: None,
            retry_count: 0,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_deduplication_key(mut self, key: impl Into<String>) -> Self {
        self.deduplication_key = Some(key.into());
        self
    }

    fn redelivery(source: &dyn QueuedEvent) -> Self {
        Self {
            name: source.name().to_string(),
            data: source.data().clone(),
            receipt_token: Uuid::new_v4().to_string(),
            deduplication_key: source.deduplication_key().map(str::to_string),
            retry_count: source.retry_count().saturating_add(1),
        }
    }
}

impl Event for InMemoryEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> &Payload {
        &self.data
    }
}

#[async_trait]
impl QueuedEvent for InMemoryEvent {
    fn receipt_token(&self) -> &str {
        &self.receipt_token
    }

    fn deduplication_key(&self) -> Option<&str> {
        self.deduplication_key.as_deref()
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    async fn update_visibility_timeout(&self, _seconds: i32) -> Result<()> {
        Ok(())
    }
}

/// 一次重投记录
#[derive(Debug, Clone, PartialEq)]
pub struct RequeuedEvent {
    pub name: String,
    pub receipt_token: String,
    pub next_retry_count: u32,
    pub delay_seconds: u32,
    pub deduplication_key: Option<String>,
}

#[derive(Default)]
struct State {
    sender: Option<mpsc::Sender<Arc<dyn QueuedEvent>>>,
    receiver: Option<mpsc::Receiver<Arc<dyn QueuedEvent>>>,
    errors: Option<mpsc::Receiver<EventingError>>,
    error_sender: Option<mpsc::Sender<EventingError>>,
    started: bool,
    deleted: Vec<String>,
    requeued: Vec<RequeuedEvent>,
}

/// 简单的内存 Provider 实现
#[derive(Clone)]
pub struct InMemoryProvider {
    state: Arc<Mutex<State>>,
    maximum_retry_count: u32,
    redeliver: bool,
}

impl InMemoryProvider {
    /// 创建内存 Provider，`capacity` 为事件缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (err_tx, err_rx) = mpsc::channel(capacity);
        let state = State {
            sender: Some(tx),
            receiver: Some(rx),
            errors: Some(err_rx),
            error_sender: Some(err_tx),
            ..Default::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            maximum_retry_count: 25,
            redeliver: false,
        }
    }

    pub fn with_maximum_retry_count(mut self, maximum_retry_count: u32) -> Self {
        self.maximum_retry_count = maximum_retry_count;
        self
    }

    /// 重投时立即以 `retry_count + 1` 重新投递
    pub fn with_redelivery(mut self) -> Self {
        self.redeliver = true;
        self
    }

    /// 入队一个事件；Provider 已停止时返回错误
    pub async fn push(&self, event: InMemoryEvent) -> Result<()> {
        let sender = self
            .lock()
            .sender
            .clone()
            .ok_or_else(|| EventingError::provider("in-memory provider stopped"))?;

        sender
            .send(Arc::new(event))
            .await
            .map_err(|_| EventingError::provider("in-memory provider stopped"))
    }

    /// 模拟远端失败：向错误流推送一条错误
    pub async fn push_error(&self, err: EventingError) {
        let sender = self.lock().error_sender.clone();
        if let Some(sender) = sender {
            let _ = sender.send(err).await;
        }
    }

    /// 已删除事件的回执
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn requeued(&self) -> Vec<RequeuedEvent> {
        self.lock().requeued.clone()
    }

    /// 重投在工作者内部执行，不能阻塞等待通道空位
    fn try_redeliver(&self, event: InMemoryEvent) {
        let Some(sender) = self.lock().sender.clone() else {
            warn!(event = %event.name, "in-memory provider stopped, dropping redelivery");
            return;
        };
        match sender.try_send(Arc::new(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event = event.name(), "event buffer full, dropping redelivery");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(event = event.name(), "event stream closed, dropping redelivery");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // 状态仅包含计数与通道句柄，中毒后仍可安全读取
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn start(&self) -> Result<ProviderStreams> {
        let mut state = self.lock();
        if state.started {
            return Err(EventingError::provider("in-memory provider already started"));
        }
        let (Some(events), Some(errors)) = (state.receiver.take(), state.errors.take()) else {
            return Err(EventingError::provider("in-memory provider stopped"));
        };
        state.started = true;

        Ok(ProviderStreams {
            events: ReceiverStream::new(events).boxed(),
            errors: ReceiverStream::new(errors).boxed(),
        })
    }

    async fn delete(&self, event: &dyn QueuedEvent) {
        debug!(event = event.name(), receipt = event.receipt_token(), "deleting event");
        self.lock().deleted.push(event.receipt_token().to_string());
    }

    async fn requeue(&self, event: &dyn QueuedEvent) {
        let record = RequeuedEvent {
            name: event.name().to_string(),
            receipt_token: event.receipt_token().to_string(),
            next_retry_count: event.retry_count().saturating_add(1),
            delay_seconds: event.delay_seconds(),
            deduplication_key: event.deduplication_key().map(str::to_string),
        };
        debug!(
            event = event.name(),
            retries = record.next_retry_count,
            delay = record.delay_seconds,
            "requeueing event"
        );
        self.lock().requeued.push(record);

        if self.redeliver {
            self.try_redeliver(InMemoryEvent::redelivery(event));
        }
    }

    async fn stop(&self) {
        let mut state = self.lock();
        state.sender = None;
        state.error_sender = None;
        state.receiver = None;
        state.errors = None;
    }

    fn maximum_retry_count(&self) -> u32 {
        self.maximum_retry_count
    }
}

#[async_trait]
impl Publisher for InMemoryProvider {
    async fn publish(&self, event: &dyn Event) -> Result<()> {
        self.push(InMemoryEvent::new(event.name(), event.data().clone()))
            .await
    }
}
