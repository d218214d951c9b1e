//! 事件监听器（Listener）
//!
//! 统一编排“拉取 → 分发处理 → 确认/重投”的长驻任务：
//! - 启动 Provider，取得事件流与错误流；
//! - 以固定容量的工作池并发消费事件流，按事件名匹配处理器并依序执行；
//! - 成功则删除，失败则按重试上限重投或上报“重试耗尽”；
//! - 监督工作者退出并补位，收到停止信号后关闭 Provider。
//!
use crate::error::{EventingError, EventingResult as Result};
use crate::event::QueuedEvent;
use crate::handler::{EventHandler, FnHandler};
use crate::pool::WorkerPool;
use crate::provider::{EventStream, Provider, ProviderStreams};
use bon::Builder;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 终止性错误回调（如重试耗尽）
pub type ErrorCallback = Arc<dyn Fn(&EventingError) + Send + Sync>;

type SharedEvents = Arc<Mutex<EventStream>>;

/// Listener：从 Provider 接收事件并交给已注册的处理器
#[derive(Builder)]
pub struct Listener {
    provider: Arc<dyn Provider>,
    #[builder(default)]
    config: ListenerConfig,
    error_handler: Option<ErrorCallback>,
    #[builder(skip)]
    registry: HandlerRegistry,
    #[builder(skip)]
    halt: CancellationToken,
}

impl Listener {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::builder().provider(provider).build()
    }

    /// 为事件名追加一个处理器；同名处理器按注册顺序执行
    pub fn register_handler(
        &mut self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        self.registry.register(event_name.into(), handler);
    }

    /// 以闭包注册处理器，处理器名即事件名
    pub fn register_fn<F, Fut>(&mut self, event_name: impl Into<String>, f: F)
    where
        F: Fn(Arc<dyn QueuedEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let event_name = event_name.into();
        let handler = Arc::new(FnHandler::new(event_name.clone(), f));
        self.registry.register(event_name, handler);
    }

    /// 设置终止性错误回调
    pub fn on_error(&mut self, f: impl Fn(&EventingError) + Send + Sync + 'static) {
        self.error_handler = Some(Arc::new(f));
    }

    /// 工作者数量：每个已注册事件名 `workers_per_event` 个
    pub fn capacity(&self) -> usize {
        self.registry.len() * self.config.workers_per_event
    }

    /// 停止信号；可克隆后交给其它任务（如 ctrl-c 监听）
    pub fn halt_token(&self) -> CancellationToken {
        self.halt.clone()
    }

    pub fn halt(&self) {
        self.halt.cancel();
    }

    /// 阻塞运行直至收到停止信号或事件流关闭
    pub async fn listen(&self) -> Result<()> {
        let capacity = self.capacity();
        if capacity == 0 {
            return Err(EventingError::NoHandlers);
        }

        let ProviderStreams { events, mut errors } = self.provider.start().await?;
        let events: SharedEvents = Arc::new(Mutex::new(events));
        let worker = Worker {
            provider: self.provider.clone(),
            registry: Arc::new(self.registry.clone()),
            config: self.config,
            error_handler: self.error_handler.clone(),
        };

        let mut pool = WorkerPool::new(capacity);
        pool.fill(|| worker.clone().run(events.clone()));
        info!(workers = capacity, "listener started");

        let mut stream_closed = false;
        let mut errors_closed = false;

        loop {
            tokio::select! {
                biased;
                _ = self.halt.cancelled() => {
                    info!("halting listener");
                    break;
                }
                maybe_err = errors.next(), if !errors_closed => match maybe_err {
                    Some(err) => warn!(error = %err, "provider error"),
                    None => errors_closed = true,
                },
                joined = pool.join_next() => match joined {
                    None => {
                        info!("event stream closed, all workers exited");
                        break;
                    }
                    Some(Ok(WorkerExit::StreamClosed)) => {
                        stream_closed = true;
                    }
                    Some(Ok(WorkerExit::Recycled)) => {
                        if !stream_closed && !self.halt.is_cancelled() {
                            pool.spawn(worker.clone().run(events.clone()));
                        }
                    }
                    Some(Err(join_err)) => {
                        error!(error = %join_err, "worker crashed");
                        if !stream_closed && !self.halt.is_cancelled() {
                            pool.spawn(worker.clone().run(events.clone()));
                        }
                    }
                },
            }
        }

        self.provider.stop().await;
        self.drain(&mut pool).await;
        Ok(())
    }

    async fn drain(&self, pool: &mut WorkerPool<WorkerExit>) {
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while pool.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = pool.active(),
                "workers still busy after shutdown timeout, detaching"
            );
            pool.detach_all();
        }
    }
}

/// Listener 配置
#[derive(Clone, Copy, Debug)]
pub struct ListenerConfig {
    /// 每个事件名对应的工作者数量
    pub workers_per_event: usize,
    /// 单个处理器的执行时限，None 表示不限
    pub handler_timeout: Option<Duration>,
    /// 停止后等待在途工作者完成的时长
    pub shutdown_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            workers_per_event: 4,
            handler_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Default)]
struct HandlerRegistry {
    by_name: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    fn register(&mut self, event_name: String, handler: Arc<dyn EventHandler>) {
        self.by_name.entry(event_name).or_default().push(handler);
    }

    fn len(&self) -> usize {
        self.by_name.len()
    }

    fn matching(&self, event_name: &str) -> &[Arc<dyn EventHandler>] {
        self.by_name.get(event_name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// 事件流已关闭，不再补位
    StreamClosed,
    /// 处理失败后主动退出，由监督者补位
    Recycled,
}

enum Outcome {
    Continue,
    Exit,
}

#[derive(Clone)]
struct Worker {
    provider: Arc<dyn Provider>,
    registry: Arc<HandlerRegistry>,
    config: ListenerConfig,
    error_handler: Option<ErrorCallback>,
}

impl Worker {
    async fn run(self, events: SharedEvents) -> WorkerExit {
        loop {
            let next = events.lock().await.next().await;
            let Some(event) = next else {
                return WorkerExit::StreamClosed;
            };

            if let Outcome::Exit = self.process(event).await {
                return WorkerExit::Recycled;
            }
        }
    }

    async fn process(&self, event: Arc<dyn QueuedEvent>) -> Outcome {
        debug!(
            event = event.name(),
            retry_count = event.retry_count(),
            "received event"
        );

        let Err(err) = self.dispatch(&event).await else {
            self.provider.delete(event.as_ref()).await;
            return Outcome::Continue;
        };

        let retry_count = event.retry_count();
        if retry_count <= self.provider.maximum_retry_count() {
            warn!(
                event = event.name(),
                retry_count,
                error = %err,
                "handler failed, requeueing event"
            );
            self.provider.requeue(event.as_ref()).await;
            return Outcome::Continue;
        }

        let terminal = EventingError::RetryAttemptsExceeded {
            event_name: event.name().to_string(),
            retry_count,
            reason: err.to_string(),
        };
        error!(error = %terminal, "abandoning event");
        if let Some(report) = &self.error_handler {
            report(&terminal);
        }
        Outcome::Exit
    }

    async fn dispatch(&self, event: &Arc<dyn QueuedEvent>) -> Result<()> {
        let handlers = self.registry.matching(event.name());
        if handlers.is_empty() {
            debug!(event = event.name(), "no handler registered for event");
            return Ok(());
        }

        for handler in handlers {
            let fut = handler.handle(event.clone());
            let result = match self.config.handler_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("handler timed out after {limit:?}")),
                },
                None => fut.await,
            };

            if let Err(err) = result {
                return Err(EventingError::EventHandler {
                    handler: handler.handler_name().to_string(),
                    reason: format!("{err:#}"),
                });
            }
        }

        Ok(())
    }
}
