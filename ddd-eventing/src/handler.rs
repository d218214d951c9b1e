//! 事件处理器（EventHandler）
//!
//! 定义消费某一名称事件的处理逻辑；同一事件名可注册多个处理器，
//! 按注册顺序依次执行。闭包可经 `FnHandler` 适配为处理器。
//!
use crate::event::QueuedEvent;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// 事件处理器：返回错误即视为本次投递失败
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与失败标记）
    fn handler_name(&self) -> &str;
    /// 处理事件
    async fn handle(&self, event: Arc<dyn QueuedEvent>) -> anyhow::Result<()>;
}

/// 闭包处理器
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<dyn QueuedEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<dyn QueuedEvent>) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}
