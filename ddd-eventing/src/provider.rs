//! 事件源（Provider）协议
//!
//! Provider 是远端消息队列与分发引擎之间的适配层：在后台持续拉取消息，
//! 以事件流与错误流两条单向流交给 Listener；确认（删除）与重投均为
//! “发后即忘”，远端失败经错误流上报而非同步返回。
//!
use crate::error::{EventingError, EventingResult as Result};
use crate::event::QueuedEvent;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

/// 事件流：'static 生命周期，便于在 tokio::spawn 中消费
pub type EventStream = BoxStream<'static, Arc<dyn QueuedEvent>>;

/// 错误流：传输与解码等非终止性错误
pub type ErrorStream = BoxStream<'static, EventingError>;

/// `Provider::start` 的返回值
pub struct ProviderStreams {
    pub events: EventStream,
    pub errors: ErrorStream,
}

impl std::fmt::Debug for ProviderStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStreams").finish_non_exhaustive()
    }
}

/// 事件源：向 Listener 提供事件并处理确认/重投
#[async_trait]
pub trait Provider: Send + Sync {
    /// 启动后台拉取，返回事件流与错误流；同一实例只能启动一次
    async fn start(&self) -> Result<ProviderStreams>;

    /// 确认并删除已处理完成的事件
    async fn delete(&self, event: &dyn QueuedEvent);

    /// 删除本次投递并以 `retry_count + 1` 与退避延迟重新入队
    async fn requeue(&self, event: &dyn QueuedEvent);

    /// 停止拉取并关闭两条流；返回后不再向任一流发送
    async fn stop(&self);

    /// 允许的最大重试次数
    fn maximum_retry_count(&self) -> u32;
}
