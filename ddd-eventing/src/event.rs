//! 领域事件与投递元信息
//!
//! - `Event`：发布与处理所需的最小契约（名称 + 负载）；
//! - `QueuedEvent`：从队列投递而来的事件，附带回执、去重键、重试次数等元信息，
//!   并暴露可见性续期能力。各 Provider 自行实现，Listener 无需向下转型。
//!
use crate::backoff::requeue_delay_seconds;
use crate::error::EventingResult;
use async_trait::async_trait;
use bon::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 事件负载：任意形状的 JSON 对象
pub type Payload = Map<String, Value>;

/// 领域事件：发布者与处理器看到的统一视图
pub trait Event: Send + Sync {
    /// 事件名称，用于匹配处理器
    fn name(&self) -> &str;
    /// 事件负载（只读）
    fn data(&self) -> &Payload;

    /// 读取负载中的单个字段
    fn field(&self, key: &str) -> Option<&Value> {
        self.data().get(key)
    }
}

/// 队列投递的事件：在 `Event` 之上携带投递元信息
#[async_trait]
pub trait QueuedEvent: Event {
    /// 本次投递的回执，删除/重投/续期均依赖它
    fn receipt_token(&self) -> &str;

    /// FIFO 队列的去重键（若有）
    fn deduplication_key(&self) -> Option<&str>;

    /// 此前已投递且处理失败的次数，首次投递为 0
    fn retry_count(&self) -> u32;

    /// 重投时使用的延迟（秒）
    fn delay_seconds(&self) -> u32 {
        requeue_delay_seconds(self.retry_count())
    }

    /// 延长本次投递的独占可见期，供长耗时处理器在超时前续期
    async fn update_visibility_timeout(&self, seconds: i32) -> EventingResult<()>;
}

/// 将负载反序列化为具体类型
pub fn decode_payload<T: DeserializeOwned>(event: &(impl Event + ?Sized)) -> EventingResult<T> {
    Ok(serde_json::from_value(Value::Object(event.data().clone()))?)
}

/// 不带投递元信息的事件，用于发布
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct NamedEvent {
    #[builder(into)]
    name: String,
    #[builder(default)]
    #[serde(default)]
    data: Payload,
}

impl NamedEvent {
    pub fn new(name: impl Into<String>, data: Payload) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl Event for NamedEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> &Payload {
        &self.data
    }
}
