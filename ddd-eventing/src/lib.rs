//! DDD 领域事件投递库（ddd-eventing）
//!
//! 提供“至少一次”语义的领域事件消费管线：
//! - 领域事件（`event`）与队列投递元信息（`QueuedEvent`）
//! - 事件源协议（`provider`）与发布者协议（`publisher`）
//! - 事件处理器（`handler`）与监听器（`listener`）：固定容量工作池并发分发，
//!   失败按指数退避（`backoff`）重投，超过重试上限后上报终止性错误
//! - 工作池（`pool`）与内存版事件源（`memory`）
//!
//! 本 crate 不绑定具体消息中间件，AWS SQS/SNS 适配位于 `ddd-eventing-aws`。
//!
//! 典型用法：
//! 1. 构造一个 `Provider`（如 `InMemoryProvider` 或 SQS 实现）；
//! 2. 以 `Listener::new(provider)` 创建监听器并按事件名注册处理器；
//! 3. 调用 `listen().await`，通过 `halt()` 或 `halt_token()` 停止。
//!
pub mod backoff;
pub mod error;
pub mod event;
pub mod handler;
pub mod listener;
pub mod memory;
pub mod pool;
pub mod provider;
pub mod publisher;

pub use error::{EventingError, EventingResult};
pub use event::{Event, NamedEvent, Payload, QueuedEvent};
pub use handler::{EventHandler, FnHandler};
pub use listener::{ErrorCallback, Listener, ListenerConfig};
pub use memory::{InMemoryEvent, InMemoryProvider};
pub use provider::{Provider, ProviderStreams};
pub use publisher::Publisher;
