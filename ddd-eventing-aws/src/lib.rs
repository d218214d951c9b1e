//! AWS 适配（ddd-eventing-aws）
//!
//! 为 `ddd-eventing` 提供基于 Amazon SQS 的事件源与基于 SNS 的发布者：
//! - `sqs::SqsProvider`：长轮询队列、解码事件、删除与指数退避重投；
//! - `sns::SnsPublisher`：将事件发布至主题，经订阅投递到 SQS。
//!
//! 远端客户端均可注入（`QueueClient` / `TopicClient`），缺省使用 AWS 默认凭证链。
//!
pub mod sns;
pub mod sqs;

pub use sns::{SnsPublisher, SnsPublisherConfig, TopicClient};
pub use sqs::{QueueClient, SqsEvent, SqsProvider, SqsProviderConfig};
