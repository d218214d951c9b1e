//! SQS 适配
//!
//! - `client`：远端队列操作抽象与 aws-sdk-sqs 实现；
//! - `codec`：两层 JSON 消息体的编解码；
//! - `event`：携带 SQS 投递元信息的事件；
//! - `provider`：长轮询事件源，负责删除、重投与退避。
//!
pub mod client;
pub mod codec;
pub mod event;
pub mod provider;

pub use client::{AwsSqsClient, OutgoingMessage, QueueClient, ReceivedMessage};
pub use event::SqsEvent;
pub use provider::{SqsProvider, SqsProviderConfig};
