//! 事件发布者（Publisher）协议
//!
use crate::error::EventingResult as Result;
use crate::event::Event;
use async_trait::async_trait;

/// 将单个事件推送至外部存储/主题
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &dyn Event) -> Result<()>;

    async fn publish_batch(&self, events: &[&dyn Event]) -> Result<()> {
        for event in events {
            self.publish(*event).await?;
        }
        Ok(())
    }
}
