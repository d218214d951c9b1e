//! SNS 事件发布者（SnsPublisher）
//!
//! 将事件编码为内层文档 `{"name", "data"}` 发布到主题；订阅该主题的 SQS 队列
//! 收到的消息体即为 `{"Message": "<内层文档>"}`，可直接由 `SqsProvider` 解码。
//!
use crate::sqs::codec;
use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use bon::Builder;
use ddd_eventing::error::{EventingError, EventingResult as Result};
use ddd_eventing::event::Event;
use ddd_eventing::publisher::Publisher;
use std::sync::Arc;
use tracing::debug;

/// 主题发布操作抽象
#[async_trait]
pub trait TopicClient: Send + Sync {
    async fn publish(&self, topic_arn: &str, message: String) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct AwsSnsClient {
    client: aws_sdk_sns::Client,
}

impl AwsSnsClient {
    pub fn new(client: aws_sdk_sns::Client) -> Self {
        Self { client }
    }

    pub async fn from_env(region: &str, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        Self::new(aws_sdk_sns::Client::new(&shared))
    }
}

#[async_trait]
impl TopicClient for AwsSnsClient {
    async fn publish(&self, topic_arn: &str, message: String) -> Result<()> {
        self.client
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await
            .map_err(|e| EventingError::transport("publish", DisplayErrorContext(e)))?;
        Ok(())
    }
}

/// SNS Publisher 配置
#[derive(Clone, Builder)]
pub struct SnsPublisherConfig {
    /// 主题 ARN（必填）
    #[builder(into)]
    topic_arn: String,
    client: Option<Arc<dyn TopicClient>>,
    #[builder(into, default = String::from("us-east-1"))]
    region: String,
    #[builder(into)]
    endpoint_url: Option<String>,
}

pub struct SnsPublisher {
    client: Arc<dyn TopicClient>,
    topic_arn: String,
}

impl SnsPublisher {
    pub async fn new(config: SnsPublisherConfig) -> Result<Self> {
        if config.topic_arn.trim().is_empty() {
            return Err(EventingError::invalid_config("topic_arn is required"));
        }

        let client = match config.client {
            Some(client) => client,
            None => Arc::new(
                AwsSnsClient::from_env(&config.region, config.endpoint_url.as_deref()).await,
            ),
        };

        Ok(Self {
            client,
            topic_arn: config.topic_arn,
        })
    }
}

#[async_trait]
impl Publisher for SnsPublisher {
    async fn publish(&self, event: &dyn Event) -> Result<()> {
        let message = codec::encode_event(event.name(), event.data())?;
        debug!(event = event.name(), topic = %self.topic_arn, "publishing event");
        self.client.publish(&self.topic_arn, message).await
    }
}
