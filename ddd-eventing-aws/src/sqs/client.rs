//! SQS 远端操作抽象（QueueClient）
//!
//! Provider 只依赖这四个远端操作：长轮询接收、删除、发送、修改可见期。
//! 默认实现 `AwsSqsClient` 基于 `aws-sdk-sqs`；测试可注入任意实现。
//!
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName};
use ddd_eventing::error::{EventingError, EventingResult as Result};
use std::collections::HashMap;

/// 从队列收到的原始消息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedMessage {
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    /// 系统属性（如去重 ID）
    pub attributes: HashMap<String, String>,
    /// 消息属性的字符串值（如 RetryCount）
    pub message_attributes: HashMap<String, String>,
}

/// 待发送的消息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub body: String,
    pub delay_seconds: i32,
    pub deduplication_id: Option<String>,
    /// 数值型消息属性
    pub number_attributes: HashMap<String, String>,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn receive_messages(
        &self,
        queue_url: &str,
        wait_time_seconds: i32,
        max_messages: i32,
    ) -> Result<Vec<ReceivedMessage>>;

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;

    async fn send_message(&self, queue_url: &str, message: OutgoingMessage) -> Result<()>;

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<()>;
}

/// 基于 aws-sdk-sqs 的默认实现
#[derive(Clone, Debug)]
pub struct AwsSqsClient {
    client: aws_sdk_sqs::Client,
}

impl AwsSqsClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// 使用默认凭证链构建客户端
    pub async fn from_env(region: &str, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        Self::new(aws_sdk_sqs::Client::new(&shared))
    }
}

#[async_trait]
impl QueueClient for AwsSqsClient {
    async fn receive_messages(
        &self,
        queue_url: &str,
        wait_time_seconds: i32,
        max_messages: i32,
    ) -> Result<Vec<ReceivedMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .wait_time_seconds(wait_time_seconds)
            .max_number_of_messages(max_messages)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| EventingError::transport("receive_message", DisplayErrorContext(e)))?;

        let messages = output
            .messages()
            .iter()
            .map(|message| ReceivedMessage {
                receipt_handle: message.receipt_handle().map(str::to_string),
                body: message.body().map(str::to_string),
                attributes: message
                    .attributes()
                    .map(|attrs| {
                        attrs
                            .iter()
                            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
                message_attributes: message
                    .message_attributes()
                    .map(|attrs| {
                        attrs
                            .iter()
                            .filter_map(|(k, v)| {
                                v.string_value().map(|sv| (k.clone(), sv.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        Ok(messages)
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| EventingError::transport("delete_message", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn send_message(&self, queue_url: &str, message: OutgoingMessage) -> Result<()> {
        let mut req = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(message.body)
            .delay_seconds(message.delay_seconds)
            .set_message_deduplication_id(message.deduplication_id);

        for (name, value) in message.number_attributes {
            let attr = MessageAttributeValue::builder()
                .data_type("Number")
                .string_value(value)
                .build()
                .map_err(|e| EventingError::transport("send_message", e))?;
            req = req.message_attributes(name, attr);
        }

        req.send()
            .await
            .map_err(|e| EventingError::transport("send_message", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| {
                EventingError::transport("change_message_visibility", DisplayErrorContext(e))
            })?;
        Ok(())
    }
}
