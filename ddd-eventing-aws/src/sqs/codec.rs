//! SQS 消息编解码
//!
//! 消息体是两层 JSON：外层信封 `{"Message": "<string>"}`（SNS 投递到 SQS 时的形态），
//! 内层字符串为 `{"name": ..., "data": {...}}`。编码与解码严格对称。
//!
use super::client::ReceivedMessage;
use ddd_eventing::error::{EventingError, EventingResult as Result};
use ddd_eventing::event::Payload;
use serde::{Deserialize, Deserializer, Serialize};

/// 重试次数所在的消息属性
pub const RETRY_COUNT_ATTRIBUTE: &str = "RetryCount";
/// 去重 ID 所在的系统属性
pub const DEDUPLICATION_ID_ATTRIBUTE: &str = "DeduplicationID";
/// SQS 原生的去重 ID 系统属性名
pub const MESSAGE_DEDUPLICATION_ID_ATTRIBUTE: &str = "MessageDeduplicationId";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EncodedEvent {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Payload,
}

/// `"data": null` 与缺省同样视为空负载
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedMessage {
    #[serde(rename = "Message")]
    message: String,
}

/// 解码后的消息（不含对远端客户端的引用）
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub name: String,
    pub data: Payload,
    pub receipt_handle: String,
    pub deduplication_id: Option<String>,
    pub retry_count: u32,
}

/// 将原始消息解码为事件字段
pub fn decode(message: &ReceivedMessage) -> Result<DecodedMessage> {
    let receipt_handle = message
        .receipt_handle
        .clone()
        .ok_or_else(|| EventingError::decode("message has no receipt handle"))?;

    let retry_count = match message.message_attributes.get(RETRY_COUNT_ATTRIBUTE) {
        None => 0,
        Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
            EventingError::decode(format!("invalid {RETRY_COUNT_ATTRIBUTE} `{raw}`: {e}"))
        })?,
    };

    let deduplication_id = [DEDUPLICATION_ID_ATTRIBUTE, MESSAGE_DEDUPLICATION_ID_ATTRIBUTE]
        .iter()
        .find_map(|key| message.attributes.get(*key).cloned());

    let body = message.body.as_deref().unwrap_or_default();
    let event = decode_body(body)?;

    Ok(DecodedMessage {
        name: event.name,
        data: event.data,
        receipt_handle,
        deduplication_id,
        retry_count,
    })
}

pub(crate) fn decode_body(body: &str) -> Result<EncodedEvent> {
    let envelope: EncodedMessage = serde_json::from_str(body)
        .map_err(|e| EventingError::decode(format!("malformed message envelope: {e}")))?;

    serde_json::from_str(&envelope.message)
        .map_err(|e| EventingError::decode(format!("malformed event document: {e}")))
}

/// 编码内层事件文档 `{"name", "data"}`
pub fn encode_event(name: &str, data: &Payload) -> Result<String> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        name: &'a str,
        data: &'a Payload,
    }

    Ok(serde_json::to_string(&Borrowed { name, data })?)
}

/// 编码完整消息体（内层文档再包一层信封）
pub fn encode(name: &str, data: &Payload) -> Result<String> {
    let message = encode_event(name, data)?;
    Ok(serde_json::to_string(&EncodedMessage { message })?)
}
