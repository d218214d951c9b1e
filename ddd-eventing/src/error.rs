//! 事件投递统一错误定义
//!
//! 按失败来源划分：远端传输、消息解码、处理器失败、重试耗尽、配置与协议误用。
//! 传输与解码错误经 Provider 的错误流上报；重试耗尽交由 Listener 的错误回调；
//! 配置错误在构造阶段同步返回。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventingError {
    // --- 序列化/解码 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("decode error: {reason}")]
    Decode { reason: String },

    // --- 远端队列/主题 ---
    #[error("transport error: operation={operation}, reason={reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },

    // --- 处理与重试 ---
    #[error("event handler error: handler={handler}, reason={reason}")]
    EventHandler { handler: String, reason: String },
    #[error(
        "event exceeded maximum retry count: event={event_name}, retry_count={retry_count}, reason={reason}"
    )]
    RetryAttemptsExceeded {
        event_name: String,
        retry_count: u32,
        reason: String,
    },

    // --- 配置与协议 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("provider error: {reason}")]
    Provider { reason: String },
    #[error("no event handlers registered")]
    NoHandlers,
}

impl EventingError {
    pub fn transport(operation: &'static str, reason: impl ToString) -> Self {
        Self::Transport {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn provider(reason: impl Into<String>) -> Self {
        Self::Provider {
            reason: reason.into(),
        }
    }

    /// 是否为终止性错误（不会再被重投）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetryAttemptsExceeded { .. })
    }
}

/// 统一 Result 类型别名
pub type EventingResult<T> = Result<T, EventingError>;
