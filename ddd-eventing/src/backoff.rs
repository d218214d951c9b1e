//! 重投退避（backoff）
//!
//! 失败事件按指数退避重新入队：`delay = min(2^(retry_count + 1), 900)` 秒，
//! 上限为 15 分钟（SQS 单条消息允许的最大延迟）。
//!

/// 单次重投的最大延迟（秒）
pub const MAX_REQUEUE_DELAY_SECONDS: u32 = 15 * 60;

/// 根据事件当前（自增前）的重试次数计算重投延迟（秒）
pub fn requeue_delay_seconds(retry_count: u32) -> u32 {
    retry_count
        .checked_add(1)
        .and_then(|exp| 2u32.checked_pow(exp))
        .map_or(MAX_REQUEUE_DELAY_SECONDS, |delay| {
            delay.min(MAX_REQUEUE_DELAY_SECONDS)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        assert_eq!(requeue_delay_seconds(0), 2);
        assert_eq!(requeue_delay_seconds(1), 4);
        assert_eq!(requeue_delay_seconds(5), 64);
        assert_eq!(requeue_delay_seconds(8), 512);
    }

    #[test]
    fn delay_is_capped_at_fifteen_minutes() {
        assert_eq!(requeue_delay_seconds(9), 900);
        assert_eq!(requeue_delay_seconds(15), 900);
        // 2^(n+1) 溢出时同样落在上限
        assert_eq!(requeue_delay_seconds(31), 900);
        assert_eq!(requeue_delay_seconds(u32::MAX), 900);
    }
}
