//! 协作式取消令牌与等待截止时间

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 超时过大（溢出 `Instant`）时使用的等待上限，实际等同于不设截止
const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// 取消令牌
///
/// 克隆体共享同一个标志。阻塞操作（`connect`、状态等待）按轮询间隔检查它，
/// 因此取消生效的延迟以轮询间隔为上限。
///
/// ```
/// use raisin_network::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 复位（便于交互式程序在多次连接间复用同一个令牌）
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 可选令牌的便捷判断
pub(crate) fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

/// 从现在起经过 `timeout` 的截止时间
///
/// `Duration::MAX` 之类溢出 `Instant` 的超时截断为约 100 年，不会 panic。
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_WAIT))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!is_cancelled(Some(&token)));

        other.cancel();
        assert!(is_cancelled(Some(&token)));

        token.reset();
        assert!(!other.is_cancelled());
        assert!(!is_cancelled(None));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline.saturating_duration_since(Instant::now()) > Duration::from_secs(3600));

        let deadline = deadline_after(Duration::from_millis(50));
        assert!(deadline.saturating_duration_since(Instant::now()) <= Duration::from_millis(50));
    }
}
