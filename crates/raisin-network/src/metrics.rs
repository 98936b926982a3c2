//! 网络层运行指标
//!
//! 原子计数器，任意线程可读，不引入锁竞争。同一个 `Network` 下的所有连接共享一份。

use std::sync::atomic::{AtomicU64, Ordering};

/// 网络层实时指标
#[derive(Debug, Default)]
pub struct NetworkMetrics {
    /// 接收的总帧数（所有连接）
    pub rx_frames_total: AtomicU64,
    /// 发送的总帧数（含心跳）
    pub tx_frames_total: AtomicU64,
    /// 话题负载解码失败次数（该帧被丢弃，缓存保留旧值）
    pub decode_errors: AtomicU64,
    /// 分发邮箱覆盖次数
    ///
    /// 回调处理速度跟不上话题频率时增长；慢消费者只看到最新值。
    pub dispatch_overwrites: AtomicU64,
    /// 发起的服务调用次数
    pub calls_issued: AtomicU64,
    /// 超时的服务调用次数
    pub calls_timed_out: AtomicU64,
    /// 因链路断开而失败的服务调用次数
    pub calls_disconnected: AtomicU64,
    /// 找不到等待者的响应次数（通常是超时后才到达）
    pub unmatched_responses: AtomicU64,
    /// 收到的发现广播次数
    pub announces_received: AtomicU64,
}

impl NetworkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            dispatch_overwrites: self.dispatch_overwrites.load(Ordering::Relaxed),
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            calls_disconnected: self.calls_disconnected.load(Ordering::Relaxed),
            unmatched_responses: self.unmatched_responses.load(Ordering::Relaxed),
            announces_received: self.announces_received.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub tx_frames_total: u64,
    pub decode_errors: u64,
    pub dispatch_overwrites: u64,
    pub calls_issued: u64,
    pub calls_timed_out: u64,
    pub calls_disconnected: u64,
    pub unmatched_responses: u64,
    pub announces_received: u64,
}

impl MetricsSnapshot {
    /// 调用失败率（百分比，超时 + 断开），无调用时为 0
    pub fn call_failure_rate(&self) -> f64 {
        if self.calls_issued == 0 {
            return 0.0;
        }
        ((self.calls_timed_out + self.calls_disconnected) as f64 / self.calls_issued as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let metrics = NetworkMetrics::new();
        metrics.rx_frames_total.fetch_add(10, Ordering::Relaxed);
        metrics.calls_issued.fetch_add(4, Ordering::Relaxed);
        metrics.calls_timed_out.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_frames_total, 10);
        assert_eq!(snapshot.tx_frames_total, 0);
        assert!((snapshot.call_failure_rate() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_rate_without_calls() {
        assert_eq!(MetricsSnapshot::default().call_failure_rate(), 0.0);
    }
}
