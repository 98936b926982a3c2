//! 服务调用器
//!
//! 在异步链路上实现同步的请求/响应：每次调用插入一个以关联 ID 为键的等待者，
//! 接收线程按 ID 唤醒等待者，链路断开时统一以 "disconnected" 失败所有等待者。
//! 本层不做重试。

use crate::error::NetworkError;
use crate::metrics::NetworkMetrics;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use raisin_protocol::{CallError, Frame, ProtocolError, ServiceResult, decode_payload};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 一次服务调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    pub result: ServiceResult,
    /// 响应负载（失败或无数据时为空）
    pub payload: Bytes,
}

impl ServiceReply {
    pub fn new(result: ServiceResult, payload: Bytes) -> Self {
        Self { result, payload }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }

    /// 解码响应负载
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_payload(&self.payload)
    }
}

impl From<CallError> for ServiceReply {
    fn from(err: CallError) -> Self {
        Self {
            result: err.into(),
            payload: Bytes::new(),
        }
    }
}

struct PendingTable {
    waiters: HashMap<u64, Sender<ServiceReply>>,
    /// 链路已断开，不再接受新调用
    closed: bool,
}

/// 服务调用器
pub struct ServiceInvoker {
    pending: Mutex<PendingTable>,
    next_id: AtomicU64,
    metrics: Arc<NetworkMetrics>,
}

impl ServiceInvoker {
    pub fn new(metrics: Arc<NetworkMetrics>) -> Self {
        Self {
            pending: Mutex::new(PendingTable {
                waiters: HashMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// 发起调用并阻塞等待
    ///
    /// `send` 负责把请求帧交给发送路径。返回条件（先到者为准）：
    ///
    /// - 收到匹配的响应：返回响应内容
    /// - 超过 `timeout`：`{success: false, message: "timeout"}`
    /// - 链路断开：`{success: false, message: "disconnected"}`
    pub fn call<F>(&self, service: &str, payload: Bytes, timeout: Duration, send: F) -> ServiceReply
    where
        F: FnOnce(Frame) -> Result<(), NetworkError>,
    {
        let (correlation_id, waiter) = match self.register() {
            Ok(registered) => registered,
            Err(e) => return e.into(),
        };
        self.metrics.calls_issued.fetch_add(1, Ordering::Relaxed);
        debug!("Call #{} -> {} (timeout {:?})", correlation_id, service, timeout);

        let request = Frame::Request {
            correlation_id,
            service: service.to_string(),
            payload,
        };
        if let Err(e) = send(request) {
            self.pending.lock().waiters.remove(&correlation_id);
            warn!("Call #{} -> {} not sent: {}", correlation_id, service, e);
            return match e {
                NetworkError::ChannelClosed | NetworkError::Disconnected | NetworkError::NotConnected => {
                    self.metrics.calls_disconnected.fetch_add(1, Ordering::Relaxed);
                    CallError::Disconnected.into()
                },
                // 请求未能在时限内交给发送线程
                NetworkError::SendQueueFull => {
                    self.metrics.calls_timed_out.fetch_add(1, Ordering::Relaxed);
                    CallError::Timeout.into()
                },
                other => CallError::ServiceFailure(other.to_string()).into(),
            };
        }

        match waiter.recv_timeout(timeout) {
            Ok(reply) => {
                trace!("Call #{} completed: {:?}", correlation_id, reply.result);
                reply
            },
            Err(RecvTimeoutError::Timeout) => {
                // 先移除等待者；若响应恰好在此之间到达，它仍在通道里
                self.pending.lock().waiters.remove(&correlation_id);
                if let Ok(reply) = waiter.try_recv() {
                    return reply;
                }
                self.metrics.calls_timed_out.fetch_add(1, Ordering::Relaxed);
                warn!("Call #{} -> {} timed out after {:?}", correlation_id, service, timeout);
                CallError::Timeout.into()
            },
            Err(RecvTimeoutError::Disconnected) => {
                self.metrics.calls_disconnected.fetch_add(1, Ordering::Relaxed);
                CallError::Disconnected.into()
            },
        }
    }

    fn register(&self) -> Result<(u64, Receiver<ServiceReply>), CallError> {
        let mut pending = self.pending.lock();
        if pending.closed {
            return Err(CallError::Disconnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        pending.waiters.insert(id, tx);
        Ok((id, rx))
    }

    /// 接收路径：按关联 ID 唤醒等待者，返回是否找到等待者
    pub fn resolve(&self, correlation_id: u64, reply: ServiceReply) -> bool {
        let waiter = self.pending.lock().waiters.remove(&correlation_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            },
            None => {
                self.metrics.unmatched_responses.fetch_add(1, Ordering::Relaxed);
                debug!("Response #{} has no waiter (timed out?)", correlation_id);
                false
            },
        }
    }

    /// 链路断开：所有等待中的调用以 "disconnected" 失败，之后的调用立即失败
    ///
    /// 返回被失败的调用数。
    pub fn fail_all(&self) -> usize {
        let waiters: Vec<Sender<ServiceReply>> = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            pending.waiters.drain().map(|(_, tx)| tx).collect()
        };
        let count = waiters.len();
        for tx in waiters {
            let _ = tx.send(CallError::Disconnected.into());
        }
        if count > 0 {
            self.metrics.calls_disconnected.fetch_add(count as u64, Ordering::Relaxed);
            warn!("Failed {} pending call(s): link lost", count);
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }
}
