//! 内存 Mock 传输
//!
//! 用于测试的模拟会话与发现广播，不依赖网络：
//!
//! - [`MockConnector`]: 按端点登记监听者，`open()` 时把 [`MockPeer`] 交给监听者
//! - [`MockPeer`]: 会话的机器人一侧（查看客户端发出的帧、推送帧、断开链路）
//! - [`announce_channel`]: 发现广播的内存通道

use crate::{
    AnnounceSource, BoxedRx, BoxedTx, Connector, Endpoint, Frame, NodeDescriptor, Session,
    SessionRx, SessionTx, TransportError, TransportKind,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Mock 会话建立器
///
/// 可克隆，克隆体共享同一张监听表。
#[derive(Clone, Default)]
pub struct MockConnector {
    listeners: Arc<Mutex<HashMap<(String, u16), Sender<MockPeer>>>>,
    kind: TransportKind,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟 WebSocket 类会话
    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }

    /// 在端点上监听，返回接收新会话的通道
    pub fn listen(&self, address: impl Into<String>, port: u16) -> Receiver<MockPeer> {
        let (tx, rx) = unbounded();
        self.listeners.lock().insert((address.into(), port), tx);
        rx
    }

    /// 停止监听（之后的 `open()` 返回连接拒绝）
    pub fn unlisten(&self, address: &str, port: u16) {
        self.listeners.lock().remove(&(address.to_string(), port));
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let listeners = self.listeners.lock();
        let acceptor = listeners
            .get(&(endpoint.address.clone(), endpoint.port))
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("no mock listener on {}", endpoint),
                ))
            })?;

        let (to_peer_tx, to_peer_rx) = unbounded();
        let (to_client_tx, to_client_rx) = unbounded();

        let peer = MockPeer {
            to_client: Mutex::new(Some(to_client_tx)),
            from_client: to_peer_rx,
        };
        acceptor.send(peer).map_err(|_| TransportError::Closed)?;

        Ok(Box::new(MockSession {
            kind: self.kind,
            rx: to_client_rx,
            tx: to_peer_tx,
        }))
    }
}

/// 会话的机器人一侧
pub struct MockPeer {
    to_client: Mutex<Option<Sender<Frame>>>,
    from_client: Receiver<Frame>,
}

impl MockPeer {
    /// 向客户端推送一帧（链路已断开时返回 `Closed`）
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match self.to_client.lock().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// 接收客户端发出的帧
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, TransportError> {
        self.from_client.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout,
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }

    /// 接收帧直到满足条件（跳过心跳等无关帧）
    pub fn recv_matching(
        &self,
        timeout: Duration,
        mut pred: impl FnMut(&Frame) -> bool,
    ) -> Result<Frame, TransportError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let frame = self.recv_timeout(remaining)?;
            if pred(&frame) {
                return Ok(frame);
            }
        }
    }

    /// 模拟链路断开（客户端接收端随即返回 `Closed`）
    pub fn drop_link(&self) {
        self.to_client.lock().take();
    }

    /// 客户端是否已关闭发送方向
    pub fn is_client_gone(&self) -> bool {
        matches!(
            self.from_client.recv_timeout(Duration::ZERO),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

struct MockSession {
    kind: TransportKind,
    rx: Receiver<Frame>,
    tx: Sender<Frame>,
}

impl Session for MockSession {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn split(self: Box<Self>) -> Result<(BoxedRx, BoxedTx), TransportError> {
        Ok((
            Box::new(MockRx { rx: self.rx }),
            Box::new(MockTx { tx: Some(self.tx) }),
        ))
    }
}

struct MockRx {
    rx: Receiver<Frame>,
}

impl SessionRx for MockRx {
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Frame, TransportError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout,
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }
}

struct MockTx {
    tx: Option<Sender<Frame>>,
}

impl SessionTx for MockTx {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx.send(frame.clone()).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        self.tx.take();
    }
}

/// 创建发现广播的内存通道
pub fn announce_channel() -> (MockAnnouncer, MockAnnounceSource) {
    let (tx, rx) = unbounded();
    (MockAnnouncer { tx }, MockAnnounceSource { rx })
}

/// 发现广播发送端
#[derive(Clone)]
pub struct MockAnnouncer {
    tx: Sender<NodeDescriptor>,
}

impl MockAnnouncer {
    pub fn announce(&self, node: &NodeDescriptor) {
        let _ = self.tx.send(node.clone());
    }
}

/// 发现广播接收端
pub struct MockAnnounceSource {
    rx: Receiver<NodeDescriptor>,
}

impl AnnounceSource for MockAnnounceSource {
    fn next_announce(&mut self, timeout: Duration) -> Result<NodeDescriptor, TransportError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout,
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }
}
