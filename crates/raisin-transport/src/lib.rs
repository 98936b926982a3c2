//! # Raisin Transport Layer
//!
//! 会话传输抽象层：核心只依赖本 crate 的 trait，具体的分帧、编码与网络 IO 由后端实现。
//!
//! - `tcp`: TCP 流会话（4 字节大端长度前缀 + JSON）
//! - `udp`: UDP 组播发现广播
//! - `mock`: 内存会话（`mock` feature，用于测试）

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// 重新导出 raisin-protocol 中的帧类型
pub use raisin_protocol::{Frame, NodeDescriptor};

pub mod tcp;
pub mod udp;

#[cfg(feature = "mock")]
pub mod mock;

pub use tcp::TcpConnector;
pub use udp::{UdpAnnounceSource, UdpAnnouncer};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol Error: {0}")]
    Protocol(#[from] raisin_protocol::ProtocolError),
    #[error("Receive timeout")]
    Timeout,
    #[error("Session closed by peer")]
    Closed,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Network interface error: {0}")]
    Interface(String),
}

impl TransportError {
    /// 是否为致命错误（会话不可继续使用）
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Timeout => false,
            TransportError::Protocol(_) => false,
            TransportError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => true,
        }
    }
}

/// 传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// 字节流（TCP）
    #[default]
    Stream,
    /// 消息套接字（WebSocket 类，按消息边界收发）
    MessageSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stream => f.write_str("TCP"),
            TransportKind::MessageSocket => f.write_str("WebSocket"),
        }
    }
}

/// 会话端点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub kind: TransportKind,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            kind: TransportKind::Stream,
        }
    }

    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// 会话接收端
pub trait SessionRx {
    /// 接收一帧，空闲超过 `timeout` 返回 `TransportError::Timeout`，
    /// 对端关闭返回 `TransportError::Closed`。
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Frame, TransportError>;
}

/// 会话发送端
pub trait SessionTx {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// 关闭发送方向（默认空操作）
    fn close(&mut self) {}
}

pub type BoxedRx = Box<dyn SessionRx + Send>;
pub type BoxedTx = Box<dyn SessionTx + Send>;

/// 已建立的会话
///
/// 通过 `split()` 分离为独立的接收端和发送端，分别交给 RX / TX 线程。
pub trait Session: Send {
    fn kind(&self) -> TransportKind;
    fn split(self: Box<Self>) -> Result<(BoxedRx, BoxedTx), TransportError>;
}

/// 会话建立器
pub trait Connector: Send + Sync {
    fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// 发现广播来源
pub trait AnnounceSource: Send {
    /// 等待下一条节点广播，超时返回 `TransportError::Timeout`
    fn next_announce(&mut self, timeout: Duration) -> Result<NodeDescriptor, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::Closed.is_fatal());
        assert!(
            !TransportError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock)).is_fatal()
        );
        assert!(
            TransportError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
                .is_fatal()
        );
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new("10.0.0.5", 9001);
        assert_eq!(ep.to_string(), "10.0.0.5:9001");
        assert_eq!(ep.kind, TransportKind::Stream);
        assert_eq!(TransportKind::MessageSocket.to_string(), "WebSocket");
    }
}
