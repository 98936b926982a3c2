//! 网络层错误类型定义

use raisin_protocol::ProtocolError;
use raisin_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// 网络层错误类型
#[derive(Error, Debug)]
pub enum NetworkError {
    /// 连接超时（节点未出现、会话未建立或目录未返回）
    #[error("Connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    /// 调用方通过取消令牌中止了等待
    #[error("Connection cancelled")]
    Cancelled,

    /// 能力目录握手失败
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// 链路已断开
    #[error("Connection lost")]
    Disconnected,

    /// 连接未建立或已关闭
    #[error("Not connected")]
    NotConnected,

    /// 话题已按另一种数据类型注册
    #[error("Topic '{topic}' is registered as {registered}, requested {requested}")]
    TopicTypeMismatch {
        topic: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 发送队列持续已满（TX 线程写不出去）
    #[error("Send queue full")]
    SendQueueFull,

    /// 发送队列已关闭（TX 线程退出）
    #[error("Send channel closed")]
    ChannelClosed,

    /// 既不是已发现的节点，也不是合法地址
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// 配置文件解析失败
    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// IO 错误（线程创建、配置文件读取）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
