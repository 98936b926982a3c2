//! 客户端错误类型
//!
//! 命令类操作不走这里：它们总是返回 [`ServiceResult`](raisin_protocol::ServiceResult)。
//! 这里只覆盖连接、等待和配置加载这类会"失败"的操作。

use raisin_network::NetworkError;
use thiserror::Error;

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 网络层错误（连接超时、取消、握手失败等）
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// 尚未连接机器人
    #[error("Not connected to a robot")]
    NotConnected,

    /// 等待超时
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout {
        what: String,
        timeout_ms: u64,
    },

    /// 等待被取消
    #[error("Wait cancelled")]
    Cancelled,

    /// 参数无效
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 配置解析失败
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// 配置文件读取失败
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// 是否为调用方主动取消
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Network(NetworkError::Cancelled)
        )
    }

    /// 是否为超时（连接超时或等待超时）
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network(NetworkError::ConnectionTimeout(_))
        )
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ClientError>;
