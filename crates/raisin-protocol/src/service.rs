//! 服务调用类型
//!
//! 所有命令式调用的结果统一为 [`ServiceResult`]：永不抛错，失败原因写在 `message` 中。

use crate::messages::Waypoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务调用统一结果
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceResult {
    pub success: bool,
    pub message: String,
}

impl ServiceResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// 调用超时
    pub fn timeout() -> Self {
        CallError::Timeout.into()
    }

    /// 连接断开
    pub fn disconnected() -> Self {
        CallError::Disconnected.into()
    }

    pub fn is_timeout(&self) -> bool {
        !self.success && self.message == CallError::Timeout.to_string()
    }

    pub fn is_disconnected(&self) -> bool {
        !self.success && self.message == CallError::Disconnected.to_string()
    }
}

/// 调用失败原因
///
/// `Display` 输出即 `ServiceResult.message` 的内容。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// 超时未收到响应
    #[error("timeout")]
    Timeout,

    /// 连接断开（等待中的调用全部以此失败）
    #[error("disconnected")]
    Disconnected,

    /// 航点坐标系与当前地图不一致
    #[error("invalid frame: waypoint frame '{found}' does not match loaded map '{expected}'")]
    InvalidFrame { expected: String, found: String },

    /// 服务端拒绝请求
    #[error("{0}")]
    ServiceFailure(String),
}

impl From<CallError> for ServiceResult {
    fn from(error: CallError) -> Self {
        ServiceResult::failure(error.to_string())
    }
}

// ==================== 请求/响应负载 ====================

/// 无参数请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyRequest {}

/// 按名称操作的请求（release_control / set_map / load_waypoints_file）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

impl NameRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 上传航点路线
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetWaypointsRequest {
    pub waypoints: Vec<Waypoint>,
    /// 循环圈数
    pub laps: u32,
}

/// 恢复巡逻的响应：从哪个航点恢复
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumePatrolResponse {
    pub index: u8,
}

/// 航点文件列表
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WaypointsFilesResponse {
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_messages() {
        assert_eq!(ServiceResult::timeout(), ServiceResult::failure("timeout"));
        assert_eq!(ServiceResult::disconnected().message, "disconnected");
        assert!(ServiceResult::timeout().is_timeout());
        assert!(!ServiceResult::ok("timeout").is_timeout());

        let err = CallError::InvalidFrame {
            expected: "lobby".to_string(),
            found: "office".to_string(),
        };
        let result = ServiceResult::from(err);
        assert!(!result.success);
        assert!(result.message.starts_with("invalid frame"));
        assert!(result.message.contains("office") && result.message.contains("lobby"));
    }
}
