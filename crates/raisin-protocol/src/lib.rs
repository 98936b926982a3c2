//! # Raisin Protocol
//!
//! 机器人网络协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `ids`: 话题名、服务名、数据类型标签常量
//! - `constants`: 状态码枚举（运动状态、执行器状态、控制源）
//! - `messages`: 遥测消息（机器人状态、里程计、点云、航点）
//! - `service`: 服务调用的请求/响应类型与统一结果
//!
//! ## 负载编码
//!
//! 传输层只搬运不透明的 [`Frame`]；话题与服务负载统一使用 JSON 编码，
//! 通过 [`encode_payload`] / [`decode_payload`] 完成转换。

pub mod constants;
pub mod ids;
pub mod messages;
pub mod service;

pub use constants::*;
pub use ids::*;
pub use messages::*;
pub use service::*;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// 当前客户端实现的协议版本（握手时与远端 Catalog 比较主版本号）
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// 单帧最大字节数（16 MiB）
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON 编解码失败
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// 帧长度超过上限
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// 协议版本字符串无法解析
    #[error("Invalid protocol version: {0}")]
    InvalidVersion(String),
}

/// 数据类型标签（远端广播的消息类型名）
///
/// 例如 `"raisin_interfaces/msg/RobotState"`。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// 节点描述（由发现广播产生）
///
/// 不可变快照：节点重新广播时整体替换，不做字段级修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// 节点 ID（逻辑名）
    pub id: String,
    /// 节点 IP 地址
    pub address: String,
    /// 会话端口
    pub port: u16,
    /// 发布的话题 -> 数据类型
    #[serde(default)]
    pub publishers: BTreeMap<String, TypeTag>,
    /// 提供的服务 -> 数据类型
    #[serde(default)]
    pub services: BTreeMap<String, TypeTag>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            publishers: BTreeMap::new(),
            services: BTreeMap::new(),
        }
    }

    /// 追加一个发布者（构建辅助）
    pub fn with_publisher(mut self, topic: impl Into<String>, tag: impl Into<TypeTag>) -> Self {
        self.publishers.insert(topic.into(), tag.into());
        self
    }

    /// 追加一个服务（构建辅助）
    pub fn with_service(mut self, service: impl Into<String>, tag: impl Into<TypeTag>) -> Self {
        self.services.insert(service.into(), tag.into());
        self
    }
}

/// 能力目录（握手响应）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub node_id: String,
    pub protocol_version: String,
    #[serde(default)]
    pub publishers: BTreeMap<String, TypeTag>,
    #[serde(default)]
    pub services: BTreeMap<String, TypeTag>,
}

impl Catalog {
    /// 从节点描述构建目录（使用当前协议版本）
    pub fn from_descriptor(node: &NodeDescriptor) -> Self {
        Self {
            node_id: node.id.clone(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            publishers: node.publishers.clone(),
            services: node.services.clone(),
        }
    }
}

/// 传输帧（传输层与核心之间的统一抽象）
///
/// # 在架构中的位置
///
/// ```text
/// Client / Network (raisin-network)
///     ↓ Frame 构建 / 分发
/// Frame (此类型)
///     ↓ 编码由传输后端完成（TCP: 长度前缀 + JSON）
/// Transport (raisin-transport)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// 节点发现广播
    Announce(NodeDescriptor),
    /// 请求远端能力目录
    CatalogRequest { client: String },
    /// 远端能力目录
    Catalog(Catalog),
    /// 订阅话题
    Subscribe { topic: String },
    /// 取消订阅
    Unsubscribe { topic: String },
    /// 话题数据（一次遥测采样）
    Topic { topic: String, payload: Bytes },
    /// 服务请求
    Request {
        correlation_id: u64,
        service: String,
        payload: Bytes,
    },
    /// 服务响应
    Response {
        correlation_id: u64,
        success: bool,
        message: String,
        payload: Bytes,
    },
    /// 心跳
    Heartbeat,
    /// 会话关闭通知
    Bye,
}

impl Frame {
    /// 构建话题帧
    pub fn topic<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self, ProtocolError> {
        Ok(Frame::Topic {
            topic: topic.into(),
            payload: encode_payload(value)?,
        })
    }

    /// 帧类型名（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Announce(_) => "announce",
            Frame::CatalogRequest { .. } => "catalog_request",
            Frame::Catalog(_) => "catalog",
            Frame::Subscribe { .. } => "subscribe",
            Frame::Unsubscribe { .. } => "unsubscribe",
            Frame::Topic { .. } => "topic",
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Heartbeat => "heartbeat",
            Frame::Bye => "bye",
        }
    }

    /// 编码为字节（JSON）
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let buf = serde_json::to_vec(self)?;
        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                len: buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Bytes::from(buf))
    }

    /// 从字节解码
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                len: buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(serde_json::from_slice(buf)?)
    }
}

/// 编码负载（JSON）
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// 解码负载（JSON）
///
/// 空负载按 `null` 处理，便于无数据的服务响应解码为 `Option<T>` 或单元结构。
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    if payload.is_empty() {
        return Ok(serde_json::from_slice(b"null")?);
    }
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_tagged_encoding() {
        let frame = Frame::Subscribe {
            topic: ROBOT_STATE_TOPIC.to_string(),
        };
        let bytes = frame.to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"type\":\"subscribe\""), "{}", text);
        assert_eq!(Frame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_announce_frame_keeps_catalog() {
        let node = NodeDescriptor::new("A", "10.0.0.5", 9001)
            .with_publisher("robot_state", ROBOT_STATE_TYPE)
            .with_service("stand_up", TRIGGER_TYPE);
        let frame = Frame::Announce(node.clone());
        let decoded = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        match decoded {
            Frame::Announce(n) => {
                assert_eq!(n, node);
                assert_eq!(
                    n.publishers.get("robot_state").map(TypeTag::as_str),
                    Some(ROBOT_STATE_TYPE)
                );
            },
            other => panic!("Expected Announce, got {:?}", other),
        }
    }

    #[test]
    fn test_topic_payload_survives_envelope() {
        let state = ExtendedRobotState {
            locomotion_state: LocomotionState::SitDown,
            ..Default::default()
        };
        let frame = Frame::topic(ROBOT_STATE_TOPIC, &state).unwrap();
        let decoded = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        let Frame::Topic { topic, payload } = decoded else {
            panic!("Expected Topic frame");
        };
        assert_eq!(topic, ROBOT_STATE_TOPIC);
        let back: ExtendedRobotState = decode_payload(&payload).unwrap();
        assert_eq!(back.locomotion_state.code(), 8);
    }

    #[test]
    fn test_decode_empty_payload_as_null() {
        let value: Option<MissionStatus> = decode_payload(&[]).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result: Result<ExtendedRobotState, _> = decode_payload(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_frame_too_large_rejected() {
        let buf = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            Frame::from_bytes(&buf),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
