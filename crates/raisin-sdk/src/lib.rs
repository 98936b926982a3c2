//! Raisin SDK - 四足机器人客户端 Rust SDK
//!
//! 在网络上发现机器人、建立连接、缓存遥测并下发控制命令。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 传输帧、遥测/服务消息、状态码枚举
//! - **传输层** (`transport`): 会话与发现广播的抽象（TCP / UDP 组播 / 内存 mock）
//! - **网络层** (`network`): 发现注册表、连接、订阅缓存、服务调用
//! - **客户端层** (`client`): 面向机器人的操作（站立/坐下、控制源、巡逻）
//!
//! # 快速开始
//!
//! ```no_run
//! use raisin_sdk::prelude::*;
//!
//! raisin_sdk::init_logging();
//!
//! let client = RaisinClient::new("operator").unwrap();
//! client.connect("robot_a", 5.0, None).unwrap();
//!
//! if let Some(state) = client.get_extended_robot_state() {
//!     println!("{} ({:?}% battery)", state.locomotion_state, state.battery_percentage());
//! }
//! ```

mod logging;
pub mod prelude;

pub use raisin_client as client;
pub use raisin_network as network;
pub use raisin_protocol as protocol;
pub use raisin_transport as transport;

pub use logging::{init_logging, init_logging_with};

// 客户端层（推荐入口）
pub use raisin_client::{ClientConfig, ClientError, RaisinClient, ServiceOutcome};

// 网络层
pub use raisin_network::{
    CancellationToken, Connection, ConnectionState, Network, NetworkBuilder, NetworkConfig,
    NetworkError,
};

// 协议层
pub use raisin_protocol::{
    ExtendedRobotState, LocomotionState, MissionStatus, NodeDescriptor, ServiceResult, Waypoint,
};

/// 模拟机器人（`mock` feature）
#[cfg(feature = "mock")]
pub use raisin_client::testing;
