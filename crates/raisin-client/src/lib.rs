//! # Raisin Client
//!
//! 面向应用的机器人控制接口：
//!
//! - 连接 / 断开（按节点 ID 或直连地址）
//! - 遥测订阅与最新值缓存（robot_state / odometry / point_cloud）
//! - 运动与控制源命令（站立、坐下、手动/自主控制、释放控制权）
//! - 地图与巡逻路线（set_map、set_waypoints、resume_patrol、路线文件）
//!
//! 所有命令都返回 [`ServiceResult`](raisin_protocol::ServiceResult)，不会 panic，
//! 也不会返回 `Err`；只有连接与等待类操作返回 [`ClientError`]。

pub mod client;
pub mod config;
pub mod error;
mod state;
#[cfg(any(test, feature = "mock"))]
pub mod testing;
pub mod types;

pub use client::RaisinClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use types::ServiceOutcome;
