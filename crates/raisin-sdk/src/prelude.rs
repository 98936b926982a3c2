//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use raisin_sdk::prelude::*;
//! ```

// 客户端层
pub use crate::client::{ClientConfig, ClientError, RaisinClient, ServiceOutcome};

// 网络层
pub use crate::network::{CancellationToken, Network, NetworkConfig, NetworkError};

// 遥测与命令类型
pub use crate::protocol::{
    ActuatorState, ActuatorStatus, ControlSource, ExtendedRobotState, LocomotionState,
    MissionStatus, NodeDescriptor, Odometry, PointCloud, ServiceResult, Waypoint,
};

// 控制源 ID（release_control 使用）
pub use crate::protocol::{AUTONOMOUS_CONTROL_SOURCE, MANUAL_CONTROL_SOURCE};
