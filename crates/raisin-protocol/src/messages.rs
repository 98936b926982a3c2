//! 遥测消息定义
//!
//! 每个遥测话题对应一个消息类型和一个规范解码器（`decode_*`）。

use crate::constants::{ActuatorState, ControlSource, LocomotionState};
use crate::{ProtocolError, decode_payload};
use serde::{Deserialize, Serialize};

/// 单个执行器状态
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorStatus {
    /// 执行器名称（如 "LF_HAA"）
    pub name: String,
    /// 状态码
    pub status: ActuatorState,
    /// 温度（°C）
    pub temperature: f64,
    /// 位置（rad）
    pub position: f64,
    /// 速度（rad/s）
    pub velocity: f64,
    /// 力矩（N·m）
    pub effort: f64,
}

/// 扩展机器人状态（robot_state 话题）
///
/// 值快照：每个遥测帧整体替换上一帧，不做字段级更新。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtendedRobotState {
    /// 运动状态
    pub locomotion_state: LocomotionState,
    /// 当前控制源
    #[serde(default)]
    pub control_source: ControlSource,
    /// 电池电压（V）
    #[serde(default)]
    pub voltage: f64,
    /// 电池电流（A）
    #[serde(default)]
    pub current: f64,
    /// 电池最低电压（V）
    #[serde(default)]
    pub min_voltage: f64,
    /// 电池最高电压（V）
    #[serde(default)]
    pub max_voltage: f64,
    /// 机身温度（°C）
    #[serde(default)]
    pub body_temperature: f64,
    /// 执行器状态（按机器人端顺序）
    #[serde(default)]
    pub actuators: Vec<ActuatorStatus>,
}

impl ExtendedRobotState {
    /// 运动状态名
    pub fn locomotion_state_name(&self) -> String {
        self.locomotion_state.name()
    }

    /// 是否处于可运动状态
    pub fn is_operational(&self) -> bool {
        self.locomotion_state.is_operational()
    }

    /// 控制源显示名
    pub fn control_source_name(&self) -> String {
        self.control_source.name()
    }

    /// 是否存在执行器错误
    pub fn has_actuator_error(&self) -> bool {
        self.actuators.iter().any(|a| a.status.is_error())
    }

    /// 处于错误状态的执行器（格式：`"<name>: <STATUS>"`）
    pub fn actuators_with_errors(&self) -> Vec<String> {
        self.actuators
            .iter()
            .filter(|a| a.status.is_error())
            .map(|a| format!("{}: {}", a.name, a.status.name()))
            .collect()
    }

    /// 所有执行器是否都处于运行使能状态
    ///
    /// 没有执行器数据时返回 `false`。
    pub fn all_actuators_operational(&self) -> bool {
        !self.actuators.is_empty() && self.actuators.iter().all(|a| a.status.is_operational())
    }

    /// 电池电量百分比（按电压线性估算，0-100）
    ///
    /// 电压范围无效（`max_voltage <= min_voltage`）时返回 `None`。
    pub fn battery_percentage(&self) -> Option<f64> {
        let span = self.max_voltage - self.min_voltage;
        if span <= 0.0 {
            return None;
        }
        let percent = (self.voltage - self.min_voltage) / span * 100.0;
        Some(percent.clamp(0.0, 100.0))
    }
}

/// 里程计（odometry 话题）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    /// 参考坐标系
    #[serde(default)]
    pub frame_id: String,
    /// 位置（m）
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// 航向角（rad）
    #[serde(default)]
    pub yaw: f64,
    /// 线速度（m/s）
    #[serde(default)]
    pub linear_velocity: f64,
    /// 角速度（rad/s）
    #[serde(default)]
    pub angular_velocity: f64,
}

/// 三维点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 点云（point_cloud 话题）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    #[serde(default)]
    pub frame_id: String,
    #[serde(default)]
    pub points: Vec<Point3>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 航点
///
/// 航点序列构成一条巡逻路线，执行顺序即序列顺序。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    /// 地图坐标系名（必须与当前加载的地图一致）
    pub map_frame: String,
    pub x: f64,
    pub y: f64,
}

impl Waypoint {
    pub fn new(map_frame: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            map_frame: map_frame.into(),
            x,
            y,
        }
    }
}

/// 任务进度快照
///
/// 没有活动任务时 `valid = false`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionStatus {
    pub valid: bool,
    pub current_index: u8,
}

// ==================== 规范解码器 ====================

/// robot_state 话题解码器
pub fn decode_robot_state(payload: &[u8]) -> Result<ExtendedRobotState, ProtocolError> {
    decode_payload(payload)
}

/// odometry 话题解码器
pub fn decode_odometry(payload: &[u8]) -> Result<Odometry, ProtocolError> {
    decode_payload(payload)
}

/// point_cloud 话题解码器
pub fn decode_point_cloud(payload: &[u8]) -> Result<PointCloud, ProtocolError> {
    decode_payload(payload)
}
