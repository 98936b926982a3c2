//! 状态码枚举定义
//!
//! 遥测中的状态码统一建模为封闭枚举，未知值保留原始数值（`Other` / `Unknown`），
//! 正常/错误的分类逻辑集中在各自的 `is_*` 方法中。

use crate::ids::{AUTONOMOUS_CONTROL_SOURCE, MANUAL_CONTROL_SOURCE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 运动状态（locomotion_state）
///
/// 正常流程：`SITDOWN_MODE(8) → STANDING_MODE(6) → IN_CONTROL(7)`。
/// 其他瞬态/错误状态原样保留在 `Other` 中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum LocomotionState {
    /// 站立模式（已站立，未接受运动指令）
    Standing = 6,
    /// 受控模式（正在接受运动指令）
    InControl = 7,
    /// 坐下模式（待机）
    SitDown = 8,
    /// 其他状态码（原样透传）
    #[num_enum(catch_all)]
    Other(u8),
}

impl LocomotionState {
    /// 原始状态码
    pub fn code(self) -> u8 {
        match self {
            Self::Standing => 6,
            Self::InControl => 7,
            Self::SitDown => 8,
            Self::Other(code) => code,
        }
    }

    /// 状态名（与机器人端命名一致）
    pub fn name(self) -> String {
        match self {
            Self::Standing => "STANDING_MODE".to_string(),
            Self::InControl => "IN_CONTROL".to_string(),
            Self::SitDown => "SITDOWN_MODE".to_string(),
            Self::Other(code) => format!("UNKNOWN({})", code),
        }
    }

    /// 是否处于可运动状态（站立或受控）
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Standing | Self::InControl)
    }
}

impl Default for LocomotionState {
    fn default() -> Self {
        Self::Other(0)
    }
}

impl From<LocomotionState> for u8 {
    fn from(state: LocomotionState) -> Self {
        state.code()
    }
}

impl fmt::Display for LocomotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 执行器状态码（CiA-402 状态字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum ActuatorState {
    /// 未就绪
    NotReadyToSwitchOn = 0,
    /// 故障
    Fault = 8,
    /// 准备上电（正常待机）
    ReadyToSwitchOn = 33,
    /// 已上电（正常）
    SwitchedOn = 35,
    /// 运行使能（正常运行）
    OperationEnabled = 39,
    /// 未登记的状态码
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ActuatorState {
    pub fn code(self) -> u8 {
        match self {
            Self::NotReadyToSwitchOn => 0,
            Self::Fault => 8,
            Self::ReadyToSwitchOn => 33,
            Self::SwitchedOn => 35,
            Self::OperationEnabled => 39,
            Self::Unknown(code) => code,
        }
    }

    pub fn name(self) -> String {
        match self {
            Self::NotReadyToSwitchOn => "NOT_READY".to_string(),
            Self::Fault => "FAULT".to_string(),
            Self::ReadyToSwitchOn => "READY".to_string(),
            Self::SwitchedOn => "SWITCHED_ON".to_string(),
            Self::OperationEnabled => "OPERATIONAL".to_string(),
            Self::Unknown(code) => format!("UNKNOWN({})", code),
        }
    }

    /// 是否为错误状态
    ///
    /// 正常状态只有 READY_TO_SWITCH_ON(33)、SWITCHED_ON(35)、OPERATION_ENABLED(39)，
    /// 其余状态码（包括未登记的）一律视为错误。
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            Self::ReadyToSwitchOn | Self::SwitchedOn | Self::OperationEnabled
        )
    }

    /// 是否正在运行
    pub fn is_operational(self) -> bool {
        self == Self::OperationEnabled
    }
}

impl Default for ActuatorState {
    fn default() -> Self {
        Self::NotReadyToSwitchOn
    }
}

impl From<ActuatorState> for u8 {
    fn from(state: ActuatorState) -> Self {
        state.code()
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 控制源（当前持有运动控制权的一方）
///
/// 线上以控制源 ID 字符串传输（如 `"joy/gui"`）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlSource {
    /// 无控制源
    #[default]
    None,
    /// 手动控制（手柄 / GUI）
    Manual,
    /// 自主控制（巡逻）
    Autonomous,
    /// 其他控制源
    Other(String),
}

impl ControlSource {
    /// 控制源 ID（释放控制权时使用）
    pub fn source_id(&self) -> &str {
        match self {
            Self::None => "",
            Self::Manual => MANUAL_CONTROL_SOURCE,
            Self::Autonomous => AUTONOMOUS_CONTROL_SOURCE,
            Self::Other(id) => id,
        }
    }

    /// 显示名
    pub fn name(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Manual => "Manual (joy/gui)".to_string(),
            Self::Autonomous => "Autonomous (vel_cmd/autonomy)".to_string(),
            Self::Other(id) => id.clone(),
        }
    }
}

impl From<String> for ControlSource {
    fn from(id: String) -> Self {
        match id.as_str() {
            "" => Self::None,
            MANUAL_CONTROL_SOURCE => Self::Manual,
            AUTONOMOUS_CONTROL_SOURCE => Self::Autonomous,
            _ => Self::Other(id),
        }
    }
}

impl From<&str> for ControlSource {
    fn from(id: &str) -> Self {
        Self::from(id.to_string())
    }
}

impl From<ControlSource> for String {
    fn from(source: ControlSource) -> Self {
        source.source_id().to_string()
    }
}

impl fmt::Display for ControlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
