//! 话题名、服务名与数据类型标签
//!
//! 每个话题只有一个规范解码器，见 [`crate::messages`]。

// ==================== 遥测话题 ====================

/// 机器人状态话题（运动状态 / 电池 / 执行器快照）
pub const ROBOT_STATE_TOPIC: &str = "robot_state";
/// 里程计话题
pub const ODOMETRY_TOPIC: &str = "odometry";
/// 点云话题
pub const POINT_CLOUD_TOPIC: &str = "point_cloud";

// ==================== 服务 ====================

pub const STAND_UP_SERVICE: &str = "stand_up";
pub const SIT_DOWN_SERVICE: &str = "sit_down";
pub const SET_MANUAL_CONTROL_SERVICE: &str = "set_manual_control";
pub const SET_AUTONOMOUS_CONTROL_SERVICE: &str = "set_autonomous_control";
pub const RELEASE_CONTROL_SERVICE: &str = "release_control";
pub const SET_MAP_SERVICE: &str = "set_map";
pub const SET_WAYPOINTS_SERVICE: &str = "set_waypoints";
pub const RESUME_PATROL_SERVICE: &str = "resume_patrol";
pub const LIST_WAYPOINTS_FILES_SERVICE: &str = "list_waypoints_files";
pub const LOAD_WAYPOINTS_FILE_SERVICE: &str = "load_waypoints_file";
pub const GET_MISSION_STATUS_SERVICE: &str = "get_mission_status";

// ==================== 数据类型标签 ====================

pub const ROBOT_STATE_TYPE: &str = "raisin_interfaces/msg/RobotState";
pub const ODOMETRY_TYPE: &str = "nav_msgs/msg/Odometry";
pub const POINT_CLOUD_TYPE: &str = "sensor_msgs/msg/PointCloud2";
pub const TRIGGER_TYPE: &str = "std_srvs/srv/Trigger";
pub const STRING_REQUEST_TYPE: &str = "raisin_interfaces/srv/String";
pub const SET_WAYPOINTS_TYPE: &str = "raisin_interfaces/srv/SetWaypoints";
pub const RESUME_PATROL_TYPE: &str = "raisin_interfaces/srv/ResumePatrol";
pub const LIST_FILES_TYPE: &str = "raisin_interfaces/srv/ListFiles";
pub const MISSION_STATUS_TYPE: &str = "raisin_interfaces/srv/MissionStatus";

// ==================== 控制源 ID ====================

/// 手动控制源（手柄 / GUI）
pub const MANUAL_CONTROL_SOURCE: &str = "joy/gui";
/// 自主控制源（巡逻 / 导航）
pub const AUTONOMOUS_CONTROL_SOURCE: &str = "vel_cmd/autonomy";
