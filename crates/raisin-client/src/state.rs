//! 客户端状态镜像
//!
//! 服务端是状态的权威来源；这里只保存最近一次看到的快照，供同步查询使用。
//! 所有读取都不阻塞网络。

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use raisin_protocol::{ExtendedRobotState, LocomotionState, MissionStatus};
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct StateMirror {
    /// 最近一帧 robot_state（由内部回调整体替换）
    robot_state: ArcSwapOption<ExtendedRobotState>,
    /// 最近一次查询到的任务进度
    mission: ArcSwap<MissionStatus>,
    /// 最近一次 set_map 成功设置的地图
    loaded_map: Mutex<Option<String>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新连接：清空上一台机器人的镜像
    pub fn reset(&self) {
        self.robot_state.store(None);
        self.mission.store(Arc::new(MissionStatus::default()));
        *self.loaded_map.lock() = None;
    }

    pub fn store_robot_state(&self, state: &ExtendedRobotState) {
        self.robot_state.store(Some(Arc::new(state.clone())));
    }

    pub fn robot_state(&self) -> Option<Arc<ExtendedRobotState>> {
        self.robot_state.load_full()
    }

    pub fn locomotion_state(&self) -> Option<LocomotionState> {
        self.robot_state
            .load()
            .as_ref()
            .map(|state| state.locomotion_state)
    }

    pub fn store_mission(&self, status: MissionStatus) {
        self.mission.store(Arc::new(status));
    }

    pub fn mission(&self) -> MissionStatus {
        **self.mission.load()
    }

    pub fn set_loaded_map(&self, name: &str) {
        *self.loaded_map.lock() = Some(name.to_string());
    }

    pub fn loaded_map(&self) -> Option<String> {
        self.loaded_map.lock().clone()
    }
}
