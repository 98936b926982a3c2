//! 机器人控制门面
//!
//! 把 [`Connection`]、订阅缓存与服务调用组合成面向机器人的操作。
//!
//! # 状态机
//!
//! `SITDOWN_MODE(8) → STANDING_MODE(6) → IN_CONTROL(7)`，由服务端执行。
//! `stand_up()` / `sit_down()` 返回 `success = true` 只表示请求被接受，
//! 迁移是否完成要看后续遥测（见 [`RaisinClient::wait_for_locomotion`]）。
//!
//! # 示例
//!
//! ```no_run
//! use raisin_client::RaisinClient;
//! use raisin_protocol::LocomotionState;
//! use std::time::Duration;
//!
//! let client = RaisinClient::new("operator").unwrap();
//! client.connect("robot_a", 5.0, None).unwrap();
//!
//! if client.stand_up().success {
//!     client
//!         .wait_for_locomotion(LocomotionState::Standing, Duration::from_secs(10), None)
//!         .unwrap();
//! }
//! ```

use crate::config::{ClientConfig, secs_to_duration};
use crate::error::{ClientError, Result};
use crate::state::StateMirror;
use crate::types::ServiceOutcome;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use raisin_network::{CancellationToken, Connection, Network, ServiceReply};
use raisin_protocol::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 机器人客户端
pub struct RaisinClient {
    name: String,
    network: Arc<Network>,
    service_timeout: Duration,
    connection: ArcSwapOption<Connection>,
    /// 串行化 connect / disconnect
    lifecycle: Mutex<()>,
    mirror: Arc<StateMirror>,
}

impl RaisinClient {
    /// 使用默认配置创建客户端（启动组播发现）
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_config(name, ClientConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let name = name.into();
        let network = Network::builder()
            .name(name.clone())
            .config(config.network.clone())
            .build()?;
        Ok(Self::with_network(name, Arc::new(network)).with_service_timeout(config.service_timeout()))
    }

    /// 在已有的网络运行时上创建客户端（多个客户端可共享一个 `Network`）
    pub fn with_network(name: impl Into<String>, network: Arc<Network>) -> Self {
        Self {
            name: name.into(),
            network,
            service_timeout: ClientConfig::default().service_timeout(),
            connection: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
            mirror: Arc::new(StateMirror::new()),
        }
    }

    /// 命令类调用的超时
    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn service_timeout(&self) -> Duration {
        self.service_timeout
    }

    /// 已发现的节点快照
    pub fn get_all_connections(&self) -> Vec<NodeDescriptor> {
        self.network.get_all_connections()
    }

    // ==================== 连接管理 ====================

    /// 连接机器人
    ///
    /// `robot_id` 可以是发现到的节点 ID，也可以是 `ip` / `ip:port`。
    /// 已连接其他机器人时先断开。连接成功后自动订阅 robot_state，
    /// 使 [`get_extended_robot_state`](Self::get_extended_robot_state) 始终是最新值。
    pub fn connect(
        &self,
        robot_id: &str,
        timeout_secs: f64,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock();
        if let Some(previous) = self.connection.swap(None) {
            debug!("Dropping previous connection to {}", previous.id());
            previous.disconnect();
        }

        let connection = self
            .network
            .connect(robot_id, secs_to_duration(timeout_secs), cancel)?;
        self.mirror.reset();

        let mirror = self.mirror.clone();
        connection.subscribe_with(ROBOT_STATE_TOPIC, decode_robot_state, move |state| {
            mirror.store_robot_state(state);
        })?;

        info!("Connected to {} ({})", robot_id, connection.id());
        self.connection.store(Some(connection));
        Ok(())
    }

    /// 断开连接（幂等）
    pub fn disconnect(&self) {
        let _guard = self.lifecycle.lock();
        if let Some(connection) = self.connection.swap(None) {
            connection.disconnect();
            info!("Disconnected from {}", connection.id());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .load()
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// 当前连接（用于读取目录或原始订阅）
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.load_full()
    }

    fn connected(&self) -> Result<Arc<Connection>> {
        self.connection
            .load_full()
            .filter(|connection| connection.is_connected())
            .ok_or(ClientError::NotConnected)
    }

    // ==================== 遥测订阅 ====================

    /// 订阅机器人状态（回调在该话题的分发线程上执行）
    pub fn subscribe_robot_state<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&ExtendedRobotState) + Send + Sync + 'static,
    {
        self.connected()?
            .subscribe_with(ROBOT_STATE_TOPIC, decode_robot_state, callback)?;
        Ok(())
    }

    pub fn subscribe_odometry<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Odometry) + Send + Sync + 'static,
    {
        self.connected()?
            .subscribe_with(ODOMETRY_TOPIC, decode_odometry, callback)?;
        Ok(())
    }

    pub fn subscribe_point_cloud<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&PointCloud) + Send + Sync + 'static,
    {
        self.connected()?
            .subscribe_with(POINT_CLOUD_TOPIC, decode_point_cloud, callback)?;
        Ok(())
    }

    // ==================== 缓存读取（不阻塞） ====================

    /// 最近一帧扩展机器人状态
    pub fn get_extended_robot_state(&self) -> Option<Arc<ExtendedRobotState>> {
        self.mirror.robot_state()
    }

    /// 最近一帧运动状态
    pub fn locomotion_state(&self) -> Option<LocomotionState> {
        self.mirror.locomotion_state()
    }

    /// 最近一帧里程计（需先 `subscribe_odometry`）
    pub fn get_odometry(&self) -> Option<Arc<Odometry>> {
        self.latest(ODOMETRY_TOPIC)
    }

    /// 最近一帧点云（需先 `subscribe_point_cloud`）
    pub fn get_point_cloud(&self) -> Option<Arc<PointCloud>> {
        self.latest(POINT_CLOUD_TOPIC)
    }

    /// 最近一次查询到的任务进度（无任务时 `valid = false`）
    pub fn get_mission_status(&self) -> MissionStatus {
        self.mirror.mission()
    }

    /// 最近一次 `set_map` 成功加载的地图
    pub fn loaded_map(&self) -> Option<String> {
        self.mirror.loaded_map()
    }

    fn latest<T: Send + Sync + 'static>(&self, topic: &str) -> Option<Arc<T>> {
        let connection = self.connection.load_full()?;
        match connection.get_latest::<T>(topic) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot read '{}': {}", topic, e);
                None
            },
        }
    }

    // ==================== 运动与控制源 ====================

    /// 请求站立
    pub fn stand_up(&self) -> ServiceResult {
        self.trigger(STAND_UP_SERVICE)
    }

    /// 请求坐下
    pub fn sit_down(&self) -> ServiceResult {
        self.trigger(SIT_DOWN_SERVICE)
    }

    /// 申请手动控制（joy/gui）
    pub fn set_manual_control(&self) -> ServiceResult {
        self.trigger(SET_MANUAL_CONTROL_SERVICE)
    }

    /// 申请自主控制（vel_cmd/autonomy）
    pub fn set_autonomous_control(&self) -> ServiceResult {
        self.trigger(SET_AUTONOMOUS_CONTROL_SERVICE)
    }

    /// 释放指定控制源
    ///
    /// 每个控制源需要单独释放，例如同时释放手动与自主控制：
    ///
    /// ```no_run
    /// # use raisin_client::RaisinClient;
    /// # use raisin_protocol::{AUTONOMOUS_CONTROL_SOURCE, MANUAL_CONTROL_SOURCE};
    /// # let client = RaisinClient::new("operator").unwrap();
    /// client.release_control(MANUAL_CONTROL_SOURCE);
    /// client.release_control(AUTONOMOUS_CONTROL_SOURCE);
    /// ```
    pub fn release_control(&self, source: &str) -> ServiceResult {
        self.command(RELEASE_CONTROL_SERVICE, &NameRequest::new(source))
    }

    /// 阻塞等待遥测报告目标运动状态
    ///
    /// # 错误
    ///
    /// - `ClientError::Timeout`: 超时仍未达到目标状态
    /// - `ClientError::Cancelled`: 取消令牌被置位
    /// - `ClientError::NotConnected`: 未连接或等待中连接断开
    ///
    /// # 阻塞行为
    ///
    /// 按网络配置的轮询间隔读取缓存，不在 `async` 上下文中调用。
    pub fn wait_for_locomotion(
        &self,
        target: LocomotionState,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let poll_interval = self.network.config().poll_interval();
        let start = Instant::now();

        loop {
            if self.locomotion_state() == Some(target) {
                return Ok(());
            }
            if !self.is_connected() {
                return Err(ClientError::NotConnected);
            }
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ClientError::Cancelled);
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            let sleep_duration = poll_interval.min(remaining);
            if sleep_duration.is_zero() {
                return Err(ClientError::Timeout {
                    what: target.name(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(sleep_duration);
        }
    }

    // ==================== 地图与巡逻 ====================

    /// 加载地图；成功后记录为当前地图，供 `set_waypoints` 校验航点坐标系
    pub fn set_map(&self, name: &str) -> ServiceResult {
        let result = self.command(SET_MAP_SERVICE, &NameRequest::new(name));
        if result.success {
            self.mirror.set_loaded_map(name);
        }
        result
    }

    /// 上传巡逻路线
    ///
    /// 已知当前地图时（之前 `set_map` 成功），航点坐标系不一致会直接返回
    /// `invalid frame` 失败，不发送请求。
    pub fn set_waypoints(&self, waypoints: &[Waypoint], laps: u32) -> ServiceResult {
        if let Some(map) = self.mirror.loaded_map()
            && let Some(bad) = waypoints.iter().find(|wp| wp.map_frame != map)
        {
            let error = CallError::InvalidFrame {
                expected: map,
                found: bad.map_frame.clone(),
            };
            warn!("set_waypoints rejected: {}", error);
            return error.into();
        }

        let request = SetWaypointsRequest {
            waypoints: waypoints.to_vec(),
            laps,
        };
        self.command(SET_WAYPOINTS_SERVICE, &request)
    }

    /// 从离当前位置最近的航点恢复巡逻，返回恢复起点的航点序号
    pub fn resume_patrol(&self) -> ServiceOutcome<u8> {
        let reply = self.call(RESUME_PATROL_SERVICE, &EmptyRequest::default());
        ServiceOutcome::from_reply(reply, |response: ResumePatrolResponse| response.index)
    }

    /// 列出机器人端保存的路线文件
    pub fn list_waypoints_files(&self) -> ServiceOutcome<Vec<String>> {
        let reply = self.call(LIST_WAYPOINTS_FILES_SERVICE, &EmptyRequest::default());
        ServiceOutcome::from_reply(reply, |response: WaypointsFilesResponse| response.files)
    }

    /// 按名称加载机器人端保存的路线
    pub fn load_waypoints_file(&self, name: &str) -> ServiceResult {
        self.command(LOAD_WAYPOINTS_FILE_SERVICE, &NameRequest::new(name))
    }

    /// 查询任务进度（同时刷新 `get_mission_status` 的缓存）
    pub fn query_mission_status(&self) -> ServiceOutcome<MissionStatus> {
        let reply = self.call(GET_MISSION_STATUS_SERVICE, &EmptyRequest::default());
        let outcome = ServiceOutcome::from_reply(reply, |status: MissionStatus| status);
        if let Some(status) = outcome.value {
            self.mirror.store_mission(status);
        }
        outcome
    }

    // ==================== 调用辅助 ====================

    fn trigger(&self, service: &str) -> ServiceResult {
        self.command(service, &EmptyRequest::default())
    }

    fn command<Req: Serialize + ?Sized>(&self, service: &str, request: &Req) -> ServiceResult {
        self.call(service, request).result
    }

    fn call<Req: Serialize + ?Sized>(&self, service: &str, request: &Req) -> ServiceReply {
        let Some(connection) = self.connection.load_full() else {
            debug!("{} skipped: not connected", service);
            return CallError::Disconnected.into();
        };

        let reply = connection.call(service, request, self.service_timeout);
        if reply.success() {
            info!("{}: {}", service, reply.result.message);
        } else {
            warn!("{} failed: {}", service, reply.result.message);
        }
        reply
    }
}

impl Drop for RaisinClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.swap(None) {
            connection.disconnect();
        }
    }
}

impl std::fmt::Debug for RaisinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaisinClient")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .field("service_timeout", &self.service_timeout)
            .finish()
    }
}
