//! 网络运行时配置
//!
//! 纯数据（POD），可从 TOML 加载。所有字段都有默认值，
//! 配置文件只需写出需要覆盖的项。
//!
//! ```toml
//! interfaces = ["eth0", "lo"]
//! liveness_window_ms = 5000
//! link_timeout_ms = 0   # 关闭链路超时检测
//! ```

use crate::error::NetworkError;
use raisin_transport::udp::{DEFAULT_DISCOVERY_GROUP, DEFAULT_DISCOVERY_PORT};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// 未指定端口时直连使用的会话端口
pub const DEFAULT_SESSION_PORT: u16 = 9001;

/// 网络配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 监听发现广播的网卡（名称或 IPv4 地址，空表示默认网卡）
    pub interfaces: Vec<String>,
    /// 发现组播组
    pub discovery_group: Ipv4Addr,
    /// 发现端口
    pub discovery_port: u16,
    /// 直连地址不带端口时使用的端口
    pub default_port: u16,
    /// 节点存活窗口（毫秒），超过此时间未再广播的节点从快照中排除
    pub liveness_window_ms: u64,
    /// 过期节点清理周期（毫秒）
    pub sweep_interval_ms: u64,
    /// 接收线程单次等待时长（毫秒），也决定退出标志的检查粒度
    pub receive_timeout_ms: u64,
    /// 阻塞等待中检查取消/超时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 心跳发送间隔（毫秒，0 表示不发送）
    pub heartbeat_interval_ms: u64,
    /// 链路超时（毫秒，0 表示不检测）
    pub link_timeout_ms: u64,
    /// 发送队列容量
    pub send_queue_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            discovery_group: DEFAULT_DISCOVERY_GROUP,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            default_port: DEFAULT_SESSION_PORT,
            liveness_window_ms: 3000,
            sweep_interval_ms: 500,
            receive_timeout_ms: 50,
            poll_interval_ms: 20,
            heartbeat_interval_ms: 1000,
            link_timeout_ms: 5000,
            send_queue_capacity: 64,
        }
    }
}

impl NetworkConfig {
    /// 从 TOML 文本解析
    pub fn from_toml_str(text: &str) -> Result<Self, NetworkError> {
        Ok(toml::from_str(text)?)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// 接收等待时长（至少 1ms）
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }

    /// 轮询间隔（至少 1ms）
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn link_timeout(&self) -> Option<Duration> {
        (self.link_timeout_ms > 0).then(|| Duration::from_millis(self.link_timeout_ms))
    }
}
