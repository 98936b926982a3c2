//! 客户端配置
//!
//! 一个 TOML 文件同时描述客户端与网络层：
//!
//! ```toml
//! service_timeout_secs = 3.0
//!
//! [network]
//! interfaces = ["eth0"]
//! liveness_window_ms = 5000
//! ```

use crate::error::Result;
use raisin_network::NetworkConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 客户端配置（POD）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 命令类服务调用的默认超时（秒）
    pub service_timeout_secs: f64,
    /// 连接超时（秒）
    pub connect_timeout_secs: f64,
    /// 网络层配置
    pub network: NetworkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_timeout_secs: 5.0,
            connect_timeout_secs: 5.0,
            network: NetworkConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn service_timeout(&self) -> Duration {
        secs_to_duration(self.service_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs_to_duration(self.connect_timeout_secs)
    }
}

/// 秒数转 `Duration`（负数、NaN 视为 0，超出范围或无穷大饱和为 `Duration::MAX`）
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
