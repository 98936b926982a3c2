//! # Raisin Network
//!
//! 客户端核心：发现、连接、遥测缓存与服务调用。
//!
//! - [`Network`]: 每个应用一个，持有发现注册表并创建连接
//! - [`DiscoveryRegistry`]: 节点快照（存活窗口过滤）
//! - [`Connection`]: 与单个节点的会话（RX / TX 双线程）
//! - [`SubscriptionCache`]: 话题最新值 + 每话题独立分发线程
//! - [`ServiceInvoker`]: 关联 ID 等待表，同步请求/响应
//!
//! # 线程模型
//!
//! ```text
//! discovery thread ──▶ DiscoveryRegistry
//! rx thread ─┬─▶ SubscriptionCache ──▶ dispatch worker (每话题一个) ──▶ 回调
//!            └─▶ ServiceInvoker ──▶ 阻塞中的 call()
//! tx thread ◀── 有界发送队列 ◀── subscribe / call / 心跳
//! ```

pub mod cancel;
pub mod config;
pub mod connection;
pub mod discovery;
mod error;
pub mod heartbeat;
pub mod invoker;
pub mod metrics;
mod network;
pub mod subscription;
mod thread;

pub use cancel::{CancellationToken, deadline_after};
pub use config::{DEFAULT_SESSION_PORT, NetworkConfig};
pub use connection::{Connection, ConnectionState, check_protocol_version};
pub use discovery::DiscoveryRegistry;
pub use error::NetworkError;
pub use heartbeat::LinkMonitor;
pub use invoker::{ServiceInvoker, ServiceReply};
pub use metrics::{MetricsSnapshot, NetworkMetrics};
pub use network::{Network, NetworkBuilder, parse_direct_address};
pub use subscription::{Sample, SubscriptionCache};

// 重新导出传输层类型，应用无需直接依赖 raisin-transport
pub use raisin_transport::{Endpoint, TransportError, TransportKind};
