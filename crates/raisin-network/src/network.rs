//! 网络运行时
//!
//! 每个应用一个 `Network`：持有发现注册表与后台发现线程，并负责创建连接。
//! 同一节点同时最多只有一个活动连接，重复 `connect()` 返回已有连接。

use crate::cancel::{CancellationToken, deadline_after, is_cancelled};
use crate::config::NetworkConfig;
use crate::connection::{ConnectParams, Connection, ConnectionState};
use crate::discovery::{DiscoveryRegistry, discovery_loop};
use crate::error::NetworkError;
use crate::metrics::{MetricsSnapshot, NetworkMetrics};
use crate::thread::{JOIN_TIMEOUT, JoinTimeout, spawn_named};
use parking_lot::Mutex;
use raisin_protocol::NodeDescriptor;
use raisin_transport::{AnnounceSource, Connector, Endpoint, TcpConnector, UdpAnnounceSource};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// 网络运行时
pub struct Network {
    name: String,
    config: NetworkConfig,
    registry: Arc<DiscoveryRegistry>,
    connector: Arc<dyn Connector>,
    connections: Mutex<HashMap<String, Weak<Connection>>>,
    metrics: Arc<NetworkMetrics>,
    stop: CancellationToken,
    discovery_thread: Option<JoinHandle<()>>,
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// 使用默认传输（TCP 会话 + UDP 组播发现）创建网络
    pub fn new(name: impl Into<String>, interfaces: &[String]) -> Result<Self, NetworkError> {
        Self::builder().name(name).interfaces(interfaces.to_vec()).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DiscoveryRegistry> {
        &self.registry
    }

    /// 当前已发现的存活节点（快照，可为空）
    pub fn get_all_connections(&self) -> Vec<NodeDescriptor> {
        self.registry.snapshot()
    }

    /// 当前仍处于连接状态的连接
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let mut connections = self.connections.lock();
        connections.retain(|_, weak| weak.strong_count() > 0);
        connections
            .values()
            .filter_map(Weak::upgrade)
            .filter(|conn| conn.is_connected())
            .collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 连接节点
    ///
    /// `id` 先在注册表中查找；找不到时若是 `ip` 或 `ip:port` 形式则直接连接
    /// （不带端口时使用 `default_port`），否则在超时内持续等待该节点出现。
    ///
    /// 同一远端节点只保留一个活动连接：按节点 ID 或地址命中已有连接时直接返回它，
    /// 握手后发现远端 ID 已有活动连接时关闭新会话并返回已有连接。
    ///
    /// # 错误
    ///
    /// - `ConnectionTimeout`: 超时内节点未出现或会话/握手未完成
    /// - `Cancelled`: 取消令牌被置位（按轮询间隔检查）
    /// - `Handshake`: 目录获取失败或协议版本不兼容
    pub fn connect(
        &self,
        id: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Arc<Connection>, NetworkError> {
        if let Some(existing) = self.find_live(|state| state.id == id) {
            debug!("Reusing existing connection to {}", id);
            return Ok(existing);
        }

        let deadline = deadline_after(timeout);
        let endpoint = self.resolve_endpoint(id, deadline, timeout, cancel)?;
        if let Some(existing) = self.find_live(|state| same_endpoint(state, &endpoint)) {
            debug!("{} resolves to {}, reusing existing connection", id, endpoint);
            return Ok(existing);
        }
        info!("Connecting to {} at {}", id, endpoint);

        let connection = Connection::open(ConnectParams {
            endpoint: endpoint.clone(),
            node_id: id.to_string(),
            client_name: &self.name,
            connector: self.connector.clone(),
            config: &self.config,
            metrics: self.metrics.clone(),
            deadline,
            timeout,
            cancel,
        })?;

        // 并发 connect 同一节点、或经不同地址到达同一节点时只保留先完成的连接
        let node_id = connection.id();
        let mut connections = self.connections.lock();
        connections.retain(|_, weak| weak.strong_count() > 0);
        let existing = connections
            .values()
            .filter_map(Weak::upgrade)
            .filter(|conn| !Arc::ptr_eq(conn, &connection))
            .find(|conn| {
                let state = conn.lock();
                state.connected && (state.id == node_id || same_endpoint(&state, &endpoint))
            });
        if let Some(existing) = existing {
            drop(connections);
            debug!("{} already has a live connection, closing duplicate", node_id);
            connection.disconnect();
            return Ok(existing);
        }
        connections.insert(node_id, Arc::downgrade(&connection));
        Ok(connection)
    }

    /// 查找满足条件的活动连接
    fn find_live(&self, pred: impl Fn(&ConnectionState) -> bool) -> Option<Arc<Connection>> {
        self.connections
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .find(|conn| {
                let state = conn.lock();
                state.connected && pred(&state)
            })
    }

    fn resolve_endpoint(
        &self,
        id: &str,
        deadline: Instant,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Endpoint, NetworkError> {
        if id.trim().is_empty() {
            return Err(NetworkError::InvalidAddress(id.to_string()));
        }
        let poll = self.config.poll_interval();
        loop {
            if let Some(node) = self.registry.resolve(id) {
                return Ok(Endpoint::new(node.address.clone(), node.port));
            }
            if let Some(endpoint) = parse_direct_address(id, self.config.default_port) {
                debug!("{} is not a discovered node, connecting directly", id);
                return Ok(endpoint);
            }
            if is_cancelled(cancel) {
                return Err(NetworkError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NetworkError::ConnectionTimeout(timeout));
            }
            std::thread::sleep(poll.min(remaining));
        }
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.discovery_thread.take()
            && handle.join_timeout(JOIN_TIMEOUT).is_err()
        {
            error!(
                "Discovery thread failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }
    }
}

fn same_endpoint(state: &ConnectionState, endpoint: &Endpoint) -> bool {
    state.address == endpoint.address && state.port == endpoint.port
}

/// 把 `ip` 或 `ip:port` 解析为端点
pub fn parse_direct_address(text: &str, default_port: u16) -> Option<Endpoint> {
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Some(Endpoint::new(addr.ip().to_string(), addr.port()));
    }
    if let Ok(ip) = text.parse::<IpAddr>() {
        return Some(Endpoint::new(ip.to_string(), default_port));
    }
    None
}

/// Network Builder（链式构造）
///
/// ```no_run
/// use raisin_network::{Network, NetworkConfig};
///
/// let network = Network::builder()
///     .name("operator")
///     .interfaces(vec!["eth0".to_string()])
///     .config(NetworkConfig {
///         liveness_window_ms: 5000,
///         ..Default::default()
///     })
///     .build()
///     .unwrap();
/// ```
pub struct NetworkBuilder {
    name: String,
    interfaces: Option<Vec<String>>,
    config: Option<NetworkConfig>,
    connector: Option<Arc<dyn Connector>>,
    announce_source: Option<Box<dyn AnnounceSource>>,
    discovery: bool,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self {
            name: "raisin_client".to_string(),
            interfaces: None,
            config: None,
            connector: None,
            announce_source: None,
            discovery: true,
        }
    }

    /// 应用名（握手时发送给远端）
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 发现广播网卡（覆盖配置中的 `interfaces`）
    pub fn interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 会话建立器（默认 TCP）
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 发现广播来源（默认 UDP 组播）
    pub fn announce_source(mut self, source: Box<dyn AnnounceSource>) -> Self {
        self.announce_source = Some(source);
        self
    }

    /// 不启动发现线程（只使用直连地址）
    pub fn without_discovery(mut self) -> Self {
        self.discovery = false;
        self
    }

    pub fn build(self) -> Result<Network, NetworkError> {
        let mut config = self.config.unwrap_or_default();
        if let Some(interfaces) = self.interfaces {
            config.interfaces = interfaces;
        }

        let registry = Arc::new(DiscoveryRegistry::new(config.liveness_window()));
        let metrics = Arc::new(NetworkMetrics::new());
        let stop = CancellationToken::new();

        let discovery_thread = if self.discovery {
            let source = match self.announce_source {
                Some(source) => source,
                None => Box::new(UdpAnnounceSource::bind(
                    &config.interfaces,
                    config.discovery_group,
                    config.discovery_port,
                )?),
            };
            let registry = registry.clone();
            let metrics = metrics.clone();
            let stop = stop.clone();
            let loop_config = config.clone();
            Some(spawn_named("raisin-discovery".to_string(), move || {
                discovery_loop(source, registry, loop_config, stop, metrics)
            })?)
        } else {
            None
        };

        info!(
            "Network '{}' started (interfaces: {:?}, discovery: {})",
            self.name,
            config.interfaces,
            if self.discovery { "on" } else { "off" }
        );

        Ok(Network {
            name: self.name,
            config,
            registry,
            connector: self.connector.unwrap_or_else(|| Arc::new(TcpConnector::new())),
            connections: Mutex::new(HashMap::new()),
            metrics,
            stop,
            discovery_thread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raisin_protocol::{Catalog, Frame};
    use raisin_transport::mock::{MockConnector, announce_channel};

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            poll_interval_ms: 5,
            receive_timeout_ms: 10,
            heartbeat_interval_ms: 0,
            ..Default::default()
        }
    }

    /// 接受所有会话并回复目录
    fn spawn_robot(connector: &MockConnector, address: &str, port: u16, id: &str) {
        let accept = connector.listen(address, port);
        let node = NodeDescriptor::new(id, address, port);
        std::thread::spawn(move || {
            let mut peers = Vec::new();
            while let Ok(peer) = accept.recv_timeout(Duration::from_secs(5)) {
                if peer
                    .recv_matching(Duration::from_secs(2), |f| {
                        matches!(f, Frame::CatalogRequest { .. })
                    })
                    .is_ok()
                {
                    let _ = peer.send(Frame::Catalog(Catalog::from_descriptor(&node)));
                }
                peers.push(peer);
            }
        });
    }

    #[test]
    fn test_parse_direct_address() {
        let ep = parse_direct_address("10.0.0.5", 9001).unwrap();
        assert_eq!((ep.address.as_str(), ep.port), ("10.0.0.5", 9001));
        let ep = parse_direct_address("10.0.0.5:7000", 9001).unwrap();
        assert_eq!(ep.port, 7000);
        assert!(parse_direct_address("robot_a", 9001).is_none());
    }

    #[test]
    fn test_discovered_node_is_listed_and_connectable() {
        let connector = MockConnector::new();
        let (announcer, source) = announce_channel();
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(connector.clone()))
            .announce_source(Box::new(source))
            .build()
            .unwrap();
        assert!(network.get_all_connections().is_empty());

        spawn_robot(&connector, "10.0.0.5", 9001, "A");
        announcer.announce(&NodeDescriptor::new("A", "10.0.0.5", 9001));

        let conn = network.connect("A", Duration::from_secs(2), None).unwrap();
        assert!(conn.is_connected());
        let nodes = network.get_all_connections();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "A");

        // 同一节点复用已有连接
        let again = network.connect("A", Duration::from_secs(2), None).unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
        assert_eq!(network.connections().len(), 1);

        conn.disconnect();
        assert!(network.connections().is_empty());
    }

    #[test]
    fn test_direct_address_fallback() {
        let connector = MockConnector::new();
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(connector.clone()))
            .without_discovery()
            .build()
            .unwrap();
        spawn_robot(&connector, "127.0.0.1", network.config().default_port, "sim");

        let conn = network.connect("127.0.0.1", Duration::from_secs(2), None).unwrap();
        assert_eq!(conn.id(), "sim");
        assert_eq!(conn.info().address, "127.0.0.1");
    }

    #[test]
    fn test_unknown_node_times_out() {
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(MockConnector::new()))
            .without_discovery()
            .build()
            .unwrap();
        let start = Instant::now();
        let result = network.connect("ghost", Duration::from_millis(100), None);
        assert!(matches!(result, Err(NetworkError::ConnectionTimeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_cancel_while_waiting_for_node() {
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(MockConnector::new()))
            .without_discovery()
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = network.connect("ghost", Duration::from_secs(10), Some(&token));
        assert!(matches!(result, Err(NetworkError::Cancelled)));
    }

    #[test]
    fn test_same_node_by_id_and_address_shares_connection() {
        let connector = MockConnector::new();
        let (announcer, source) = announce_channel();
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(connector.clone()))
            .announce_source(Box::new(source))
            .build()
            .unwrap();
        spawn_robot(&connector, "10.0.0.5", 9001, "A");
        announcer.announce(&NodeDescriptor::new("A", "10.0.0.5", 9001));

        let by_id = network.connect("A", Duration::from_secs(2), None).unwrap();
        let by_addr = network.connect("10.0.0.5:9001", Duration::from_secs(2), None).unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_addr));
        assert_eq!(network.connections().len(), 1);

        // 反向：先按地址、再按 ID
        by_id.disconnect();
        let by_addr = network.connect("10.0.0.5", Duration::from_secs(2), None).unwrap();
        let by_id = network.connect("A", Duration::from_secs(2), None).unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_addr));
        assert_eq!(by_id.id(), "A");
        assert_eq!(network.connections().len(), 1);
    }

    #[test]
    fn test_node_reached_through_second_address_reuses_connection() {
        let connector = MockConnector::new();
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(connector.clone()))
            .without_discovery()
            .build()
            .unwrap();
        // 同一机器人的两块网卡
        spawn_robot(&connector, "10.0.0.5", 9001, "A");
        spawn_robot(&connector, "192.168.1.5", 9001, "A");

        let first = network.connect("10.0.0.5", Duration::from_secs(2), None).unwrap();
        let second = network.connect("192.168.1.5", Duration::from_secs(2), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.info().address, "10.0.0.5");
        assert_eq!(network.connections().len(), 1);
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let network = Network::builder()
            .config(test_config())
            .connector(Arc::new(MockConnector::new()))
            .without_discovery()
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = network.connect("ghost", Duration::MAX, Some(&token));
        assert!(matches!(result, Err(NetworkError::Cancelled)));
    }
}
