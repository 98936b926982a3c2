//! 连接
//!
//! 一个 `Connection` 对应与一个远端节点的一次会话：
//!
//! - RX 线程：读取入站帧，话题帧交给 [`SubscriptionCache`]，响应帧交给 [`ServiceInvoker`]，
//!   从不执行应用回调
//! - TX 线程：从有界发送队列取帧写出，空闲时按间隔发送心跳
//!
//! 可变字段（`connected`、目录）都在同一把锁下，监控界面读取前需要 [`Connection::lock`]。
//! 链路断开（对端关闭、发送失败、心跳超时）时 `connected` 置为 `false`，所有等待中的调用以
//! "disconnected" 失败。

use crate::cancel::{CancellationToken, is_cancelled};
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::heartbeat::LinkMonitor;
use crate::invoker::{ServiceInvoker, ServiceReply};
use crate::metrics::NetworkMetrics;
use crate::subscription::{Sample, SubscriptionCache};
use crate::thread::{JOIN_TIMEOUT, JoinTimeout, spawn_named};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use parking_lot::{Mutex, MutexGuard};
use raisin_protocol::{
    CallError, Catalog, Frame, PROTOCOL_VERSION, ProtocolError, ServiceResult, TypeTag,
    decode_payload, encode_payload,
};
use raisin_transport::{
    BoxedRx, BoxedTx, Connector, Endpoint, Session, TransportError, TransportKind,
};
use semver::Version;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 发送队列满时的最长等待
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// 连接状态（受连接锁保护）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    /// 节点 ID（握手后为远端目录中的 ID）
    pub id: String,
    pub address: String,
    pub port: u16,
    pub transport_kind: TransportKind,
    pub connected: bool,
    /// 远端发布的话题 -> 数据类型
    pub publishers: BTreeMap<String, TypeTag>,
    /// 远端提供的服务 -> 数据类型
    pub services: BTreeMap<String, TypeTag>,
}

/// RX / TX 线程与连接句柄共享的上下文
struct Shared {
    state: Mutex<ConnectionState>,
    subscriptions: SubscriptionCache,
    invoker: ServiceInvoker,
    link: LinkMonitor,
    metrics: Arc<NetworkMetrics>,
    config: NetworkConfig,
    /// 线程运行标志
    is_running: AtomicBool,
    /// 链路已丢失（与主动断开区分，决定是否发送 Bye）
    link_lost: AtomicBool,
    /// 握手等待者（收到目录后取走）
    catalog_tx: Mutex<Option<Sender<Catalog>>>,
}

impl Shared {
    /// 处理一帧，返回 `false` 表示对端结束会话
    fn dispatch(&self, frame: Frame) -> bool {
        match frame {
            Frame::Topic { topic, payload } => {
                trace!("RX topic '{}' ({} bytes)", topic, payload.len());
                self.subscriptions.deliver(&topic, &payload);
            },
            Frame::Response {
                correlation_id,
                success,
                message,
                payload,
            } => {
                let result = ServiceResult { success, message };
                self.invoker.resolve(correlation_id, ServiceReply::new(result, payload));
            },
            Frame::Catalog(catalog) => match self.catalog_tx.lock().take() {
                Some(tx) => {
                    let _ = tx.send(catalog);
                },
                None => {
                    // 握手后的目录更新
                    let mut state = self.state.lock();
                    debug!(
                        "Catalog update from {}: {} publishers, {} services",
                        state.id,
                        catalog.publishers.len(),
                        catalog.services.len()
                    );
                    state.publishers = catalog.publishers;
                    state.services = catalog.services;
                },
            },
            Frame::Heartbeat => trace!("RX heartbeat"),
            Frame::Bye => {
                info!("Peer closed the session");
                return false;
            },
            other => trace!("Ignoring inbound {} frame", other.kind()),
        }
        true
    }

    fn on_link_lost(&self, reason: &str) {
        self.link_lost.store(true, Ordering::Release);
        self.is_running.store(false, Ordering::Release);
        let (was_connected, id) = {
            let mut state = self.state.lock();
            (std::mem::replace(&mut state.connected, false), state.id.clone())
        };
        // 握手中断：丢弃发送端，等待者立即收到断开
        self.catalog_tx.lock().take();
        let failed = self.invoker.fail_all();
        if was_connected {
            warn!(
                "Connection to {} lost ({}), {} pending call(s) failed",
                id, reason, failed
            );
        }
    }
}

/// RX 线程主循环
fn rx_loop(mut rx: BoxedRx, shared: Arc<Shared>) {
    let receive_timeout = shared.config.receive_timeout();

    let reason = loop {
        // Acquire: 看到 false 时，主动断开前的写入都已可见
        if !shared.is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            return;
        }

        match rx.receive_timeout(receive_timeout) {
            Ok(frame) => {
                shared.metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                shared.link.register_activity();
                if !shared.dispatch(frame) {
                    break "closed by peer";
                }
            },
            Err(TransportError::Timeout) => {
                if !shared.link.is_alive() {
                    break "link timeout";
                }
            },
            Err(TransportError::Protocol(ProtocolError::FrameTooLarge { len, max })) => {
                error!("RX thread: frame of {} bytes exceeds {} bytes", len, max);
                break "oversized frame";
            },
            Err(TransportError::Protocol(e)) => {
                shared.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("RX thread: dropping malformed frame: {}", e);
            },
            Err(TransportError::Closed) => break "closed by peer",
            Err(e) if !e.is_fatal() => trace!("RX thread: transient error: {}", e),
            Err(e) => {
                error!("RX thread: receive failed: {}", e);
                break "receive error";
            },
        }
    };

    shared.on_link_lost(reason);
}

/// TX 线程主循环
fn tx_loop(mut tx: BoxedTx, outbound: Receiver<Frame>, shared: Arc<Shared>) {
    let poll_interval = shared.config.poll_interval();
    let heartbeat = shared.config.heartbeat_interval();
    let mut last_sent = Instant::now();

    loop {
        if !shared.is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match outbound.recv_timeout(poll_interval) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => match heartbeat {
                Some(interval) if last_sent.elapsed() >= interval => Frame::Heartbeat,
                _ => continue,
            },
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match tx.send(&frame) {
            Ok(()) => {
                shared.metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
                last_sent = Instant::now();
                trace!("TX {}", frame.kind());
            },
            Err(e) if !e.is_fatal() => warn!("TX thread: dropped {} frame: {}", frame.kind(), e),
            Err(e) => {
                error!("TX thread: send failed: {}", e);
                shared.on_link_lost("send error");
                break;
            },
        }
    }

    if !shared.link_lost.load(Ordering::Acquire) {
        let _ = tx.send(&Frame::Bye);
    }
    tx.close();
}

/// 建立连接所需的参数
pub(crate) struct ConnectParams<'a> {
    pub endpoint: Endpoint,
    /// 期望的节点 ID（直连时为地址字符串）
    pub node_id: String,
    pub client_name: &'a str,
    pub connector: Arc<dyn Connector>,
    pub config: &'a NetworkConfig,
    pub metrics: Arc<NetworkMetrics>,
    pub deadline: Instant,
    pub timeout: Duration,
    pub cancel: Option<&'a CancellationToken>,
}

impl ConnectParams<'_> {
    /// 等待通道消息，同时按轮询间隔检查取消与截止时间
    fn wait<T>(&self, rx: &Receiver<T>) -> Result<Result<T, RecvTimeoutError>, NetworkError> {
        let poll = self.config.poll_interval();
        loop {
            if is_cancelled(self.cancel) {
                return Err(NetworkError::Cancelled);
            }
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NetworkError::ConnectionTimeout(self.timeout));
            }
            match rx.recv_timeout(poll.min(remaining)) {
                Ok(value) => return Ok(Ok(value)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(Err(RecvTimeoutError::Disconnected)),
            }
        }
    }
}

/// 与远端节点的连接
pub struct Connection {
    shared: Arc<Shared>,
    outbound: Sender<Frame>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    /// 已向远端请求的话题
    remote_topics: Mutex<HashSet<String>>,
    /// `disconnect()` 已执行
    closed: AtomicBool,
}

impl Connection {
    /// 打开会话并完成目录握手
    pub(crate) fn open(params: ConnectParams<'_>) -> Result<Arc<Self>, NetworkError> {
        let session = open_session(&params)?;
        let transport_kind = session.kind();
        let (rx, tx) = session.split()?;

        let (catalog_tx, catalog_rx) = bounded(1);
        let (outbound_tx, outbound_rx) = bounded(params.config.send_queue_capacity.max(1));
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState {
                id: params.node_id.clone(),
                address: params.endpoint.address.clone(),
                port: params.endpoint.port,
                transport_kind,
                connected: false,
                publishers: BTreeMap::new(),
                services: BTreeMap::new(),
            }),
            subscriptions: SubscriptionCache::new(params.metrics.clone()),
            invoker: ServiceInvoker::new(params.metrics.clone()),
            link: LinkMonitor::new(params.config.link_timeout()),
            metrics: params.metrics.clone(),
            config: params.config.clone(),
            is_running: AtomicBool::new(true),
            link_lost: AtomicBool::new(false),
            catalog_tx: Mutex::new(Some(catalog_tx)),
        });

        let mut threads = Vec::with_capacity(2);
        let rx_shared = shared.clone();
        threads.push(spawn_named(format!("raisin-rx-{}", params.node_id), move || {
            rx_loop(rx, rx_shared)
        })?);
        let tx_shared = shared.clone();
        threads.push(spawn_named(format!("raisin-tx-{}", params.node_id), move || {
            tx_loop(tx, outbound_rx, tx_shared)
        })?);

        let connection = Arc::new(Self {
            shared,
            outbound: outbound_tx,
            threads: Mutex::new(threads),
            remote_topics: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        });

        // 握手失败时由 Drop 回收线程
        let catalog = connection.handshake(&params, &catalog_rx)?;
        {
            let mut state = connection.shared.state.lock();
            if !catalog.node_id.is_empty() {
                if catalog.node_id != params.node_id {
                    debug!("{} identifies itself as {}", params.node_id, catalog.node_id);
                }
                state.id = catalog.node_id;
            }
            state.publishers = catalog.publishers;
            state.services = catalog.services;
            state.connected = true;
            info!(
                "Connected to {} at {} via {} ({} publishers, {} services)",
                state.id,
                params.endpoint,
                transport_kind,
                state.publishers.len(),
                state.services.len()
            );
        }
        Ok(connection)
    }

    fn handshake(
        &self,
        params: &ConnectParams<'_>,
        catalog_rx: &Receiver<Catalog>,
    ) -> Result<Catalog, NetworkError> {
        self.send_frame(Frame::CatalogRequest {
            client: params.client_name.to_string(),
        })?;
        match params.wait(catalog_rx)? {
            Ok(catalog) => {
                check_protocol_version(&catalog.protocol_version)?;
                Ok(catalog)
            },
            Err(_) => Err(NetworkError::Handshake(
                "session closed before the catalog arrived".to_string(),
            )),
        }
    }

    /// 获取连接锁
    ///
    /// 读取 `connected` 与目录时持有此锁，避免读到中间状态。不要长时间持有：
    /// 接收线程在链路断开时也需要它。
    pub fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.shared.state.lock()
    }

    /// 状态快照
    pub fn info(&self) -> ConnectionState {
        self.lock().clone()
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn publishers(&self) -> BTreeMap<String, TypeTag> {
        self.lock().publishers.clone()
    }

    pub fn services(&self) -> BTreeMap<String, TypeTag> {
        self.lock().services.clone()
    }

    /// 距上次收到任何帧的时间
    pub fn time_since_last_frame(&self) -> Duration {
        self.shared.link.time_since_last_activity()
    }

    /// 等待中的服务调用数
    pub fn pending_calls(&self) -> usize {
        self.shared.invoker.pending_count()
    }

    /// 订阅话题（JSON 负载）
    ///
    /// 回调在该话题的分发线程上执行，收到 `&T`。
    pub fn subscribe<T, F>(&self, topic: &str, callback: F) -> Result<(), NetworkError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, decode_payload::<T>, callback)
    }

    /// 使用自定义解码器订阅话题
    pub fn subscribe_with<T, D, F>(&self, topic: &str, decoder: D, callback: F) -> Result<(), NetworkError>
    where
        T: Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, ProtocolError> + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.ensure_connected()?;
        self.check_publisher(topic);
        self.shared.subscriptions.subscribe(topic, decoder, callback)?;
        self.request_topic(topic)
    }

    /// 只缓存话题最新值（不挂回调），之后通过 [`Connection::get_latest`] 读取
    pub fn track<T>(&self, topic: &str) -> Result<(), NetworkError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.ensure_connected()?;
        self.check_publisher(topic);
        self.shared.subscriptions.register(topic, decode_payload::<T>)?;
        self.request_topic(topic)
    }

    /// 取消订阅：移除该话题所有回调并通知远端停止推送；最新值保留到断开
    pub fn unsubscribe(&self, topic: &str) -> Result<(), NetworkError> {
        self.shared.subscriptions.unsubscribe(topic);
        if self.remote_topics.lock().remove(topic) && self.is_connected() {
            self.send_frame(Frame::Unsubscribe {
                topic: topic.to_string(),
            })?;
        }
        Ok(())
    }

    /// 读取话题最新值（不阻塞）
    pub fn get_latest<T: Send + Sync + 'static>(
        &self,
        topic: &str,
    ) -> Result<Option<Arc<T>>, NetworkError> {
        self.shared.subscriptions.get_latest(topic)
    }

    /// 读取话题最新采样（带序号与接收时间）
    pub fn latest_sample(&self, topic: &str) -> Option<Arc<Sample>> {
        self.shared.subscriptions.latest_sample(topic)
    }

    /// 同步服务调用（JSON 请求）
    ///
    /// 永不返回错误：超时、断开、编码失败都体现在 `ServiceReply.result` 中。
    pub fn call<Req: Serialize + ?Sized>(
        &self,
        service: &str,
        request: &Req,
        timeout: Duration,
    ) -> ServiceReply {
        match encode_payload(request) {
            Ok(payload) => self.call_raw(service, payload, timeout),
            Err(e) => CallError::ServiceFailure(format!("failed to encode request: {}", e)).into(),
        }
    }

    /// 同步服务调用（原始负载）
    pub fn call_raw(&self, service: &str, payload: Bytes, timeout: Duration) -> ServiceReply {
        if !self.is_connected() {
            return CallError::Disconnected.into();
        }
        if !self.lock().services.contains_key(service) {
            debug!("Service '{}' is not in the remote catalog, calling anyway", service);
        }
        self.shared
            .invoker
            .call(service, payload, timeout, |frame| self.send_frame(frame))
    }

    /// 断开连接
    ///
    /// 幂等：重复调用没有任何效果。等待中的调用以 "disconnected" 返回。
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (was_connected, id) = {
            let mut state = self.shared.state.lock();
            (std::mem::replace(&mut state.connected, false), state.id.clone())
        };
        // Release: 线程看到 false 时，上面的状态修改已可见
        self.shared.is_running.store(false, Ordering::Release);
        self.shared.invoker.fail_all();
        self.shared.subscriptions.clear();
        self.remote_topics.lock().clear();

        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join_timeout(JOIN_TIMEOUT).is_err() {
                error!(
                    "Connection thread for {} failed to shut down within {:?}",
                    id, JOIN_TIMEOUT
                );
            }
        }

        if was_connected {
            info!("Disconnected from {}", id);
        }
    }

    fn ensure_connected(&self) -> Result<(), NetworkError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(NetworkError::NotConnected)
        }
    }

    fn check_publisher(&self, topic: &str) {
        let state = self.lock();
        if !state.publishers.contains_key(topic) {
            warn!("{} does not advertise topic '{}'", state.id, topic);
        }
    }

    fn request_topic(&self, topic: &str) -> Result<(), NetworkError> {
        if self.remote_topics.lock().insert(topic.to_string()) {
            debug!("Requesting topic '{}'", topic);
            self.send_frame(Frame::Subscribe {
                topic: topic.to_string(),
            })?;
        }
        Ok(())
    }

    fn send_frame(&self, frame: Frame) -> Result<(), NetworkError> {
        if !self.shared.is_running.load(Ordering::Acquire) {
            return Err(NetworkError::Disconnected);
        }
        match self.outbound.send_timeout(frame, SEND_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(frame)) => {
                warn!("Send queue full, dropped {} frame", frame.kind());
                Err(NetworkError::SendQueueFull)
            },
            Err(SendTimeoutError::Disconnected(_)) => Err(NetworkError::ChannelClosed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("state", &*self.lock()).finish()
    }
}

/// 在辅助线程上打开会话，调用方按轮询间隔检查取消与截止时间
fn open_session(params: &ConnectParams<'_>) -> Result<Box<dyn Session>, NetworkError> {
    let (tx, rx) = bounded(1);
    let connector = params.connector.clone();
    let endpoint = params.endpoint.clone();
    let open_timeout = params.deadline.saturating_duration_since(Instant::now());
    debug!("Opening session to {} (timeout {:?})", endpoint, open_timeout);

    // 调用方放弃后辅助线程的发送失败，会话随之被丢弃
    spawn_named(format!("raisin-open-{}", params.node_id), move || {
        let _ = tx.send(connector.open(&endpoint, open_timeout));
    })?;

    match params.wait(&rx)? {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(TransportError::Io(e))) if e.kind() == std::io::ErrorKind::TimedOut => {
            Err(NetworkError::ConnectionTimeout(params.timeout))
        },
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(NetworkError::Transport(TransportError::Closed)),
    }
}

/// 握手时的协议版本检查：主版本号必须一致
pub fn check_protocol_version(remote: &str) -> Result<(), NetworkError> {
    let local = Version::parse(PROTOCOL_VERSION)
        .map_err(|e| NetworkError::Handshake(format!("invalid local protocol version: {}", e)))?;
    let remote_version = Version::parse(remote).map_err(|e| {
        NetworkError::Handshake(format!("invalid remote protocol version '{}': {}", remote, e))
    })?;
    if remote_version.major != local.major {
        return Err(NetworkError::Handshake(format!(
            "incompatible protocol version {} (client speaks {})",
            remote_version, local
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use raisin_protocol::{ExtendedRobotState, NodeDescriptor, ROBOT_STATE_TOPIC, ROBOT_STATE_TYPE};
    use raisin_transport::mock::{MockConnector, MockPeer};

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            poll_interval_ms: 5,
            receive_timeout_ms: 10,
            heartbeat_interval_ms: 0,
            ..Default::default()
        }
    }

    fn params<'a>(
        connector: &MockConnector,
        config: &'a NetworkConfig,
        timeout: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> ConnectParams<'a> {
        ConnectParams {
            endpoint: Endpoint::new("10.0.0.5", 9001),
            node_id: "A".to_string(),
            client_name: "test",
            connector: Arc::new(connector.clone()),
            config,
            metrics: Arc::new(NetworkMetrics::new()),
            deadline: Instant::now() + timeout,
            timeout,
            cancel,
        }
    }

    /// 在后台接受会话并回复目录
    fn serve_catalog(connector: &MockConnector, version: &str) -> Receiver<MockPeer> {
        let accept = connector.listen("10.0.0.5", 9001);
        let (peer_tx, peer_rx) = bounded(1);
        let version = version.to_string();
        std::thread::spawn(move || {
            let peer = accept.recv_timeout(Duration::from_secs(2)).unwrap();
            let request = peer
                .recv_matching(Duration::from_secs(2), |f| {
                    matches!(f, Frame::CatalogRequest { .. })
                })
                .unwrap();
            assert!(matches!(request, Frame::CatalogRequest { client } if client == "test"));

            let node = NodeDescriptor::new("A", "10.0.0.5", 9001)
                .with_publisher(ROBOT_STATE_TOPIC, ROBOT_STATE_TYPE);
            let mut catalog = Catalog::from_descriptor(&node);
            catalog.protocol_version = version;
            peer.send(Frame::Catalog(catalog)).unwrap();
            let _ = peer_tx.send(peer);
        });
        peer_rx
    }

    #[test]
    fn test_version_check() {
        assert!(check_protocol_version("1.4.2").is_ok());
        assert!(matches!(
            check_protocol_version("2.0.0"),
            Err(NetworkError::Handshake(_))
        ));
        assert!(matches!(
            check_protocol_version("banana"),
            Err(NetworkError::Handshake(_))
        ));
    }

    #[test]
    fn test_open_populates_catalog() {
        let connector = MockConnector::new();
        let config = test_config();
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);

        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        let _peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        let state = conn.lock();
        assert!(state.connected);
        assert_eq!(state.id, "A");
        assert_eq!(state.address, "10.0.0.5");
        assert_eq!(state.port, 9001);
        assert_eq!(state.transport_kind, TransportKind::Stream);
        assert_eq!(
            state.publishers.get(ROBOT_STATE_TOPIC).map(TypeTag::as_str),
            Some(ROBOT_STATE_TYPE)
        );
    }

    #[test]
    fn test_incompatible_version_is_handshake_error() {
        let connector = MockConnector::new();
        let config = test_config();
        let _peers = serve_catalog(&connector, "2.0.0");

        let result = Connection::open(params(&connector, &config, Duration::from_secs(2), None));
        assert!(matches!(result, Err(NetworkError::Handshake(_))));
    }

    #[test]
    fn test_silent_peer_times_out() {
        let connector = MockConnector::new();
        let config = test_config();
        let _accept = connector.listen("10.0.0.5", 9001);

        let start = Instant::now();
        let result = Connection::open(params(&connector, &config, Duration::from_millis(200), None));
        assert!(matches!(result, Err(NetworkError::ConnectionTimeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_cancel_during_handshake() {
        let connector = MockConnector::new();
        let config = test_config();
        let _accept = connector.listen("10.0.0.5", 9001);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };

        let start = Instant::now();
        let result =
            Connection::open(params(&connector, &config, Duration::from_secs(10), Some(&token)));
        assert!(matches!(result, Err(NetworkError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
        canceller.join().unwrap();
    }

    #[test]
    fn test_peer_drop_marks_disconnected_and_fails_calls() {
        let connector = MockConnector::new();
        let config = test_config();
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);
        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        let peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        let caller = {
            let conn = conn.clone();
            std::thread::spawn(move || conn.call("stand_up", &(), Duration::from_secs(10)))
        };
        peer.recv_matching(Duration::from_secs(2), |f| matches!(f, Frame::Request { .. }))
            .unwrap();
        peer.drop_link();

        let reply = caller.join().unwrap();
        assert_eq!(reply.result, ServiceResult::disconnected());
        assert!(!conn.is_connected());

        // 断开后的调用立即失败
        let reply = conn.call("stand_up", &(), Duration::from_secs(10));
        assert!(reply.result.is_disconnected());

        conn.disconnect();
        conn.disconnect();
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_silent_link_is_declared_lost() {
        let connector = MockConnector::new();
        let config = NetworkConfig {
            link_timeout_ms: 100,
            ..test_config()
        };
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);
        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        // 对端保持会话但此后不再发送任何帧
        let _peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        let caller = {
            let conn = conn.clone();
            std::thread::spawn(move || conn.call("stand_up", &(), Duration::from_secs(10)))
        };

        let start = Instant::now();
        let reply = caller.join().unwrap();
        assert_eq!(reply.result, ServiceResult::disconnected());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!conn.is_connected());
        assert!(conn.time_since_last_frame() >= Duration::from_millis(100));
    }

    #[test]
    fn test_idle_link_sends_heartbeats() {
        let connector = MockConnector::new();
        let config = NetworkConfig {
            heartbeat_interval_ms: 20,
            ..test_config()
        };
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);
        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        let peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        for _ in 0..2 {
            let frame = peer.recv_matching(Duration::from_secs(1), |f| matches!(f, Frame::Heartbeat));
            assert_eq!(frame.unwrap(), Frame::Heartbeat);
        }
        assert!(conn.is_connected());
    }

    #[test]
    fn test_subscribe_sends_request_once_and_caches() {
        let connector = MockConnector::new();
        let config = test_config();
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);
        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        let peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        conn.subscribe(ROBOT_STATE_TOPIC, |_: &ExtendedRobotState| {}).unwrap();
        conn.track::<ExtendedRobotState>(ROBOT_STATE_TOPIC).unwrap();
        let frame = peer
            .recv_matching(Duration::from_secs(1), |f| matches!(f, Frame::Subscribe { .. }))
            .unwrap();
        assert_eq!(
            frame,
            Frame::Subscribe {
                topic: ROBOT_STATE_TOPIC.to_string()
            }
        );
        assert!(
            peer.recv_matching(Duration::from_millis(100), |f| matches!(f, Frame::Subscribe { .. }))
                .is_err()
        );

        let state = ExtendedRobotState {
            voltage: 48.5,
            ..Default::default()
        };
        peer.send(Frame::topic(ROBOT_STATE_TOPIC, &state).unwrap()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while conn.latest_sample(ROBOT_STATE_TOPIC).is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let latest = conn.get_latest::<ExtendedRobotState>(ROBOT_STATE_TOPIC).unwrap().unwrap();
        assert_eq!(latest.voltage, 48.5);

        conn.unsubscribe(ROBOT_STATE_TOPIC).unwrap();
        let frame = peer
            .recv_matching(Duration::from_secs(1), |f| matches!(f, Frame::Unsubscribe { .. }))
            .unwrap();
        assert!(matches!(frame, Frame::Unsubscribe { topic } if topic == ROBOT_STATE_TOPIC));
        assert!(conn.get_latest::<ExtendedRobotState>(ROBOT_STATE_TOPIC).unwrap().is_some());
    }

    #[test]
    fn test_disconnect_says_bye() {
        let connector = MockConnector::new();
        let config = test_config();
        let peers = serve_catalog(&connector, PROTOCOL_VERSION);
        let conn = Connection::open(params(&connector, &config, Duration::from_secs(2), None)).unwrap();
        let peer = peers.recv_timeout(Duration::from_secs(2)).unwrap();

        conn.disconnect();
        let frame = peer.recv_matching(Duration::from_secs(1), |f| matches!(f, Frame::Bye));
        assert_eq!(frame.unwrap(), Frame::Bye);
        assert!(peer.is_client_gone());
    }
}
