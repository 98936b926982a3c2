//! 集成测试公共工具：内存传输 + 模拟机器人

#![allow(dead_code)]

use raisin_client::testing::FakeRobot;
use raisin_network::{Network, NetworkConfig};
use raisin_protocol::NodeDescriptor;
use raisin_transport::mock::{MockAnnouncer, MockConnector, announce_channel};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 测试用配置：短轮询、关闭心跳
pub fn fast_config() -> NetworkConfig {
    NetworkConfig {
        poll_interval_ms: 5,
        receive_timeout_ms: 10,
        sweep_interval_ms: 20,
        heartbeat_interval_ms: 0,
        ..Default::default()
    }
}

pub struct Harness {
    pub connector: MockConnector,
    pub announcer: MockAnnouncer,
    pub network: Arc<Network>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let connector = MockConnector::new();
        let (announcer, source) = announce_channel();
        let network = Network::builder()
            .name("integration")
            .config(config)
            .connector(Arc::new(connector.clone()))
            .announce_source(Box::new(source))
            .build()
            .expect("network should build on the mock transport");
        Self {
            connector,
            announcer,
            network: Arc::new(network),
        }
    }

    /// 启动模拟机器人并广播一次
    pub fn spawn_robot(&self, node: NodeDescriptor) -> FakeRobot {
        let robot = FakeRobot::spawn(&self.connector, node.clone());
        self.announcer.announce(&node);
        robot
    }
}

/// 轮询等待条件成立（最多 2s）
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}
