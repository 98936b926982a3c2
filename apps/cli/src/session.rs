//! 运行上下文：网络运行时、配置与 Ctrl-C 取消令牌

use crate::GlobalArgs;
use anyhow::{Context, Result};
use raisin_sdk::network::deadline_after;
use raisin_sdk::{CancellationToken, ClientConfig, Network, RaisinClient};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Session {
    pub config: ClientConfig,
    pub network: Arc<Network>,
    pub cancel: CancellationToken,
}

impl Session {
    /// 加载配置、应用命令行覆盖并启动网络运行时
    pub fn new(args: &GlobalArgs, cancel: CancellationToken) -> Result<Self> {
        let mut config = crate::config::load(args.config.as_deref())?;
        if !args.interfaces.is_empty() {
            config.network.interfaces = args.interfaces.clone();
        }
        if let Some(timeout) = args.timeout {
            config.connect_timeout_secs = timeout;
        }

        let mut builder = Network::builder()
            .name("raisin_cli")
            .config(config.network.clone());
        if args.no_discovery {
            builder = builder.without_discovery();
        }
        let network = builder.build().context("启动网络失败")?;

        Ok(Self {
            config,
            network: Arc::new(network),
            cancel,
        })
    }

    pub fn client(&self) -> RaisinClient {
        RaisinClient::with_network("raisin_cli", self.network.clone())
            .with_service_timeout(self.config.service_timeout())
    }

    /// 连接机器人
    ///
    /// 返回 `Ok(None)` 表示用户在等待期间按了 Ctrl-C（干净退出）。
    pub fn connect(&self, robot: &str) -> Result<Option<RaisinClient>> {
        println!("Connecting to robot: {}", robot);
        let client = self.client();
        match client.connect(robot, self.config.connect_timeout_secs, Some(&self.cancel)) {
            Ok(()) => {
                println!("Connected.");
                Ok(Some(client))
            },
            Err(e) if e.is_cancelled() => {
                println!("Connection cancelled");
                Ok(None)
            },
            Err(e) => Err(anyhow::Error::new(e).context("Connection failed")),
        }
    }

    /// 可被 Ctrl-C 打断的睡眠，返回是否睡满
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = deadline_after(duration);
        let poll = self.config.network.poll_interval();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(poll.min(remaining));
        }
    }
}
