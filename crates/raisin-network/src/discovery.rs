//! 发现注册表
//!
//! 记录通过广播看到的所有节点。每条广播整体替换该节点的描述并刷新最后出现时间；
//! 超过存活窗口的节点不会出现在快照中。
//!
//! # 一致性
//!
//! 广播写入与过期清理都在同一把写锁下完成，快照在读锁下按存活窗口过滤：
//!
//! - 快照不会包含已过期的节点（即使清理尚未运行）
//! - 清理开始后才重新广播的节点，会在清理释放写锁后写入，不会被误删

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::metrics::NetworkMetrics;
use parking_lot::RwLock;
use raisin_protocol::NodeDescriptor;
use raisin_transport::{AnnounceSource, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

struct Entry {
    node: Arc<NodeDescriptor>,
    last_seen: Instant,
}

/// 节点注册表
pub struct DiscoveryRegistry {
    nodes: RwLock<HashMap<String, Entry>>,
    liveness: Duration,
}

impl DiscoveryRegistry {
    pub fn new(liveness: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            liveness,
        }
    }

    pub fn liveness(&self) -> Duration {
        self.liveness
    }

    /// 处理一条广播，返回是否为新出现的节点
    pub fn on_announce(&self, node: NodeDescriptor) -> bool {
        self.on_announce_at(node, Instant::now())
    }

    /// 以指定时刻处理一条广播
    pub fn on_announce_at(&self, node: NodeDescriptor, now: Instant) -> bool {
        let mut nodes = self.nodes.write();
        let id = node.id.clone();
        match nodes.get_mut(&id) {
            Some(entry) => {
                let alive = now.saturating_duration_since(entry.last_seen) <= self.liveness;
                if *entry.node != node {
                    debug!("Node {} re-announced with a new catalog", id);
                    entry.node = Arc::new(node);
                }
                entry.last_seen = entry.last_seen.max(now);
                if !alive {
                    info!("Node {} is back", id);
                }
                !alive
            },
            None => {
                info!(
                    "Discovered node {} at {}:{} ({} publishers, {} services)",
                    id,
                    node.address,
                    node.port,
                    node.publishers.len(),
                    node.services.len()
                );
                nodes.insert(
                    id,
                    Entry {
                        node: Arc::new(node),
                        last_seen: now,
                    },
                );
                true
            },
        }
    }

    /// 当前存活节点的快照（按 id 排序）
    pub fn snapshot(&self) -> Vec<NodeDescriptor> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<NodeDescriptor> {
        let nodes = self.nodes.read();
        let mut alive: Vec<NodeDescriptor> = nodes
            .values()
            .filter(|entry| now.saturating_duration_since(entry.last_seen) <= self.liveness)
            .map(|entry| (*entry.node).clone())
            .collect();
        alive.sort_by(|a, b| a.id.cmp(&b.id));
        alive
    }

    /// 按 id 查找存活节点
    pub fn resolve(&self, id: &str) -> Option<Arc<NodeDescriptor>> {
        let now = Instant::now();
        self.nodes
            .read()
            .get(id)
            .filter(|entry| now.saturating_duration_since(entry.last_seen) <= self.liveness)
            .map(|entry| entry.node.clone())
    }

    /// 删除过期节点，返回删除数量
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|id, entry| {
            let alive = now.saturating_duration_since(entry.last_seen) <= self.liveness;
            if !alive {
                info!("Node {} expired", id);
            }
            alive
        });
        before - nodes.len()
    }

    /// 注册表中的条目数（包括尚未清理的过期节点）
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

/// 发现线程主循环
///
/// 持续读取广播并写入注册表，按 `sweep_interval` 清理过期节点。
/// `stop` 被置位或广播源关闭时退出。
pub fn discovery_loop(
    mut source: Box<dyn AnnounceSource>,
    registry: Arc<DiscoveryRegistry>,
    config: NetworkConfig,
    stop: CancellationToken,
    metrics: Arc<NetworkMetrics>,
) {
    let receive_timeout = config.receive_timeout();
    let sweep_interval = config.sweep_interval();
    let mut last_sweep = Instant::now();

    loop {
        if stop.is_cancelled() {
            trace!("Discovery thread: stop requested, exiting");
            break;
        }

        match source.next_announce(receive_timeout) {
            Ok(node) => {
                metrics.announces_received.fetch_add(1, Ordering::Relaxed);
                trace!("Announce: {}", node.id);
                registry.on_announce(node);
            },
            Err(TransportError::Timeout) => {},
            Err(TransportError::Closed) => {
                info!("Discovery source closed, discovery thread exiting");
                break;
            },
            Err(e) if !e.is_fatal() => {
                warn!("Discovery receive error: {}", e);
            },
            Err(e) => {
                warn!("Discovery source failed: {}, discovery thread exiting", e);
                break;
            },
        }

        if last_sweep.elapsed() >= sweep_interval {
            registry.sweep();
            last_sweep = Instant::now();
        }
    }
}
