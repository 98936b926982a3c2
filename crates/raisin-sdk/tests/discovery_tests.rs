//! 发现与连接的端到端测试
//!
//! 模拟机器人在内存传输上广播自己，客户端按节点 ID 发现并连接。

mod common;

use common::{Harness, fast_config, wait_until};
use raisin_network::{CancellationToken, NetworkConfig, NetworkError};
use raisin_protocol::*;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 广播节点 A 后：快照只有 A；连接、订阅 robot_state 并读到 locomotion_state = 8
#[test]
fn test_announce_connect_subscribe_scenario() {
    let harness = Harness::new();
    let node = NodeDescriptor::new("A", "10.0.0.5", 9001)
        .with_publisher(ROBOT_STATE_TOPIC, ROBOT_STATE_TYPE);
    let robot = harness.spawn_robot(node);

    wait_until("node A discovered", || !harness.network.get_all_connections().is_empty());
    let nodes = harness.network.get_all_connections();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, "A");
    assert_eq!(nodes[0].address, "10.0.0.5");
    assert_eq!(nodes[0].port, 9001);

    let connection = harness
        .network
        .connect("A", Duration::from_secs(5), None)
        .unwrap();
    assert!(connection.lock().connected);
    assert!(connection.lock().publishers.contains_key(ROBOT_STATE_TOPIC));

    connection
        .subscribe(ROBOT_STATE_TOPIC, |_: &ExtendedRobotState| {})
        .unwrap();
    robot.update_state(|state| state.locomotion_state = LocomotionState::from(8u8));

    wait_until("robot_state frame", || {
        connection
            .get_latest::<ExtendedRobotState>(ROBOT_STATE_TOPIC)
            .unwrap()
            .is_some()
    });
    let latest = connection
        .get_latest::<ExtendedRobotState>(ROBOT_STATE_TOPIC)
        .unwrap()
        .unwrap();
    assert_eq!(latest.locomotion_state.code(), 8);
}

#[test]
fn test_no_nodes_is_an_empty_snapshot() {
    let harness = Harness::new();
    assert!(harness.network.get_all_connections().is_empty());
}

#[test]
fn test_silent_node_expires_from_snapshot() {
    let harness = Harness::with_config(NetworkConfig {
        liveness_window_ms: 100,
        ..fast_config()
    });
    harness
        .announcer
        .announce(&NodeDescriptor::new("B", "10.0.0.6", 9001));
    wait_until("node B discovered", || harness.network.get_all_connections().len() == 1);

    std::thread::sleep(Duration::from_millis(200));
    assert!(harness.network.get_all_connections().is_empty());

    // 再次广播后重新出现
    harness
        .announcer
        .announce(&NodeDescriptor::new("B", "10.0.0.6", 9002));
    wait_until("node B re-announced", || harness.network.get_all_connections().len() == 1);
    assert_eq!(harness.network.get_all_connections()[0].port, 9002);
}

/// 并发广播与读取：快照中的节点始终来自广播集合，且每个 ID 最多出现一次
#[test]
fn test_concurrent_announce_and_snapshot() {
    let harness = Arc::new(Harness::new());
    let ids: Vec<String> = (0..8).map(|i| format!("robot_{}", i)).collect();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let harness = harness.clone();
            let ids = ids.clone();
            std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..200 {
                    let id = &ids[rng.gen_range(0..ids.len())];
                    let port = rng.gen_range(9000..9100);
                    harness
                        .announcer
                        .announce(&NodeDescriptor::new(id.clone(), "10.0.0.9", port));
                }
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        let snapshot = harness.network.get_all_connections();
        let mut seen = std::collections::HashSet::new();
        for node in &snapshot {
            assert!(ids.contains(&node.id));
            assert!(seen.insert(node.id.clone()), "duplicate {}", node.id);
        }
    }
    for writer in writers {
        writer.join().unwrap();
    }
}

#[test]
fn test_connect_unknown_node_times_out() {
    let harness = Harness::new();
    let start = Instant::now();
    let result = harness
        .network
        .connect("nobody", Duration::from_millis(200), None);
    assert!(matches!(result, Err(NetworkError::ConnectionTimeout(_))));
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_connect_cancelled_promptly() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };

    let start = Instant::now();
    let result = harness
        .network
        .connect("nobody", Duration::from_secs(10), Some(&token));
    assert!(matches!(result, Err(NetworkError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(1));
    canceller.join().unwrap();
}

#[test]
fn test_second_connect_reuses_live_connection() {
    let harness = Harness::new();
    let _robot = harness.spawn_robot(NodeDescriptor::new("A", "10.0.0.5", 9001));

    let first = harness
        .network
        .connect("A", Duration::from_secs(2), None)
        .unwrap();
    let second = harness
        .network
        .connect("A", Duration::from_secs(2), None)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.disconnect();
    let third = harness
        .network
        .connect("A", Duration::from_secs(2), None)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(third.is_connected());
}
