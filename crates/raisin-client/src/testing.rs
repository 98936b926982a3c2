//! 测试用的模拟机器人（`mock` feature）
//!
//! 在 [`MockConnector`] 上监听一个端点，扮演机器人一侧：回复目录、记录订阅、
//! 按服务名执行简化的状态迁移，并把状态变化推送到 robot_state 话题。

use parking_lot::Mutex;
use raisin_protocol::*;
use raisin_transport::TransportError;
use raisin_transport::mock::{MockConnector, MockPeer};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

const POLL: Duration = Duration::from_millis(5);

/// 机器人端的简化状态
#[derive(Debug, Clone, Default)]
pub struct RobotSim {
    pub state: ExtendedRobotState,
    pub loaded_map: Option<String>,
    pub route: Vec<Waypoint>,
    pub laps: u32,
    pub mission: MissionStatus,
    pub waypoint_files: Vec<String>,
    /// 收到的服务调用（按顺序）
    pub calls: Vec<String>,
}

struct Shared {
    node: NodeDescriptor,
    sim: Mutex<RobotSim>,
    peer: Mutex<Option<Arc<MockPeer>>>,
    subscribed: Mutex<HashSet<String>>,
    silent: AtomicBool,
    stop: AtomicBool,
}

/// 模拟机器人
pub struct FakeRobot {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl FakeRobot {
    /// 在 `node.address:node.port` 上启动模拟机器人（初始为坐下状态）
    pub fn spawn(connector: &MockConnector, node: NodeDescriptor) -> Self {
        let accept = connector.listen(node.address.clone(), node.port);
        let sim = RobotSim {
            state: ExtendedRobotState {
                locomotion_state: LocomotionState::SitDown,
                voltage: 50.4,
                min_voltage: 42.0,
                max_voltage: 54.6,
                ..Default::default()
            },
            waypoint_files: vec!["lobby_loop".to_string(), "office_round".to_string()],
            ..Default::default()
        };
        let shared = Arc::new(Shared {
            node,
            sim: Mutex::new(sim),
            peer: Mutex::new(None),
            subscribed: Mutex::new(HashSet::new()),
            silent: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        let thread = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                while !shared.stop.load(Ordering::Acquire) {
                    let current = shared.peer.lock().clone();
                    match current {
                        None => {
                            if let Ok(peer) = accept.recv_timeout(POLL) {
                                debug!("FakeRobot '{}': session opened", shared.node.id);
                                shared.subscribed.lock().clear();
                                *shared.peer.lock() = Some(Arc::new(peer));
                            }
                        },
                        Some(peer) => match peer.recv_timeout(POLL) {
                            Ok(frame) => shared.handle(&peer, frame),
                            Err(TransportError::Timeout) => {},
                            Err(_) => {
                                *shared.peer.lock() = None;
                            },
                        },
                    }
                }
            })
        };

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// 默认节点：`robot_a` @ 10.0.0.5:9001，带全部话题与服务
    pub fn default_node() -> NodeDescriptor {
        full_catalog(NodeDescriptor::new("robot_a", "10.0.0.5", 9001))
    }

    pub fn node(&self) -> &NodeDescriptor {
        &self.shared.node
    }

    /// 不再回复任何服务调用（用于超时测试）
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::Release);
    }

    pub fn sim(&self) -> RobotSim {
        self.shared.sim.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.sim.lock().calls.clone()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.shared.subscribed.lock().contains(topic)
    }

    pub fn has_session(&self) -> bool {
        self.shared.peer.lock().is_some()
    }

    /// 修改状态并推送一帧 robot_state
    pub fn update_state(&self, f: impl FnOnce(&mut ExtendedRobotState)) {
        let state = {
            let mut sim = self.shared.sim.lock();
            f(&mut sim.state);
            sim.state.clone()
        };
        self.shared.publish(ROBOT_STATE_TOPIC, &state);
    }

    /// 向已订阅的客户端推送任意话题
    pub fn publish<T: Serialize>(&self, topic: &str, value: &T) -> bool {
        self.shared.publish(topic, value)
    }

    /// 模拟链路断开
    pub fn drop_link(&self) {
        if let Some(peer) = self.shared.peer.lock().take() {
            peer.drop_link();
        }
    }
}

impl Drop for FakeRobot {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.drop_link();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Shared {
    fn handle(&self, peer: &MockPeer, frame: Frame) {
        trace!("FakeRobot '{}' <- {}", self.node.id, frame.kind());
        match frame {
            Frame::CatalogRequest { .. } => {
                let _ = peer.send(Frame::Catalog(Catalog::from_descriptor(&self.node)));
            },
            Frame::Subscribe { topic } => {
                self.subscribed.lock().insert(topic.clone());
                // 新订阅者立即收到当前状态
                if topic == ROBOT_STATE_TOPIC {
                    let state = self.sim.lock().state.clone();
                    self.publish(ROBOT_STATE_TOPIC, &state);
                }
            },
            Frame::Unsubscribe { topic } => {
                self.subscribed.lock().remove(&topic);
            },
            Frame::Request {
                correlation_id,
                service,
                payload,
            } => {
                self.sim.lock().calls.push(service.clone());
                if self.silent.load(Ordering::Acquire) {
                    return;
                }
                let (result, body, state_changed) = self.execute(&service, &payload);
                let _ = peer.send(Frame::Response {
                    correlation_id,
                    success: result.success,
                    message: result.message,
                    payload: body,
                });
                if state_changed {
                    let state = self.sim.lock().state.clone();
                    self.publish(ROBOT_STATE_TOPIC, &state);
                }
            },
            Frame::Bye => {
                self.peer.lock().take();
            },
            _ => {},
        }
    }

    fn publish<T: Serialize>(&self, topic: &str, value: &T) -> bool {
        if !self.subscribed.lock().contains(topic) {
            return false;
        }
        let Some(peer) = self.peer.lock().clone() else {
            return false;
        };
        match Frame::topic(topic, value) {
            Ok(frame) => peer.send(frame).is_ok(),
            Err(_) => false,
        }
    }

    /// 执行服务：返回 (结果, 响应负载, 状态是否变化)
    fn execute(&self, service: &str, payload: &[u8]) -> (ServiceResult, bytes::Bytes, bool) {
        let mut sim = self.sim.lock();
        let empty = bytes::Bytes::new();
        match service {
            STAND_UP_SERVICE => {
                sim.state.locomotion_state = LocomotionState::Standing;
                (ServiceResult::ok("standing up"), empty, true)
            },
            SIT_DOWN_SERVICE => {
                sim.state.locomotion_state = LocomotionState::SitDown;
                sim.state.control_source = ControlSource::None;
                (ServiceResult::ok("sitting down"), empty, true)
            },
            SET_MANUAL_CONTROL_SERVICE | SET_AUTONOMOUS_CONTROL_SERVICE => {
                if !sim.state.locomotion_state.is_operational() {
                    return (ServiceResult::failure("robot is not standing"), empty, false);
                }
                sim.state.locomotion_state = LocomotionState::InControl;
                sim.state.control_source = if service == SET_MANUAL_CONTROL_SERVICE {
                    ControlSource::Manual
                } else {
                    ControlSource::Autonomous
                };
                (ServiceResult::ok("control granted"), empty, true)
            },
            RELEASE_CONTROL_SERVICE => {
                let Ok(request) = decode_payload::<NameRequest>(payload) else {
                    return (ServiceResult::failure("bad request"), empty, false);
                };
                if sim.state.control_source.source_id() == request.name {
                    sim.state.control_source = ControlSource::None;
                    sim.state.locomotion_state = LocomotionState::Standing;
                    (ServiceResult::ok("control released"), empty, true)
                } else {
                    (ServiceResult::ok("source not active"), empty, false)
                }
            },
            SET_MAP_SERVICE => match decode_payload::<NameRequest>(payload) {
                Ok(request) => {
                    sim.loaded_map = Some(request.name);
                    (ServiceResult::ok("map loaded"), empty, false)
                },
                Err(_) => (ServiceResult::failure("bad request"), empty, false),
            },
            SET_WAYPOINTS_SERVICE => {
                let Ok(request) = decode_payload::<SetWaypointsRequest>(payload) else {
                    return (ServiceResult::failure("bad request"), empty, false);
                };
                let map = sim.loaded_map.clone().unwrap_or_default();
                if let Some(bad) = request.waypoints.iter().find(|wp| wp.map_frame != map) {
                    let error = CallError::InvalidFrame {
                        expected: map,
                        found: bad.map_frame.clone(),
                    };
                    return (error.into(), empty, false);
                }
                sim.route = request.waypoints;
                sim.laps = request.laps;
                sim.mission = MissionStatus {
                    valid: !sim.route.is_empty(),
                    current_index: 0,
                };
                (ServiceResult::ok("route accepted"), empty, false)
            },
            RESUME_PATROL_SERVICE => {
                if sim.route.is_empty() {
                    return (ServiceResult::failure("no route loaded"), empty, false);
                }
                let index = sim.mission.current_index;
                let body = encode_payload(&ResumePatrolResponse { index }).unwrap_or_default();
                (ServiceResult::ok("patrol resumed"), body, false)
            },
            LIST_WAYPOINTS_FILES_SERVICE => {
                let body = encode_payload(&WaypointsFilesResponse {
                    files: sim.waypoint_files.clone(),
                })
                .unwrap_or_default();
                (ServiceResult::ok(""), body, false)
            },
            LOAD_WAYPOINTS_FILE_SERVICE => match decode_payload::<NameRequest>(payload) {
                Ok(request) if sim.waypoint_files.contains(&request.name) => {
                    sim.route = vec![Waypoint::new(
                        sim.loaded_map.clone().unwrap_or_default(),
                        0.0,
                        0.0,
                    )];
                    sim.mission = MissionStatus {
                        valid: true,
                        current_index: 0,
                    };
                    (ServiceResult::ok("route loaded"), empty, false)
                },
                Ok(request) => (
                    ServiceResult::failure(format!("no such file: {}", request.name)),
                    empty,
                    false,
                ),
                Err(_) => (ServiceResult::failure("bad request"), empty, false),
            },
            GET_MISSION_STATUS_SERVICE => {
                let body = encode_payload(&sim.mission).unwrap_or_default();
                (ServiceResult::ok(""), body, false)
            },
            other => (
                ServiceResult::failure(format!("unknown service: {}", other)),
                empty,
                false,
            ),
        }
    }
}

/// 给节点加上完整的话题与服务目录
pub fn full_catalog(node: NodeDescriptor) -> NodeDescriptor {
    node.with_publisher(ROBOT_STATE_TOPIC, ROBOT_STATE_TYPE)
        .with_publisher(ODOMETRY_TOPIC, ODOMETRY_TYPE)
        .with_publisher(POINT_CLOUD_TOPIC, POINT_CLOUD_TYPE)
        .with_service(STAND_UP_SERVICE, TRIGGER_TYPE)
        .with_service(SIT_DOWN_SERVICE, TRIGGER_TYPE)
        .with_service(SET_MANUAL_CONTROL_SERVICE, TRIGGER_TYPE)
        .with_service(SET_AUTONOMOUS_CONTROL_SERVICE, TRIGGER_TYPE)
        .with_service(RELEASE_CONTROL_SERVICE, STRING_REQUEST_TYPE)
        .with_service(SET_MAP_SERVICE, STRING_REQUEST_TYPE)
        .with_service(SET_WAYPOINTS_SERVICE, SET_WAYPOINTS_TYPE)
        .with_service(RESUME_PATROL_SERVICE, RESUME_PATROL_TYPE)
        .with_service(LIST_WAYPOINTS_FILES_SERVICE, LIST_FILES_TYPE)
        .with_service(LOAD_WAYPOINTS_FILE_SERVICE, STRING_REQUEST_TYPE)
        .with_service(GET_MISSION_STATUS_SERVICE, MISSION_STATUS_TYPE)
}
