//! UDP 组播发现
//!
//! 节点周期性地向组播组发送 `Frame::Announce`（一个数据报一帧，JSON 编码）。
//! 监听端在每个配置的网卡上加入组播组。

use crate::{AnnounceSource, Frame, NodeDescriptor, TransportError};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 默认发现组播组
pub const DEFAULT_DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);
/// 默认发现端口
pub const DEFAULT_DISCOVERY_PORT: u16 = 42420;

const MAX_DATAGRAM: usize = 64 * 1024;

/// 将网卡名解析为 IPv4 地址
///
/// - 合法的 IPv4 字面量直接返回
/// - `"lo"` / `"lo0"` 在任何平台上都映射到 127.0.0.1
/// - Linux 上其余名称通过 `getifaddrs` 查询
pub fn resolve_interface(name: &str) -> Result<Ipv4Addr, TransportError> {
    if let Ok(addr) = name.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    if name == "lo" || name == "lo0" {
        return Ok(Ipv4Addr::LOCALHOST);
    }
    resolve_interface_os(name)
}

#[cfg(target_os = "linux")]
fn resolve_interface_os(name: &str) -> Result<Ipv4Addr, TransportError> {
    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| TransportError::Interface(format!("getifaddrs failed: {}", e)))?;
    addrs
        .filter(|ifa| ifa.interface_name == name)
        .filter_map(|ifa| {
            ifa.address
                .as_ref()
                .and_then(|a| a.as_sockaddr_in())
                .map(|sin| Ipv4Addr::from(sin.ip()))
        })
        .next()
        .ok_or_else(|| TransportError::Interface(format!("no IPv4 address on '{}'", name)))
}

#[cfg(not(target_os = "linux"))]
fn resolve_interface_os(name: &str) -> Result<Ipv4Addr, TransportError> {
    Err(TransportError::Interface(format!(
        "cannot resolve interface '{}' on this platform, use an IPv4 address",
        name
    )))
}

/// UDP 发现广播监听端
pub struct UdpAnnounceSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpAnnounceSource {
    /// 绑定发现端口，并在每个网卡上加入组播组
    ///
    /// 单个网卡加入失败只记录警告；没有配置网卡时在默认网卡上加入。
    pub fn bind(interfaces: &[String], group: Ipv4Addr, port: u16) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_multicast_loop_v4(true)?;

        if interfaces.is_empty()
            && let Err(e) = socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        {
            warn!("Failed to join {} on default interface: {}", group, e);
        }
        for name in interfaces {
            match resolve_interface(name) {
                Ok(addr) => match socket.join_multicast_v4(&group, &addr) {
                    Ok(()) => debug!("Joined discovery group {} on {} ({})", group, name, addr),
                    Err(e) => warn!("Failed to join {} on {}: {}", group, name, e),
                },
                Err(e) => warn!("Skipping discovery interface {}: {}", name, e),
            }
        }

        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// 实际绑定的本地地址
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

impl AnnounceSource for UdpAnnounceSource {
    fn next_announce(&mut self, timeout: Duration) -> Result<NodeDescriptor, TransportError> {
        let start = Instant::now();
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            self.socket.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            let (len, from) = match self.socket.recv_from(&mut self.buf) {
                Ok(r) => r,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout);
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            match Frame::from_bytes(&self.buf[..len]) {
                Ok(Frame::Announce(mut node)) => {
                    // 节点未填写地址时使用数据报源地址
                    if node.address.is_empty() {
                        node.address = from.ip().to_string();
                    }
                    trace!("Announce from {}: {}", from, node.id);
                    return Ok(node);
                },
                Ok(other) => trace!("Ignoring {} datagram from {}", other.kind(), from),
                Err(e) => warn!("Malformed discovery datagram from {}: {}", from, e),
            }
        }
    }
}

/// UDP 发现广播发送端（机器人端 / 模拟器使用）
pub struct UdpAnnouncer {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpAnnouncer {
    /// 向默认组播组发送
    pub fn new() -> Result<Self, TransportError> {
        Self::with_target(SocketAddr::new(
            IpAddr::V4(DEFAULT_DISCOVERY_GROUP),
            DEFAULT_DISCOVERY_PORT,
        ))
    }

    /// 向指定地址发送（组播组或单播地址）
    pub fn with_target(target: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_multicast_loop_v4(true)?;
        Ok(Self { socket, target })
    }

    pub fn announce(&self, node: &NodeDescriptor) -> Result<(), TransportError> {
        let bytes = Frame::Announce(node.clone()).to_bytes()?;
        self.socket.send_to(&bytes, self.target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal_and_loopback() {
        assert_eq!(resolve_interface("10.42.0.1").unwrap(), Ipv4Addr::new(10, 42, 0, 1));
        assert_eq!(resolve_interface("lo").unwrap(), Ipv4Addr::LOCALHOST);
        assert!(resolve_interface("definitely-not-an-interface0").is_err());
    }

    #[test]
    fn test_unicast_announce_roundtrip() {
        // 端口 0：由系统分配，避免与真实发现端口冲突
        let mut source =
            UdpAnnounceSource::bind(&["lo".to_string()], DEFAULT_DISCOVERY_GROUP, 0).unwrap();
        let port = source.local_addr().unwrap().port();
        let announcer =
            UdpAnnouncer::with_target(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
                .unwrap();

        let node = NodeDescriptor::new("A", "", 9001).with_publisher("robot_state", "RobotState");
        announcer.announce(&node).unwrap();

        let received = source.next_announce(Duration::from_secs(2)).unwrap();
        assert_eq!(received.id, "A");
        assert_eq!(received.address, "127.0.0.1");
        assert_eq!(received.port, 9001);
    }

    #[test]
    fn test_idle_source_times_out() {
        let mut source = UdpAnnounceSource::bind(&[], DEFAULT_DISCOVERY_GROUP, 0).unwrap();
        let result = source.next_announce(Duration::from_millis(20));
        assert!(matches!(result, Err(TransportError::Timeout)));
    }
}
