//! 终端输出格式

use raisin_sdk::protocol::TypeTag;
use raisin_sdk::{ConnectionState, ExtendedRobotState, NodeDescriptor, ServiceResult};
use std::collections::BTreeMap;
use std::fmt::Write;

/// 已发现节点表
pub fn node_table(nodes: &[NodeDescriptor]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<10}{:<16}{:<8}{:<30}", "Type", "IP", "Port", "ID");
    let _ = writeln!(out, "{}", "-".repeat(64));
    if nodes.is_empty() {
        let _ = writeln!(out, "  No connections discovered yet.");
    }
    for node in nodes {
        let _ = writeln!(
            out,
            "{:<10}{:<16}{:<8}{:<30}",
            "Server", node.address, node.port, node.id
        );
    }
    out
}

/// 连接详情：地址、传输类型、服务与话题目录
pub fn connection_details(state: &ConnectionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Connection: {} ===", state.id);
    let _ = writeln!(out, "  IP:   {}:{}", state.address, state.port);
    let _ = writeln!(out, "  Type: {}", state.transport_kind);
    catalog_section(&mut out, "Services", &state.services);
    catalog_section(&mut out, "Publishers", &state.publishers);
    out
}

fn catalog_section(out: &mut String, title: &str, entries: &BTreeMap<String, TypeTag>) {
    let _ = writeln!(out, "\n--- {} ---", title);
    let _ = writeln!(out, "{:<30}Type", "Name");
    let _ = writeln!(out, "{}", "-".repeat(80));
    if entries.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (name, tag) in entries {
        let _ = writeln!(out, "{:<30}{}", name, tag);
    }
}

/// 单行状态（运动状态 / 是否可运动 / 控制源）
pub fn state_line(state: &ExtendedRobotState) -> String {
    format!(
        "State: {} ({}) | Operational: {} | Control: {}",
        state.locomotion_state_name(),
        state.locomotion_state.code(),
        if state.is_operational() { "Yes" } else { "No" },
        state.control_source_name()
    )
}

/// 单行电池状态
pub fn battery_line(state: &ExtendedRobotState) -> String {
    let percentage = state
        .battery_percentage()
        .map(|p| format!("{:.1}%", p))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Voltage: {:.1}V ({}) | Current: {:.1}A | Temp: {:.1}C",
        state.voltage, percentage, state.current, state.body_temperature
    )
}

/// 执行器状态表（错误状态标红）
pub fn actuator_table(state: &ExtendedRobotState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Actuator Status ===");
    let _ = writeln!(
        out,
        "{:<12}{:<14}{:<10}{:<12}{:<12}{:<12}",
        "Name", "Status", "Temp(C)", "Pos(rad)", "Vel(rad/s)", "Effort(Nm)"
    );
    let _ = writeln!(out, "{}", "-".repeat(72));
    for actuator in &state.actuators {
        let status = format!("{:<14}", actuator.status.name());
        let status = if actuator.status.is_error() {
            format!("\x1b[31m{}\x1b[0m", status)
        } else {
            status
        };
        let _ = writeln!(
            out,
            "{:<12}{}{:<10.1}{:<12.3}{:<12.3}{:<12.3}",
            actuator.name,
            status,
            actuator.temperature,
            actuator.position,
            actuator.velocity,
            actuator.effort
        );
    }
    let _ = writeln!(out, "{}", "-".repeat(72));

    let errors = state.actuators_with_errors();
    if !errors.is_empty() {
        let _ = writeln!(out, "\x1b[31mWARNING: Actuator errors detected:\x1b[0m");
        for error in errors {
            let _ = writeln!(out, "  - {}", error);
        }
    } else if state.all_actuators_operational() {
        let _ = writeln!(out, "\x1b[32mAll actuators OPERATIONAL (running)\x1b[0m");
    } else {
        let _ = writeln!(out, "All actuators OK (standby/ready)");
    }
    out
}

/// 命令结果
pub fn result_line(result: &ServiceResult) -> String {
    format!(
        "{}: {}",
        if result.success { "OK" } else { "FAIL" },
        result.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use raisin_sdk::protocol::{ActuatorState, ActuatorStatus, ControlSource, LocomotionState};

    fn sample_state() -> ExtendedRobotState {
        ExtendedRobotState {
            locomotion_state: LocomotionState::Standing,
            control_source: ControlSource::Manual,
            voltage: 48.3,
            current: 2.0,
            min_voltage: 42.0,
            max_voltage: 54.6,
            body_temperature: 35.2,
            actuators: vec![
                ActuatorStatus {
                    name: "LF_HAA".to_string(),
                    status: ActuatorState::OperationEnabled,
                    ..Default::default()
                },
                ActuatorStatus {
                    name: "LF_HFE".to_string(),
                    status: ActuatorState::Fault,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_node_table() {
        let table = node_table(&[NodeDescriptor::new("A", "10.0.0.5", 9001)]);
        assert!(table.contains("10.0.0.5"));
        assert!(table.contains("9001"));
        assert!(node_table(&[]).contains("No connections discovered yet."));
    }

    #[test]
    fn test_state_line() {
        let line = state_line(&sample_state());
        assert_eq!(
            line,
            "State: STANDING_MODE (6) | Operational: Yes | Control: Manual (joy/gui)"
        );
    }

    #[test]
    fn test_battery_line() {
        let line = battery_line(&sample_state());
        assert!(line.starts_with("Voltage: 48.3V (50.0%)"), "{}", line);

        let unknown = ExtendedRobotState::default();
        assert!(battery_line(&unknown).contains("(n/a)"));
    }

    #[test]
    fn test_actuator_table_flags_errors() {
        let table = actuator_table(&sample_state());
        assert!(table.contains("LF_HFE"));
        assert!(table.contains("WARNING: Actuator errors detected"));
        assert!(table.contains("  - LF_HFE: FAULT"));
    }

    #[test]
    fn test_result_line() {
        assert_eq!(result_line(&ServiceResult::ok("standing up")), "OK: standing up");
        assert_eq!(result_line(&ServiceResult::timeout()), "FAIL: timeout");
    }
}
