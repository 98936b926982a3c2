//! 交互式运动控制
//!
//! 单字母命令：
//! - `m` / `a`: 申请手动 / 自主控制权
//! - `r`: 依次释放手动与自主控制源
//! - `u` / `d`: 站立 / 坐下
//! - `s`: 显示当前状态
//! - `q`: 退出

use crate::display;
use crate::modes::input::ReplInput;
use crate::modes::repl::{self, Flow};
use crate::session::Session;
use anyhow::Result;
use clap::Args;
use raisin_sdk::RaisinClient;
use raisin_sdk::protocol::{AUTONOMOUS_CONTROL_SOURCE, MANUAL_CONTROL_SOURCE};
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct ControlCommand {
    /// 机器人 ID 或 `ip[:port]`
    pub robot: String,
}

fn print_help() {
    println!("Commands:");
    println!("  m  set manual control");
    println!("  a  set autonomous control");
    println!("  r  release control (both sources)");
    println!("  u  stand up");
    println!("  d  sit down");
    println!("  s  show state");
    println!("  q  quit");
}

impl ControlCommand {
    pub fn execute(&self, session: &Session) -> Result<ExitCode> {
        let Some(client) = session.connect(&self.robot)? else {
            return Ok(ExitCode::SUCCESS);
        };
        let input = ReplInput::new(crate::config::history_file())?;
        print_help();

        repl::run(&input, "control> ", &session.cancel, |line| {
            if !client.is_connected() {
                println!("Connection lost.");
                return Ok(Flow::Quit);
            }
            match line {
                "m" => println!("{}", display::result_line(&client.set_manual_control())),
                "a" => println!("{}", display::result_line(&client.set_autonomous_control())),
                "r" => release_all(&client),
                "u" => println!("{}", display::result_line(&client.stand_up())),
                "d" => println!("{}", display::result_line(&client.sit_down())),
                "s" => show_state(&client),
                "q" | "quit" => return Ok(Flow::Quit),
                "h" | "help" => print_help(),
                other => anyhow::bail!("unknown command: {} (type 'h')", other),
            }
            Ok(Flow::Continue)
        });

        client.disconnect();
        Ok(ExitCode::SUCCESS)
    }
}

/// 控制源需逐个释放
fn release_all(client: &RaisinClient) {
    for source in [MANUAL_CONTROL_SOURCE, AUTONOMOUS_CONTROL_SOURCE] {
        let result = client.release_control(source);
        println!("release {}: {}", source, display::result_line(&result));
    }
}

fn show_state(client: &RaisinClient) {
    match client.get_extended_robot_state() {
        Some(state) => {
            println!("{}", display::state_line(&state));
            println!("{}", display::battery_line(&state));
        },
        None => println!("No robot state received yet."),
    }
}
