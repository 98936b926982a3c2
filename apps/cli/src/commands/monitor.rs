//! 遥测监控

use crate::display;
use crate::session::Session;
use anyhow::Result;
use clap::{Args, ValueEnum};
use raisin_sdk::RaisinClient;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTarget {
    /// 运动状态与控制源（推送）
    State,
    /// 电池电压/电流/温度（轮询）
    Battery,
    /// 执行器状态表（轮询）
    Actuators,
}

#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 机器人 ID 或 `ip[:port]`
    pub robot: String,

    pub target: MonitorTarget,

    /// 轮询间隔（毫秒，battery / actuators）
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// 输出次数后退出（默认直到 Ctrl-C）
    #[arg(long)]
    pub count: Option<u64>,
}

impl MonitorCommand {
    pub fn execute(&self, session: &Session) -> Result<ExitCode> {
        let Some(client) = session.connect(&self.robot)? else {
            return Ok(ExitCode::SUCCESS);
        };

        match self.target {
            MonitorTarget::State => self.watch_state(session, &client)?,
            MonitorTarget::Battery => {
                self.poll(session, &client, |state| println!("{}", display::battery_line(state)))
            },
            MonitorTarget::Actuators => {
                self.poll(session, &client, |state| print!("{}", display::actuator_table(state)))
            },
        }

        client.disconnect();
        Ok(ExitCode::SUCCESS)
    }

    /// 每收到一帧 robot_state 打印一行
    fn watch_state(&self, session: &Session, client: &RaisinClient) -> Result<()> {
        let frames = Arc::new(AtomicU64::new(0));
        let counter = frames.clone();
        let limit = self.count;
        client.subscribe_robot_state(move |state| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if limit.is_none_or(|limit| n < limit) {
                println!("{}", display::state_line(state));
            }
        })?;

        let poll = session.config.network.poll_interval();
        while client.is_connected() {
            if let Some(limit) = self.count
                && frames.load(Ordering::SeqCst) >= limit
            {
                break;
            }
            if !session.sleep(poll) {
                break;
            }
        }
        if !client.is_connected() {
            println!("Connection lost.");
        }
        Ok(())
    }

    fn poll(
        &self,
        session: &Session,
        client: &RaisinClient,
        print: impl Fn(&raisin_sdk::ExtendedRobotState),
    ) {
        let mut printed = 0u64;
        while client.is_connected() {
            match client.get_extended_robot_state() {
                Some(state) => {
                    print(state.as_ref());
                    printed += 1;
                },
                None => println!("Waiting for robot state..."),
            }
            if self.count.is_some_and(|limit| printed >= limit) {
                break;
            }
            if !session.sleep(Duration::from_millis(self.interval_ms)) {
                break;
            }
        }
        if !client.is_connected() {
            println!("Connection lost.");
        }
    }
}
