//! 列出已发现的节点

use crate::display;
use crate::session::Session;
use anyhow::Result;
use clap::Args;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ListCommand {
    /// 先收集发现广播的时长（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub wait_ms: u64,
}

impl ListCommand {
    pub fn execute(&self, session: &Session) -> Result<ExitCode> {
        println!("Listening for robots ({} ms)...", self.wait_ms);
        if !session.sleep(Duration::from_millis(self.wait_ms)) {
            return Ok(ExitCode::SUCCESS);
        }
        print!("{}", display::node_table(&session.network.get_all_connections()));
        Ok(ExitCode::SUCCESS)
    }
}
