//! 子命令
//!
//! 每个命令一个 `#[derive(Args)]` 结构体，`execute` 返回进程退出码。

pub mod config;
pub mod control;
pub mod list;
pub mod monitor;
pub mod patrol;
pub mod shell;

pub use config::ConfigCommand;
pub use control::ControlCommand;
pub use list::ListCommand;
pub use monitor::MonitorCommand;
pub use patrol::PatrolCommand;
pub use shell::ShellCommand;
