//! 配置查看

use crate::session::Session;
use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印默认配置文件路径
    Path,
    /// 打印生效的配置（TOML）
    Show,
}

impl ConfigCommand {
    /// `path` 不需要网络运行时，在创建会话之前处理
    pub fn execute_path() -> Result<ExitCode> {
        println!("{}", crate::config::default_config_file()?.display());
        Ok(ExitCode::SUCCESS)
    }

    pub fn execute_show(session: &Session) -> Result<ExitCode> {
        print!("{}", crate::config::render(&session.config)?);
        Ok(ExitCode::SUCCESS)
    }
}
