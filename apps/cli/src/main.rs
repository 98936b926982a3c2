//! # Raisin CLI
//!
//! 发现、监控与控制 Raisin 机器人的命令行工具。
//!
//! ## 单次命令
//!
//! ```bash
//! raisin-cli list --wait-ms 2000
//! raisin-cli monitor robot_a battery --count 5
//! raisin-cli patrol robot_a waypoints --map lobby --laps 2 0,0 5,0 5,5
//! raisin-cli --no-discovery patrol 10.0.0.5:9001 mission
//! ```
//!
//! ## 交互模式
//!
//! ```bash
//! $ raisin-cli shell
//! raisin> list
//! raisin> con robot_a
//! raisin> dis
//! raisin> quit
//!
//! $ raisin-cli control robot_a
//! control> u
//! control> m
//! control> q
//! ```
//!
//! 退出码：正常结束（包括连接等待中按 Ctrl-C）为 0，连接失败或命令失败为 1。

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use raisin_sdk::CancellationToken;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod display;
mod modes;
mod session;

use commands::{
    ConfigCommand, ControlCommand, ListCommand, MonitorCommand, PatrolCommand, ShellCommand,
};
use session::Session;

/// Raisin CLI - 机器人命令行工具
#[derive(Parser, Debug)]
#[command(name = "raisin-cli")]
#[command(about = "Discover, monitor and command Raisin robots", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// 所有子命令共用的参数（覆盖配置文件）
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// 配置文件（默认 `<config_dir>/raisin/config.toml`）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 接收发现广播的网卡（可重复）
    #[arg(short, long = "interface", global = true)]
    pub interfaces: Vec<String>,

    /// 不监听发现广播，只接受 `ip[:port]` 直连
    #[arg(long, global = true)]
    pub no_discovery: bool,

    /// 连接超时（秒）
    #[arg(long, global = true)]
    pub timeout: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出已发现的机器人
    List {
        #[command(flatten)]
        args: ListCommand,
    },

    /// 启动交互式 Shell
    Shell {
        #[command(flatten)]
        args: ShellCommand,
    },

    /// 监控机器人遥测
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 交互式运动控制
    Control {
        #[command(flatten)]
        args: ControlCommand,
    },

    /// 地图、航点与巡逻
    Patrol {
        #[command(flatten)]
        args: PatrolCommand,
    },

    /// 配置查看
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Config(ConfigCommand::Path) = cli.command {
        return ConfigCommand::execute_path();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())?;
    }
    let session = Session::new(&cli.global, cancel)?;

    match cli.command {
        Commands::List { args } => args.execute(&session),
        Commands::Shell { args } => args.execute(&session),
        Commands::Monitor { args } => args.execute(&session),
        Commands::Control { args } => args.execute(&session),
        Commands::Patrol { args } => args.execute(&session),
        Commands::Config(ConfigCommand::Show) => ConfigCommand::execute_show(&session),
        Commands::Config(ConfigCommand::Path) => ConfigCommand::execute_path(),
    }
}

fn main() -> ExitCode {
    raisin_sdk::init_logging_with("warn,raisin_cli=info");

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        },
    }
}
