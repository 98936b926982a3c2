//! 交互式 Shell：浏览已发现节点、连接与断开

use crate::display;
use crate::modes::input::ReplInput;
use crate::modes::repl::{self, Flow};
use crate::session::Session;
use anyhow::Result;
use clap::Args;
use raisin_sdk::RaisinClient;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct ShellCommand {}

fn print_help() {
    println!("Commands:");
    println!("  list        list discovered robots (or connection details when connected)");
    println!("  con <id>    connect to a robot");
    println!("  dis         disconnect");
    println!("  quit        exit");
}

impl ShellCommand {
    pub fn execute(&self, session: &Session) -> Result<ExitCode> {
        let input = ReplInput::new(crate::config::history_file())?;
        let client = session.client();

        println!("Raisin CLI v{} - interactive shell", env!("CARGO_PKG_VERSION"));
        print_help();

        repl::run(&input, "raisin> ", &session.cancel, |line| {
            let (command, args) = repl::split(line);
            match command {
                "list" => list(session, &client),
                "con" => {
                    let Some(id) = args.first() else {
                        anyhow::bail!("usage: con <id>");
                    };
                    connect(session, &client, id)?;
                },
                "dis" => {
                    if client.is_connected() {
                        client.disconnect();
                        println!("Disconnected.");
                    } else {
                        println!("Not connected.");
                    }
                },
                "quit" | "exit" | "q" => return Ok(Flow::Quit),
                "help" => print_help(),
                other => anyhow::bail!("unknown command: {} (type 'help')", other),
            }
            Ok(Flow::Continue)
        });

        client.disconnect();
        Ok(ExitCode::SUCCESS)
    }
}

fn list(session: &Session, client: &RaisinClient) {
    match client.connection().filter(|c| c.is_connected()) {
        Some(connection) => print!("{}", display::connection_details(&connection.info())),
        None => print!(
            "{}",
            display::node_table(&session.network.get_all_connections())
        ),
    }
}

fn connect(session: &Session, client: &RaisinClient, id: &str) -> Result<()> {
    println!("Connecting to robot: {}", id);
    client.connect(id, session.config.connect_timeout_secs, Some(&session.cancel))?;
    println!("Connected.");
    Ok(())
}
