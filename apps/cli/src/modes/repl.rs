//! 通用 REPL 循环

use super::input::{InputEvent, ReplInput};
use anyhow::Result;
use raisin_sdk::CancellationToken;
use std::panic::{self, AssertUnwindSafe};

/// 单条命令处理后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 运行 REPL，直到命令返回 [`Flow::Quit`]、Ctrl-C 或 Ctrl-D
///
/// 命令出错只打印错误，不退出循环；命令 panic 同样被隔离。
pub fn run<F>(input: &ReplInput, prompt: &str, cancel: &CancellationToken, mut handle: F)
where
    F: FnMut(&str) -> Result<Flow>,
{
    loop {
        let line = match input.read_line(prompt, cancel) {
            InputEvent::Line(line) => line,
            InputEvent::Interrupted => {
                println!("^C");
                break;
            },
            InputEvent::Eof => break,
        };
        if line.is_empty() {
            continue;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| handle(&line))) {
            Ok(Ok(Flow::Continue)) => {},
            Ok(Ok(Flow::Quit)) => break,
            Ok(Err(err)) => eprintln!("Error: {:#}", err),
            Err(_) => eprintln!("Command panicked: {}", line),
        }
    }
}

/// 拆分命令行为命令与参数
pub fn split(line: &str) -> (&str, Vec<&str>) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    (command, parts.collect())
}
