//! REPL 输入（专用输入线程 + 通道）
//!
//! rustyline 的 `Editor` 只在输入线程内创建和使用。主线程每次需要一行输入时
//! 把提示符发给输入线程，再等待结果，这样提示符不会与命令输出交错。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use raisin_sdk::CancellationToken;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// 输入线程返回的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D 或输入线程退出
    Eof,
}

pub struct ReplInput {
    prompt_tx: Sender<String>,
    event_rx: Receiver<InputEvent>,
    _input_thread: thread::JoinHandle<()>,
}

impl ReplInput {
    /// 创建输入线程（历史记录保存在 `history`）
    pub fn new(history: PathBuf) -> anyhow::Result<Self> {
        let (prompt_tx, prompt_rx) = bounded::<String>(1);
        let (event_tx, event_rx) = bounded::<InputEvent>(1);

        let input_thread = thread::Builder::new()
            .name("raisin-repl-input".to_string())
            .spawn(move || {
                let mut rl = match DefaultEditor::new() {
                    Ok(rl) => rl,
                    Err(e) => {
                        eprintln!("Failed to initialize readline: {}", e);
                        let _ = event_tx.send(InputEvent::Eof);
                        return;
                    },
                };
                // 首次运行没有历史文件
                let _ = rl.load_history(&history);

                while let Ok(prompt) = prompt_rx.recv() {
                    let event = match rl.readline(&prompt) {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if !line.is_empty() {
                                let _ = rl.add_history_entry(line.as_str());
                            }
                            InputEvent::Line(line)
                        },
                        Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                        Err(ReadlineError::Eof) => InputEvent::Eof,
                        Err(err) => {
                            eprintln!("Error: {:?}", err);
                            InputEvent::Eof
                        },
                    };
                    let done = event != InputEvent::Eof && event != InputEvent::Interrupted;
                    if event_tx.send(event).is_err() || !done {
                        break;
                    }
                }

                if let Some(dir) = history.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = rl.save_history(&history) {
                    warn!("Failed to save history to {}: {}", history.display(), e);
                }
            })?;

        Ok(Self {
            prompt_tx,
            event_rx,
            _input_thread: input_thread,
        })
    }

    /// 读取一行
    ///
    /// 等待期间 `cancel` 被触发时返回 [`InputEvent::Interrupted`]；
    /// 输入线程已退出时返回 [`InputEvent::Eof`]。
    pub fn read_line(&self, prompt: &str, cancel: &CancellationToken) -> InputEvent {
        if self.prompt_tx.send(prompt.to_string()).is_err() {
            return InputEvent::Eof;
        }
        loop {
            match self.event_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => return event,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        return InputEvent::Interrupted;
                    }
                },
                Err(RecvTimeoutError::Disconnected) => return InputEvent::Eof,
            }
        }
    }
}
