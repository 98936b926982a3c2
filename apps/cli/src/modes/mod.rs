//! 交互模式
//!
//! - `input`: 专用输入线程（rustyline，保留历史记录）
//! - `repl`: 通用命令循环（错误不退出，Ctrl-C 退出）

pub mod input;
pub mod repl;
