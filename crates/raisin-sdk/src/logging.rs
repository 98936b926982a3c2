//! 日志初始化
//!
//! 库内部只通过 `tracing` 宏记录日志；应用在启动时调用一次 [`init_logging`]。
//! 依赖 `log` 的第三方库输出经 `tracing-log` 桥接到同一个 subscriber。

use tracing_subscriber::EnvFilter;

/// 安装全局 subscriber：`RUST_LOG` 优先，未设置时为 `info`
///
/// 返回是否安装成功（重复调用返回 `false`，不会 panic）。
pub fn init_logging() -> bool {
    init_logging_with("info")
}

/// 同 [`init_logging`]，`RUST_LOG` 未设置时使用 `default_directives`（如 `"raisin_network=debug"`）
pub fn init_logging_with(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    // log -> tracing 桥接（已有 logger 时忽略）
    let _ = tracing_log::LogTracer::init();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        // 同一进程内只有第一次能成功
        let first = init_logging_with("raisin_sdk=debug");
        let second = init_logging();
        assert!(!second || !first);
        log::info!("bridged through tracing-log");
        tracing::info!("logging initialised");
    }
}
