//! 线程辅助：带名字的 spawn 与带超时的 join

use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 后台线程退出等待上限
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn spawn_named<F>(name: String, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(f)
}

/// Extension trait for timeout-capable thread joins
pub(crate) trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        // 线程自身无法 join 自己（例如在回调里断开连接），直接放行
        if self.thread().id() == thread::current().id() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            // 超时：watchdog 线程继续等待，进程退出时由 OS 回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let handle = spawn_named("raisin-test".to_string(), || {}).unwrap();
        assert!(handle.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_times_out_on_stuck_thread() {
        let (_keep, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = spawn_named("raisin-stuck".to_string(), move || {
            let _ = rx.recv_timeout(Duration::from_millis(500));
        })
        .unwrap();
        assert!(handle.join_timeout(Duration::from_millis(20)).is_err());
    }
}
