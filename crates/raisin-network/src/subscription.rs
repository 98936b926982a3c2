//! 订阅缓存
//!
//! 每个话题一个槽位：
//!
//! ```text
//! rx_loop ──deliver()──▶ decode (一次) ──▶ latest (ArcSwap) ──▶ mailbox (单槽，覆盖)
//!                                                                  │
//!                                                 dispatch worker ◀┘ ──▶ callbacks
//! ```
//!
//! - 解码在接收线程完成，每帧一次，同一话题的所有订阅者共享解码结果
//! - 最新值先写入 `latest`，再投递给回调；`get_latest()` 不依赖回调存在
//! - 回调在该话题独占的分发线程上执行，慢回调只会让本话题的邮箱被覆盖，
//!   不会阻塞接收线程或其他话题
//! - 解码失败的帧被丢弃并记录，缓存保留旧值

use crate::error::NetworkError;
use crate::metrics::NetworkMetrics;
use crate::thread::{JOIN_TIMEOUT, JoinTimeout, spawn_named};
use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex, RwLock};
use raisin_protocol::ProtocolError;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

type AnyValue = Arc<dyn Any + Send + Sync>;
type ErasedDecoder = Arc<dyn Fn(&[u8]) -> Result<AnyValue, ProtocolError> + Send + Sync>;
type ErasedHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

/// 一次解码后的采样
pub struct Sample {
    value: AnyValue,
    /// 话题内递增序号（从 1 开始）
    pub sequence: u64,
    pub received_at: Instant,
}

impl Sample {
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }
}

/// 单槽邮箱（Last Write Wins）
struct Mailbox {
    slot: Mutex<MailboxState>,
    signal: Condvar,
}

#[derive(Default)]
struct MailboxState {
    pending: Option<Arc<Sample>>,
    closed: bool,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            slot: Mutex::new(MailboxState::default()),
            signal: Condvar::new(),
        }
    }

    /// 投递采样，返回是否覆盖了未处理的旧采样
    fn post(&self, sample: Arc<Sample>) -> bool {
        let mut state = self.slot.lock();
        let overwritten = state.pending.replace(sample).is_some();
        drop(state);
        self.signal.notify_one();
        overwritten
    }

    /// 等待下一个采样，邮箱关闭后返回 `None`
    fn take(&self) -> Option<Arc<Sample>> {
        let mut state = self.slot.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(sample) = state.pending.take() {
                return Some(sample);
            }
            self.signal.wait(&mut state);
        }
    }

    fn close(&self) {
        self.slot.lock().closed = true;
        self.signal.notify_all();
    }
}

struct Dispatcher {
    mailbox: Arc<Mailbox>,
    worker: JoinHandle<()>,
}

struct TopicSlot {
    topic: String,
    type_id: TypeId,
    type_name: &'static str,
    decoder: ErasedDecoder,
    latest: ArcSwapOption<Sample>,
    sequence: AtomicU64,
    handlers: Arc<RwLock<Vec<ErasedHandler>>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl TopicSlot {
    fn ensure_dispatcher(&self) -> Result<(), NetworkError> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return Ok(());
        }

        let mailbox = Arc::new(Mailbox::new());
        let worker_mailbox = mailbox.clone();
        let handlers = self.handlers.clone();
        let topic = self.topic.clone();
        let worker = spawn_named(format!("raisin-sub-{}", self.topic), move || {
            dispatch_loop(&topic, &worker_mailbox, &handlers);
        })?;
        debug!("Dispatch worker started for '{}'", self.topic);
        *dispatcher = Some(Dispatcher { mailbox, worker });
        Ok(())
    }

    fn stop_dispatcher(&self) {
        let Some(dispatcher) = self.dispatcher.lock().take() else {
            return;
        };
        dispatcher.mailbox.close();
        if dispatcher.worker.join_timeout(JOIN_TIMEOUT).is_err() {
            error!(
                "Dispatch worker for '{}' did not stop within {:?} (callback still running?)",
                self.topic, JOIN_TIMEOUT
            );
        }
    }
}

/// 分发线程主循环
fn dispatch_loop(topic: &str, mailbox: &Mailbox, handlers: &RwLock<Vec<ErasedHandler>>) {
    while let Some(sample) = mailbox.take() {
        // 复制回调列表后释放读锁，回调内可以安全地增删订阅
        let callbacks: Vec<ErasedHandler> = handlers.read().clone();
        for callback in callbacks {
            let value: &(dyn Any + Send + Sync) = &*sample.value;
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!("Callback for '{}' panicked (sample #{})", topic, sample.sequence);
            }
        }
    }
    trace!("Dispatch worker for '{}' exiting", topic);
}

/// 订阅缓存
pub struct SubscriptionCache {
    slots: RwLock<HashMap<String, Arc<TopicSlot>>>,
    metrics: Arc<NetworkMetrics>,
}

impl SubscriptionCache {
    pub fn new(metrics: Arc<NetworkMetrics>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// 注册话题（只缓存最新值，不挂回调）
    ///
    /// 返回 `true` 表示话题是第一次注册。同一话题重复注册时沿用已有的解码器，
    /// 但数据类型必须一致。
    pub fn register<T, D>(&self, topic: &str, decoder: D) -> Result<bool, NetworkError>
    where
        T: Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, ProtocolError> + Send + Sync + 'static,
    {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(topic) {
            check_type::<T>(slot)?;
            return Ok(false);
        }

        let decoder: ErasedDecoder =
            Arc::new(move |bytes: &[u8]| decoder(bytes).map(|v| Arc::new(v) as AnyValue));
        slots.insert(
            topic.to_string(),
            Arc::new(TopicSlot {
                topic: topic.to_string(),
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                decoder,
                latest: ArcSwapOption::empty(),
                sequence: AtomicU64::new(0),
                handlers: Arc::new(RwLock::new(Vec::new())),
                dispatcher: Mutex::new(None),
            }),
        );
        debug!("Registered topic '{}' as {}", topic, type_name::<T>());
        Ok(true)
    }

    /// 订阅话题：注册（如需要）并追加回调
    ///
    /// 返回 `true` 表示话题是第一次注册。
    pub fn subscribe<T, D, F>(&self, topic: &str, decoder: D, callback: F) -> Result<bool, NetworkError>
    where
        T: Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, ProtocolError> + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let created = self.register::<T, D>(topic, decoder)?;
        let slot = self.slot(topic).ok_or(NetworkError::NotConnected)?;

        let handler: ErasedHandler = Arc::new(move |value: &(dyn Any + Send + Sync)| {
            if let Some(value) = value.downcast_ref::<T>() {
                callback(value);
            }
        });
        slot.handlers.write().push(handler);
        slot.ensure_dispatcher()?;
        Ok(created)
    }

    /// 移除话题的所有回调并停止分发线程；最新值保留
    ///
    /// 返回话题之前是否有回调。
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let Some(slot) = self.slot(topic) else {
            return false;
        };
        let had_handlers = {
            let mut handlers = slot.handlers.write();
            let had = !handlers.is_empty();
            handlers.clear();
            had
        };
        slot.stop_dispatcher();
        debug!("Unsubscribed '{}'", topic);
        had_handlers
    }

    /// 接收路径：解码一帧并投递
    ///
    /// 未注册的话题直接忽略。
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let Some(slot) = self.slot(topic) else {
            trace!("Dropping frame for unregistered topic '{}'", topic);
            return;
        };

        let value = match (slot.decoder)(payload) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to decode '{}' ({}): {}", topic, slot.type_name, e);
                return;
            },
        };

        let sample = Arc::new(Sample {
            value,
            sequence: slot.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            received_at: Instant::now(),
        });
        slot.latest.store(Some(sample.clone()));

        if let Some(dispatcher) = slot.dispatcher.lock().as_ref()
            && dispatcher.mailbox.post(sample)
        {
            self.metrics.dispatch_overwrites.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 读取话题的最新值
    ///
    /// 话题未注册或尚未收到数据时返回 `Ok(None)`；类型不符时返回错误。
    pub fn get_latest<T: Send + Sync + 'static>(
        &self,
        topic: &str,
    ) -> Result<Option<Arc<T>>, NetworkError> {
        let Some(slot) = self.slot(topic) else {
            return Ok(None);
        };
        check_type::<T>(&slot)?;
        Ok(slot.latest.load_full().and_then(|sample| sample.downcast::<T>()))
    }

    /// 读取最新采样（带序号和接收时间）
    pub fn latest_sample(&self, topic: &str) -> Option<Arc<Sample>> {
        self.slot(topic).and_then(|slot| slot.latest.load_full())
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.slots.read().contains_key(topic)
    }

    /// 有回调的话题列表
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .slots
            .read()
            .values()
            .filter(|slot| !slot.handlers.read().is_empty())
            .map(|slot| slot.topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// 停止所有分发线程并清空缓存
    pub fn clear(&self) {
        let slots: Vec<Arc<TopicSlot>> = self.slots.write().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.handlers.write().clear();
            slot.stop_dispatcher();
        }
    }

    fn slot(&self, topic: &str) -> Option<Arc<TopicSlot>> {
        self.slots.read().get(topic).cloned()
    }
}

impl Drop for SubscriptionCache {
    fn drop(&mut self) {
        self.clear();
    }
}

fn check_type<T: 'static>(slot: &TopicSlot) -> Result<(), NetworkError> {
    if slot.type_id == TypeId::of::<T>() {
        Ok(())
    } else {
        Err(NetworkError::TopicTypeMismatch {
            topic: slot.topic.clone(),
            registered: slot.type_name,
            requested: type_name::<T>(),
        })
    }
}
