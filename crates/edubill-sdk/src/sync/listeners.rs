//! 同步事件监听器
//!
//! 监听器同步调用；单个监听器 panic 不影响其他监听器，也不会中断同步。

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

use super::SyncEvent;

pub type SyncListener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// 取消订阅函数
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, SyncListener)>>;

#[derive(Default)]
pub struct SyncListeners {
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
}

impl SyncListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<ListenerList> = Arc::downgrade(&self.listeners);
        Box::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &SyncEvent) {
        // 先复制列表，监听器内部可以安全地取消订阅
        let snapshot: Vec<SyncListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("同步监听器 panic，已忽略: event={:?}", event);
            }
        }
    }
}
