/// 双向同步模块
///
/// 职责：
/// - 上传 sync_queue 中的本地修改（FIFO）
/// - 下载远端增量并合并（本地 pending 优先）
/// - 定时 / 网络恢复时自动触发
/// - 通过监听器报告进度与结果

pub mod applier;
pub mod cursor_store;
pub mod entity_type;
pub mod listeners;
pub mod manager;
pub mod uploader;

pub use cursor_store::SyncCursorStore;
pub use entity_type::EntityType;
pub use listeners::{SyncListener, SyncListeners, Unsubscribe};
pub use manager::SyncManager;

use serde::{Deserialize, Serialize};

/// 同步状态机：Idle → Syncing → Idle（失败同样回到 Idle）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
}

/// 同步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Upload,
    Download,
}

/// 一次同步的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub downloaded: usize,
    /// 因本地 pending 而跳过的远端记录
    pub skipped: usize,
}

/// 推送给监听器的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    StateChanged { state: SyncState },
    Started { pending: usize },
    Progress { phase: SyncPhase, current: usize, total: usize },
    Completed(SyncSummary),
    Failed { error: String },
}

/// `SyncManager::status()` 的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    pub state: SyncState,
    pub last_sync_time: Option<String>,
    pub pending_count: u64,
    pub is_online: bool,
}
