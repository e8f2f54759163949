//! 同步管理器
//!
//! 一次 `sync_now()` = 上传（FIFO）→ 下载（pending 优先）。任意时刻最多一个同步在运行；
//! 运行中再次调用直接返回 false。失败不会抛给调用方，只通过监听器报告。

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::applier::apply_remote_changes;
use super::uploader::upload_pending;
use super::{
    EntityType, SyncCursorStore, SyncEvent, SyncListeners, SyncPhase, SyncState,
    SyncStatusSnapshot, SyncSummary, Unsubscribe,
};
use crate::error::Result;
use crate::network::ConnectionManager;
use crate::remote::RemoteApi;
use crate::session::AuthSession;
use crate::storage::LocalStore;
use crate::utils::now_iso;

/// 同步管理器配置
#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    /// 定时同步间隔；为 0 时不启动定时器
    pub sync_interval: Duration,
    /// failed 条目在尝试次数低于该值时，下一次同步会重新放回 pending
    pub max_sync_attempts: u32,
    /// 下载阶段拉取的实体
    pub tracked_entities: Vec<EntityType>,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            max_sync_attempts: 5,
            tracked_entities: EntityType::ALL.to_vec(),
        }
    }
}

/// 离开作用域时把状态放回 Idle（包括 panic 展开）
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncManager {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    connection: Arc<ConnectionManager>,
    session: AuthSession,
    cursor: SyncCursorStore,
    listeners: SyncListeners,
    syncing: AtomicBool,
    config: SyncManagerConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connection: Arc<ConnectionManager>,
        session: AuthSession,
        config: SyncManagerConfig,
    ) -> Self {
        Self {
            cursor: SyncCursorStore::new(store.clone()),
            store,
            remote,
            connection,
            session,
            listeners: SyncListeners::new(),
            syncing: AtomicBool::new(false),
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// 登录 / 登出后更新远端调用使用的 token
    pub fn set_auth_token(&self, token: Option<String>) {
        self.session.set_token(token);
    }

    pub fn add_listener<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub async fn last_sync_time(&self) -> Result<Option<String>> {
        self.cursor.last_sync_time().await
    }

    pub async fn status(&self) -> Result<SyncStatusSnapshot> {
        Ok(SyncStatusSnapshot {
            state: self.state(),
            last_sync_time: self.cursor.last_sync_time().await?,
            pending_count: self.store.pending_count().await?,
            is_online: self.connection.is_online().await,
        })
    }

    /// 执行一次完整同步；已有同步在运行或同步失败时返回 false
    pub async fn sync_now(&self) -> bool {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("同步进行中，忽略本次触发");
            return false;
        }

        let result = {
            let _guard = SyncingGuard(&self.syncing);
            self.listeners.notify(&SyncEvent::StateChanged { state: SyncState::Syncing });
            self.run().await
        };
        self.listeners.notify(&SyncEvent::StateChanged { state: SyncState::Idle });

        match result {
            Ok(summary) => {
                info!(
                    "✅ 同步完成: uploaded={} failed={} downloaded={} skipped={}",
                    summary.uploaded, summary.failed, summary.downloaded, summary.skipped
                );
                self.listeners.notify(&SyncEvent::Completed(summary));
                true
            }
            Err(e) => {
                error!("❌ 同步失败: {}", e);
                self.listeners.notify(&SyncEvent::Failed { error: e.to_string() });
                false
            }
        }
    }

    async fn run(&self) -> Result<SyncSummary> {
        let started_at = now_iso();
        let token = self.session.token();

        let requeued = self.store.requeue_failed(self.config.max_sync_attempts).await?;
        if requeued > 0 {
            info!("🔁 {} 条失败条目重新排队", requeued);
        }

        let pending = self.store.pending_count().await? as usize;
        info!("🔄 开始同步: pending={}", pending);
        self.listeners.notify(&SyncEvent::Started { pending });

        // 阶段一：上传
        let upload = upload_pending(
            &self.store,
            self.remote.as_ref(),
            token.as_deref(),
            self.config.max_sync_attempts,
            &self.listeners,
        )
        .await?;

        // 阶段二：下载
        let last_sync = self.cursor.last_sync_time().await?;
        let total = self.config.tracked_entities.len();
        let mut summary = SyncSummary {
            uploaded: upload.uploaded,
            failed: upload.failed,
            ..Default::default()
        };
        for (index, entity) in self.config.tracked_entities.iter().enumerate() {
            let items = self
                .remote
                .fetch_changes(*entity, last_sync.as_deref(), token.as_deref())
                .await?;
            debug!("⬇️ {} 增量 {} 条", entity, items.len());
            let outcome = apply_remote_changes(&self.store, *entity, items).await?;
            summary.downloaded += outcome.downloaded;
            summary.skipped += outcome.skipped;
            self.listeners.notify(&SyncEvent::Progress {
                phase: SyncPhase::Download,
                current: index + 1,
                total,
            });
        }

        self.cursor.set_last_sync_time(&started_at).await?;
        Ok(summary)
    }

    /// 自动触发：需要在线、已登录、空闲
    async fn auto_sync(&self, reason: &str) {
        if !self.connection.is_online().await || !self.session.is_authenticated() {
            debug!("跳过自动同步 ({}): 离线或未登录", reason);
            return;
        }
        if self.state() == SyncState::Syncing {
            return;
        }
        debug!("自动同步触发: {}", reason);
        self.sync_now().await;
    }

    /// 启动定时器与网络恢复监听；重复调用无效
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let interval = self.config.sync_interval;
        if !interval.is_zero() {
            let weak: Weak<Self> = Arc::downgrade(self);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // interval 的第一次 tick 立即返回
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(manager) = weak.upgrade() else { break };
                    manager.auto_sync("interval").await;
                }
            }));
        }

        let mut status_rx = self.connection.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            loop {
                match status_rx.recv().await {
                    Ok(event) if event.is_reconnect() => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.auto_sync("reconnect").await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("网络状态事件积压，丢弃 {} 条", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        info!("同步触发器已启动 (interval={:?})", interval);
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop();
    }
}
