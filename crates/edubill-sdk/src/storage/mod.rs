//! 存储模块 - 本地缓存 + 同步队列
//!
//! 分层：
//! - LocalStore: 对外的异步存储 API（所有调用方只经过它）
//! - DbActor: 独占 SQLite 连接的单线程执行者
//! - DAO: 每张表一个操作模块
//! - migrations/: refinery 管理的 schema

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EdubillSDKError, Result};
use crate::sync::EntityType;

pub mod dao;
pub mod db_actor;
pub mod entities;
pub mod migrate;

pub use db_actor::{DbActorHandle, DbCommand};
pub use entities::*;

/// sync_meta 中使用的键
pub mod meta_keys {
    /// 最近一次成功同步的开始时间
    pub const LAST_SYNC_TIME: &str = "last_sync_time";
    /// 最近一次登录得到的 token
    pub const AUTH_TOKEN: &str = "auth_token";
}

/// 数据库文件名（每个安装一个）
pub const DB_FILE_NAME: &str = "edubill.db";

/// 本地存储：固定 schema 的实体缓存 + 只追加的同步队列
///
/// 所有修改操作（create / update / delete）在同一事务里写记录并追加一条队列条目；
/// 调用方不需要、也不应该直接调用 `enqueue` 来记录自己的修改。
#[derive(Debug, Clone)]
pub struct LocalStore {
    actor: DbActorHandle,
    db_path: PathBuf,
}

impl LocalStore {
    /// 打开（必要时创建）数据库并执行 migration
    pub async fn open(db_path: &Path) -> Result<Self> {
        let actor = DbActorHandle::spawn(db_path.to_path_buf())?;
        let store = Self { actor, db_path: db_path.to_path_buf() };
        store.actor.call(|respond_to| DbCommand::Init { respond_to }).await?;
        info!("本地存储已就绪: {}", db_path.display());
        Ok(store)
    }

    /// 在数据目录下打开默认文件
    pub async fn open_in_dir(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join(DB_FILE_NAME)).await
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // 实体 CRUD
    // ------------------------------------------------------------------

    /// 创建记录：缺少 id 时生成 UUID，状态置为 pending，并追加 create 条目
    pub async fn create(&self, entity: EntityType, data: Value) -> Result<Record> {
        let data = into_object(data)?;
        self.actor
            .call(|respond_to| DbCommand::Create { entity, data, respond_to })
            .await
    }

    pub async fn get_by_id(&self, entity: EntityType, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.actor
            .call(|respond_to| DbCommand::GetById { entity, id, respond_to })
            .await
    }

    /// 精确匹配过滤；空过滤返回全部
    pub async fn get_all(&self, entity: EntityType, filter: RecordFilter) -> Result<Vec<Record>> {
        self.actor
            .call(|respond_to| DbCommand::GetAll { entity, filter, respond_to })
            .await
    }

    /// 合并部分字段；记录不存在时返回 NotFound
    pub async fn update(&self, entity: EntityType, id: &str, patch: Value) -> Result<Record> {
        let patch = into_object(patch)?;
        let id = id.to_string();
        self.actor
            .call(|respond_to| DbCommand::Update { entity, id, patch, respond_to })
            .await
    }

    pub async fn delete(&self, entity: EntityType, id: &str) -> Result<()> {
        let id = id.to_string();
        self.actor
            .call(|respond_to| DbCommand::Delete { entity, id, respond_to })
            .await
    }

    /// 写入远端返回的记录：与本地字段合并，标记 synced，不产生队列条目
    pub async fn apply_remote(&self, entity: EntityType, data: Value) -> Result<Record> {
        let data = into_object(data)?;
        self.actor
            .call(|respond_to| DbCommand::ApplyRemote { entity, data, respond_to })
            .await
    }

    /// 仅供同步管理器在远端确认后调用
    pub async fn mark_synced(&self, entity: EntityType, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.actor
            .call(|respond_to| DbCommand::MarkSynced { entity, id, respond_to })
            .await
    }

    /// 重试耗尽时把记录标记为 failed
    pub async fn mark_record_status(&self, entity: EntityType, id: &str, status: SyncStatus) -> Result<bool> {
        let id = id.to_string();
        self.actor
            .call(|respond_to| DbCommand::MarkRecordStatus { entity, id, status, respond_to })
            .await
    }

    // ------------------------------------------------------------------
    // 同步队列
    // ------------------------------------------------------------------

    pub async fn enqueue(
        &self,
        entity: EntityType,
        entity_id: &str,
        operation: SyncOperation,
        data: Value,
    ) -> Result<i64> {
        let entity_id = entity_id.to_string();
        self.actor
            .call(|respond_to| DbCommand::Enqueue { entity, entity_id, operation, data, respond_to })
            .await
    }

    /// status=pending 的条目，按入队时间升序
    pub async fn get_pending(&self) -> Result<Vec<QueueEntry>> {
        self.actor.call(|respond_to| DbCommand::GetPending { respond_to }).await
    }

    pub async fn entries_for(&self, entity: EntityType, entity_id: &str) -> Result<Vec<QueueEntry>> {
        let entity_id = entity_id.to_string();
        self.actor
            .call(|respond_to| DbCommand::EntriesFor { entity, entity_id, respond_to })
            .await
    }

    pub async fn pending_count_for(&self, entity: EntityType, entity_id: &str) -> Result<u64> {
        let entity_id = entity_id.to_string();
        self.actor
            .call(|respond_to| DbCommand::PendingCountFor { entity, entity_id, respond_to })
            .await
    }

    /// 尚未被远端确认（pending 或 failed）的条目数
    pub async fn unsynced_count_for(&self, entity: EntityType, entity_id: &str) -> Result<u64> {
        let entity_id = entity_id.to_string();
        self.actor
            .call(|respond_to| DbCommand::UnsyncedCountFor { entity, entity_id, respond_to })
            .await
    }

    /// 设置条目状态并累加尝试次数
    pub async fn mark_entry_status(
        &self,
        entry_id: i64,
        status: QueueStatus,
        error: Option<String>,
    ) -> Result<bool> {
        self.actor
            .call(|respond_to| DbCommand::MarkEntryStatus { entry_id, status, error, respond_to })
            .await
    }

    pub async fn requeue_failed(&self, max_attempts: u32) -> Result<usize> {
        self.actor
            .call(|respond_to| DbCommand::RequeueFailed { max_attempts, respond_to })
            .await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.actor.call(|respond_to| DbCommand::QueueStats { respond_to }).await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.queue_stats().await?.pending)
    }

    /// 清空队列（仅管理/测试用途）
    pub async fn clear_queue(&self) -> Result<usize> {
        self.actor.call(|respond_to| DbCommand::ClearQueue { respond_to }).await
    }

    // ------------------------------------------------------------------
    // 元数据
    // ------------------------------------------------------------------

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.actor.call(|respond_to| DbCommand::GetMeta { key, respond_to }).await
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.actor
            .call(|respond_to| DbCommand::SetMeta { key, value, respond_to })
            .await
    }

    pub async fn delete_meta(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.actor.call(|respond_to| DbCommand::DeleteMeta { key, respond_to }).await
    }

    /// 停止 DB Actor；之后的调用返回 ActorStopped
    pub fn shutdown(&self) {
        self.actor.shutdown();
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(EdubillSDKError::InvalidInput(format!(
            "记录数据必须是 JSON 对象，实际为: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open_in_dir(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_assigns_id_and_enqueues() {
        let (_dir, store) = open_store().await;
        let record = store.create(EntityType::Schools, json!({"name": "Al Noor"})).await.unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.created_at, record.updated_at);

        let pending = store.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, SyncOperation::Create);
        assert_eq!(pending[0].entity_id, record.id);
        assert_eq!(pending[0].data["name"], "Al Noor");
    }

    #[tokio::test]
    async fn update_merges_and_forces_pending() {
        let (_dir, store) = open_store().await;
        store
            .create(EntityType::Users, json!({"id": "u1", "name": "Ali", "role": "user"}))
            .await
            .unwrap();
        store.mark_synced(EntityType::Users, "u1").await.unwrap();

        let updated = store.update(EntityType::Users, "u1", json!({"name": "Ali B"})).await.unwrap();
        assert_eq!(updated.get_str("name"), Some("Ali B"));
        assert_eq!(updated.get_str("role"), Some("user"));
        assert_eq!(updated.sync_status, SyncStatus::Pending);

        let ops: Vec<SyncOperation> = store
            .entries_for(EntityType::Users, "u1")
            .await
            .unwrap()
            .iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec![SyncOperation::Create, SyncOperation::Update]);
    }

    #[tokio::test]
    async fn update_snapshot_carries_password_only_when_changed() {
        let (_dir, store) = open_store().await;
        store
            .apply_remote(EntityType::Users, json!({"id": "u1", "name": "Ali", "password": "$argon2id$cached"}))
            .await
            .unwrap();

        store.update(EntityType::Users, "u1", json!({"lastLogin": "2024-01-01T00:00:00.000Z"})).await.unwrap();
        store.update(EntityType::Users, "u1", json!({"password": "$argon2id$new"})).await.unwrap();

        let entries = store.entries_for(EntityType::Users, "u1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].data.get("password").is_none());
        assert_eq!(entries[0].data["lastLogin"], "2024-01-01T00:00:00.000Z");
        assert_eq!(entries[1].data["password"], "$argon2id$new");

        // 本地记录仍保留哈希，供离线登录
        let local = store.get_by_id(EntityType::Users, "u1").await.unwrap().unwrap();
        assert_eq!(local.get_str("password"), Some("$argon2id$new"));
    }

    #[tokio::test]
    async fn unsynced_count_includes_failed_entries_and_deletes() {
        let (_dir, store) = open_store().await;
        store.create(EntityType::Schools, json!({"id": "s1"})).await.unwrap();
        store.delete(EntityType::Schools, "s1").await.unwrap();
        let entries = store.entries_for(EntityType::Schools, "s1").await.unwrap();
        store.mark_entry_status(entries[0].id, QueueStatus::Synced, None).await.unwrap();
        store
            .mark_entry_status(entries[1].id, QueueStatus::Failed, Some("offline".into()))
            .await
            .unwrap();

        assert_eq!(store.pending_count_for(EntityType::Schools, "s1").await.unwrap(), 0);
        assert_eq!(store.unsynced_count_for(EntityType::Schools, "s1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_record_status_sets_failed() {
        let (_dir, store) = open_store().await;
        store.create(EntityType::Users, json!({"id": "u1"})).await.unwrap();
        assert!(store.mark_record_status(EntityType::Users, "u1", SyncStatus::Failed).await.unwrap());
        assert!(!store.mark_record_status(EntityType::Users, "nope", SyncStatus::Failed).await.unwrap());
        let record = store.get_by_id(EntityType::Users, "u1").await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let (_dir, store) = open_store().await;
        let err = store.update(EntityType::Users, "nope", json!({"a": 1})).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
        let err = store.delete(EntityType::Schools, "nope").await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::NotFound(_)));
        // 失败的修改不留下队列条目
        assert_eq!(store.queue_stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn delete_enqueues_only_the_id() {
        let (_dir, store) = open_store().await;
        store.create(EntityType::Schools, json!({"id": "s1", "name": "X"})).await.unwrap();
        store.delete(EntityType::Schools, "s1").await.unwrap();
        assert!(store.get_by_id(EntityType::Schools, "s1").await.unwrap().is_none());

        let entries = store.entries_for(EntityType::Schools, "s1").await.unwrap();
        assert_eq!(entries.last().unwrap().operation, SyncOperation::Delete);
        assert_eq!(entries.last().unwrap().data, json!({"id": "s1"}));
    }

    #[tokio::test]
    async fn repeated_create_with_same_id_enqueues_once_per_call() {
        let (_dir, store) = open_store().await;
        store.create(EntityType::Users, json!({"id": "dup", "name": "A"})).await.unwrap();
        store.create(EntityType::Users, json!({"id": "dup", "name": "B"})).await.unwrap();

        let all = store.get_all(EntityType::Users, RecordFilter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get_str("name"), Some("B"));
        assert_eq!(store.entries_for(EntityType::Users, "dup").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn apply_remote_keeps_local_only_fields() {
        let (_dir, store) = open_store().await;
        store
            .create(EntityType::Users, json!({"id": "u1", "name": "Ali", "password": "hash"}))
            .await
            .unwrap();
        let before = store.pending_count().await.unwrap();

        let merged = store
            .apply_remote(EntityType::Users, json!({"id": "u1", "name": "Ali R", "updatedAt": "2024-05-01T00:00:00.000Z"}))
            .await
            .unwrap();
        assert_eq!(merged.get_str("password"), Some("hash"));
        assert_eq!(merged.get_str("name"), Some("Ali R"));
        assert_eq!(merged.sync_status, SyncStatus::Synced);
        assert!(merged.last_synced.is_some());
        assert_eq!(store.pending_count().await.unwrap(), before);

        let err = store.apply_remote(EntityType::Users, json!({"name": "no id"})).await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn meta_round_trip_and_shutdown() {
        let (_dir, store) = open_store().await;
        assert!(store.get_meta(meta_keys::LAST_SYNC_TIME).await.unwrap().is_none());
        store.set_meta(meta_keys::LAST_SYNC_TIME, "2024-01-01T00:00:00.000Z").await.unwrap();
        store.set_meta(meta_keys::LAST_SYNC_TIME, "2024-01-02T00:00:00.000Z").await.unwrap();
        assert_eq!(
            store.get_meta(meta_keys::LAST_SYNC_TIME).await.unwrap().as_deref(),
            Some("2024-01-02T00:00:00.000Z")
        );
        store.delete_meta(meta_keys::LAST_SYNC_TIME).await.unwrap();
        assert!(store.get_meta(meta_keys::LAST_SYNC_TIME).await.unwrap().is_none());

        store.shutdown();
        // Actor 退出后调用返回存储错误，而不是 panic
        let mut stopped = false;
        for _ in 0..50 {
            if let Err(e) = store.pending_count().await {
                assert!(matches!(e, EdubillSDKError::ActorStopped));
                stopped = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(stopped);
    }

    #[tokio::test]
    async fn rejects_non_object_data() {
        let (_dir, store) = open_store().await;
        let err = store.create(EntityType::Users, json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::InvalidInput(_)));
    }
}
