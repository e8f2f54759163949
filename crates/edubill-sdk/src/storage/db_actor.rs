//! 数据库 Actor - 单线程数据库访问模型
//!
//! - SQLite Connection 只存在于一个专用线程中
//! - 所有存储操作通过 channel 发送命令，oneshot 回传结果
//! - 命令按到达顺序串行执行（单写者），一次修改 = 一个事务（写记录 + 追加队列）
//! - schema 初始化在处理第一条命令前执行一次

use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::{EdubillSDKError, Result};
use crate::storage::dao::{self, DaoFactory};
use crate::storage::entities::{
    fields, id_from_value, not_found, QueueEntry, QueueStats, QueueStatus, Record, RecordFilter,
    SyncOperation, SyncStatus,
};
use crate::storage::migrate;
use crate::sync::EntityType;
use crate::utils::now_iso;

type Reply<T> = oneshot::Sender<Result<T>>;

/// 数据库命令
pub enum DbCommand {
    /// 打开数据库并执行 migration（幂等）
    Init { respond_to: Reply<()> },

    Create { entity: EntityType, data: Map<String, Value>, respond_to: Reply<Record> },
    GetById { entity: EntityType, id: String, respond_to: Reply<Option<Record>> },
    GetAll { entity: EntityType, filter: RecordFilter, respond_to: Reply<Vec<Record>> },
    Update { entity: EntityType, id: String, patch: Map<String, Value>, respond_to: Reply<Record> },
    Delete { entity: EntityType, id: String, respond_to: Reply<()> },

    /// 写入远端返回的记录（标记 synced，不入队）
    ApplyRemote { entity: EntityType, data: Map<String, Value>, respond_to: Reply<Record> },
    MarkSynced { entity: EntityType, id: String, respond_to: Reply<bool> },
    MarkRecordStatus { entity: EntityType, id: String, status: SyncStatus, respond_to: Reply<bool> },

    Enqueue {
        entity: EntityType,
        entity_id: String,
        operation: SyncOperation,
        data: Value,
        respond_to: Reply<i64>,
    },
    GetPending { respond_to: Reply<Vec<QueueEntry>> },
    EntriesFor { entity: EntityType, entity_id: String, respond_to: Reply<Vec<QueueEntry>> },
    PendingCountFor { entity: EntityType, entity_id: String, respond_to: Reply<u64> },
    UnsyncedCountFor { entity: EntityType, entity_id: String, respond_to: Reply<u64> },
    MarkEntryStatus {
        entry_id: i64,
        status: QueueStatus,
        error: Option<String>,
        respond_to: Reply<bool>,
    },
    RequeueFailed { max_attempts: u32, respond_to: Reply<usize> },
    QueueStats { respond_to: Reply<QueueStats> },
    ClearQueue { respond_to: Reply<usize> },

    GetMeta { key: String, respond_to: Reply<Option<String>> },
    SetMeta { key: String, value: String, respond_to: Reply<()> },
    DeleteMeta { key: String, respond_to: Reply<()> },

    Shutdown,
}

struct DbActor {
    receiver: Receiver<DbCommand>,
    db_path: PathBuf,
    conn: Option<Connection>,
}

impl DbActor {
    fn new(receiver: Receiver<DbCommand>, db_path: PathBuf) -> Self {
        Self { receiver, db_path, conn: None }
    }

    /// 首次调用时打开连接并初始化 schema，之后直接返回已有连接
    fn conn(&mut self) -> Result<&Connection> {
        if self.conn.is_none() {
            if let Some(parent) = self.db_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EdubillSDKError::Storage(format!("创建数据目录失败: {}", e)))?;
            }
            let mut conn = Connection::open(&self.db_path)
                .map_err(|e| EdubillSDKError::Storage(format!("打开数据库失败: {}", e)))?;
            migrate::init_db(&mut conn)?;
            info!("✅ 本地数据库已初始化: {}", self.db_path.display());
            self.conn = Some(conn);
        }
        self.conn
            .as_ref()
            .ok_or_else(|| EdubillSDKError::Storage("数据库连接不可用".to_string()))
    }

    fn run(mut self) {
        debug!("🔄 DbActor 开始处理命令");

        while let Ok(command) = self.receiver.recv() {
            match command {
                DbCommand::Shutdown => {
                    info!("🛑 DbActor 收到停止信号");
                    break;
                }
                DbCommand::Init { respond_to } => {
                    let result = self.conn().map(|_| ());
                    let _ = respond_to.send(result);
                }
                DbCommand::Create { entity, data, respond_to } => {
                    let _ = respond_to.send(self.handle_create(entity, data));
                }
                DbCommand::GetById { entity, id, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::record_dao(conn, entity).get_by_id(&id));
                    let _ = respond_to.send(result);
                }
                DbCommand::GetAll { entity, filter, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::record_dao(conn, entity).list(&filter));
                    let _ = respond_to.send(result);
                }
                DbCommand::Update { entity, id, patch, respond_to } => {
                    let _ = respond_to.send(self.handle_update(entity, &id, patch));
                }
                DbCommand::Delete { entity, id, respond_to } => {
                    let _ = respond_to.send(self.handle_delete(entity, &id));
                }
                DbCommand::ApplyRemote { entity, data, respond_to } => {
                    let _ = respond_to.send(self.handle_apply_remote(entity, data));
                }
                DbCommand::MarkSynced { entity, id, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::record_dao(conn, entity).mark_synced(&id, &now_iso()));
                    let _ = respond_to.send(result);
                }
                DbCommand::MarkRecordStatus { entity, id, status, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::record_dao(conn, entity).set_status(&id, status));
                    let _ = respond_to.send(result);
                }
                DbCommand::Enqueue { entity, entity_id, operation, data, respond_to } => {
                    let result = self.conn().and_then(|conn| {
                        DaoFactory::sync_queue_dao(conn).insert(entity, &entity_id, operation, &data, &now_iso())
                    });
                    let _ = respond_to.send(result);
                }
                DbCommand::GetPending { respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::sync_queue_dao(conn).pending());
                    let _ = respond_to.send(result);
                }
                DbCommand::EntriesFor { entity, entity_id, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::sync_queue_dao(conn).entries_for(entity, &entity_id));
                    let _ = respond_to.send(result);
                }
                DbCommand::PendingCountFor { entity, entity_id, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::sync_queue_dao(conn).pending_count_for(entity, &entity_id));
                    let _ = respond_to.send(result);
                }
                DbCommand::UnsyncedCountFor { entity, entity_id, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::sync_queue_dao(conn).unsynced_count_for(entity, &entity_id));
                    let _ = respond_to.send(result);
                }
                DbCommand::MarkEntryStatus { entry_id, status, error, respond_to } => {
                    let result = self.conn().and_then(|conn| {
                        DaoFactory::sync_queue_dao(conn).mark_status(entry_id, status, error.as_deref())
                    });
                    let _ = respond_to.send(result);
                }
                DbCommand::RequeueFailed { max_attempts, respond_to } => {
                    let result = self
                        .conn()
                        .and_then(|conn| DaoFactory::sync_queue_dao(conn).requeue_failed(max_attempts));
                    let _ = respond_to.send(result);
                }
                DbCommand::QueueStats { respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::sync_queue_dao(conn).stats());
                    let _ = respond_to.send(result);
                }
                DbCommand::ClearQueue { respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::sync_queue_dao(conn).clear());
                    let _ = respond_to.send(result);
                }
                DbCommand::GetMeta { key, respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::meta_dao(conn).get(&key));
                    let _ = respond_to.send(result);
                }
                DbCommand::SetMeta { key, value, respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::meta_dao(conn).set(&key, &value));
                    let _ = respond_to.send(result);
                }
                DbCommand::DeleteMeta { key, respond_to } => {
                    let result = self.conn().and_then(|conn| DaoFactory::meta_dao(conn).delete(&key));
                    let _ = respond_to.send(result);
                }
            }
        }

        debug!("DbActor 已退出");
    }

    fn handle_create(&mut self, entity: EntityType, data: Map<String, Value>) -> Result<Record> {
        let conn = self.conn()?;
        let id = data
            .get(fields::ID)
            .and_then(id_from_value)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = now_iso();

        dao::in_transaction(conn, |conn| {
            let records = DaoFactory::record_dao(conn, entity);
            // 同 id 重复 create 覆盖原行（保留原 created_at），仍然追加一条 create
            let existing = records.get_by_id(&id)?;
            let record = Record {
                id: id.clone(),
                fields: Record::strip_bookkeeping(data),
                created_at: existing.as_ref().map(|r| r.created_at.clone()).unwrap_or_else(|| now.clone()),
                updated_at: now.clone(),
                sync_status: SyncStatus::Pending,
                last_synced: existing.and_then(|r| r.last_synced),
            };
            records.upsert(&record)?;
            DaoFactory::sync_queue_dao(conn).insert(entity, &id, SyncOperation::Create, &record.to_value(), &now)?;
            debug!("📝 本地创建 {} id={}", entity, id);
            Ok(record)
        })
    }

    fn handle_update(&mut self, entity: EntityType, id: &str, patch: Map<String, Value>) -> Result<Record> {
        let conn = self.conn()?;
        let now = now_iso();

        dao::in_transaction(conn, |conn| {
            let records = DaoFactory::record_dao(conn, entity);
            let mut record = records
                .get_by_id(id)?
                .ok_or_else(|| not_found(entity))?;
            let password_changed = patch.contains_key(fields::PASSWORD);
            record.fields.extend(Record::strip_bookkeeping(patch));
            record.updated_at = now.clone();
            // 任何更新都使同步状态失效
            record.sync_status = SyncStatus::Pending;
            records.upsert(&record)?;

            // 本地缓存的密码哈希只在本次修改了密码时才随快照上传
            let mut snapshot = record.to_value();
            if !password_changed {
                if let Value::Object(map) = &mut snapshot {
                    map.remove(fields::PASSWORD);
                }
            }
            DaoFactory::sync_queue_dao(conn).insert(entity, id, SyncOperation::Update, &snapshot, &now)?;
            debug!("📝 本地更新 {} id={}", entity, id);
            Ok(record)
        })
    }

    fn handle_delete(&mut self, entity: EntityType, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let now = now_iso();

        dao::in_transaction(conn, |conn| {
            if !DaoFactory::record_dao(conn, entity).delete(id)? {
                return Err(not_found(entity));
            }
            DaoFactory::sync_queue_dao(conn).insert(entity, id, SyncOperation::Delete, &json!({ "id": id }), &now)?;
            debug!("🗑️ 本地删除 {} id={}", entity, id);
            Ok(())
        })
    }

    fn handle_apply_remote(&mut self, entity: EntityType, data: Map<String, Value>) -> Result<Record> {
        let conn = self.conn()?;
        let id = data
            .get(fields::ID)
            .and_then(id_from_value)
            .ok_or_else(|| EdubillSDKError::InvalidInput(format!("远端 {} 记录缺少 id", entity)))?;
        let now = now_iso();
        let remote_ts = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        let created_at = remote_ts(fields::CREATED_AT);
        let updated_at = remote_ts(fields::UPDATED_AT);

        let records = DaoFactory::record_dao(conn, entity);
        let existing = records.get_by_id(&id)?;
        // 远端字段覆盖本地字段，远端没有的本地字段（如离线登录用的密码哈希）保留
        let mut merged = existing.as_ref().map(|r| r.fields.clone()).unwrap_or_default();
        merged.extend(Record::strip_bookkeeping(data));

        let record = Record {
            id,
            fields: merged,
            created_at: created_at
                .or_else(|| existing.as_ref().map(|r| r.created_at.clone()))
                .unwrap_or_else(|| now.clone()),
            updated_at: updated_at.unwrap_or_else(|| now.clone()),
            sync_status: SyncStatus::Synced,
            last_synced: Some(now),
        };
        records.upsert(&record)?;
        Ok(record)
    }
}

/// DB Actor 句柄
#[derive(Clone)]
pub struct DbActorHandle {
    sender: Sender<DbCommand>,
}

impl std::fmt::Debug for DbActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbActorHandle").field("sender", &"<channel>").finish()
    }
}

impl DbActorHandle {
    /// 启动 DB Actor 专用线程
    pub fn spawn(db_path: PathBuf) -> Result<Self> {
        let (sender, receiver) = unbounded();
        thread::Builder::new()
            .name("edubill-db-actor".to_string())
            .spawn(move || DbActor::new(receiver, db_path).run())
            .map_err(|e| {
                error!("❌ 无法启动 DB Actor 线程: {}", e);
                EdubillSDKError::Storage(format!("无法启动 DB Actor 线程: {}", e))
            })?;
        Ok(Self { sender })
    }

    /// 发送命令并等待结果
    pub async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .map_err(|_| EdubillSDKError::ActorStopped)?;
        rx.await.map_err(|_| EdubillSDKError::ActorStopped)?
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(DbCommand::Shutdown);
    }
}
