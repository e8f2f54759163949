//! sync_queue 表 DAO - 待同步操作日志

use rusqlite::{params, Connection, Row};
use serde_json::Value;

use crate::error::{EdubillSDKError, Result};
use crate::storage::entities::{QueueEntry, QueueStats, QueueStatus, SyncOperation};
use crate::sync::EntityType;

const COLUMNS: &str = "id, entity, entity_id, operation, data, timestamp, attempts, status, last_error";

pub struct SyncQueueDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueueDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 追加一条待同步操作，返回自增 id
    pub fn insert(
        &self,
        entity: EntityType,
        entity_id: &str,
        operation: SyncOperation,
        data: &Value,
        timestamp: &str,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO sync_queue (entity, entity_id, operation, data, timestamp, attempts, status)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 'pending')
            "#,
            params![
                entity.as_str(),
                entity_id,
                operation.as_str(),
                serde_json::to_string(data)?,
                timestamp,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 所有 pending 条目，按入队时间升序（同一时刻按 id）
    pub fn pending(&self) -> Result<Vec<QueueEntry>> {
        self.select(
            &format!(
                "SELECT {} FROM sync_queue WHERE status = 'pending' ORDER BY timestamp ASC, id ASC",
                COLUMNS
            ),
            params![],
        )
    }

    pub fn entries_for(&self, entity: EntityType, entity_id: &str) -> Result<Vec<QueueEntry>> {
        self.select(
            &format!(
                "SELECT {} FROM sync_queue WHERE entity = ?1 AND entity_id = ?2 ORDER BY timestamp ASC, id ASC",
                COLUMNS
            ),
            params![entity.as_str(), entity_id],
        )
    }

    pub fn pending_count_for(&self, entity: EntityType, entity_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE entity = ?1 AND entity_id = ?2 AND status = 'pending'",
            params![entity.as_str(), entity_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// pending + failed 条目数（尚未被远端确认的修改）
    pub fn unsynced_count_for(&self, entity: EntityType, entity_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE entity = ?1 AND entity_id = ?2 AND status != 'synced'",
            params![entity.as_str(), entity_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// 设置状态并累加尝试次数；条目不存在返回 false
    pub fn mark_status(&self, entry_id: i64, status: QueueStatus, error: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE sync_queue SET status = ?1, attempts = attempts + 1, last_error = ?2 WHERE id = ?3",
            params![status.as_str(), error, entry_id],
        )?;
        Ok(changed > 0)
    }

    /// 把未达上限的 failed 条目放回 pending，返回数量
    pub fn requeue_failed(&self, max_attempts: u32) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'failed' AND attempts < ?1",
            params![max_attempts],
        )?;
        Ok(changed)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            match status.parse::<QueueStatus>()? {
                QueueStatus::Pending => stats.pending = count as u64,
                QueueStatus::Synced => stats.synced = count as u64,
                QueueStatus::Failed => stats.failed = count as u64,
            }
        }
        Ok(stats)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }

    fn select<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawEntry::from_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_entry()?);
        }
        Ok(out)
    }
}

struct RawEntry {
    id: i64,
    entity: String,
    entity_id: String,
    operation: String,
    data: String,
    timestamp: String,
    attempts: i64,
    status: String,
    last_error: Option<String>,
}

impl RawEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity: row.get(1)?,
            entity_id: row.get(2)?,
            operation: row.get(3)?,
            data: row.get(4)?,
            timestamp: row.get(5)?,
            attempts: row.get(6)?,
            status: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<QueueEntry> {
        let entity = self
            .entity
            .parse::<EntityType>()
            .map_err(|_| EdubillSDKError::Storage(format!("sync_queue 中未知实体: {}", self.entity)))?;
        Ok(QueueEntry {
            id: self.id,
            entity,
            entity_id: self.entity_id,
            operation: self.operation.parse()?,
            data: serde_json::from_str(&self.data)?,
            timestamp: self.timestamp,
            attempts: self.attempts.max(0) as u32,
            status: self.status.parse()?,
            last_error: self.last_error,
        })
    }
}
