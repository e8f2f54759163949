//! 实体记录 DAO - users / schools 表共用
//!
//! 业务字段整体以 JSON 存在 data 列，过滤条件通过 json_extract 做精确匹配。

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use crate::error::{EdubillSDKError, Result};
use crate::storage::entities::{fields, Record, RecordFilter, SyncStatus};
use crate::sync::EntityType;

const COLUMNS: &str = "id, data, created_at, updated_at, sync_status, last_synced";

pub struct RecordDao<'a> {
    conn: &'a Connection,
    entity: EntityType,
}

impl<'a> RecordDao<'a> {
    pub fn new(conn: &'a Connection, entity: EntityType) -> Self {
        Self { conn, entity }
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", COLUMNS, self.entity.table());
        let raw = self
            .conn
            .query_row(&sql, params![id], RawRecord::from_row)
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT {} FROM {} WHERE 1=1", COLUMNS, self.entity.table());
        let mut args: Vec<SqlValue> = Vec::new();

        for (field, expected) in filter {
            let expr = match bookkeeping_column(field) {
                Some(column) => column.to_string(),
                None => {
                    args.push(SqlValue::Text(json_path(field)?));
                    format!("json_extract(data, ?{})", args.len())
                }
            };
            args.push(json_to_sql(expected));
            sql.push_str(&format!(" AND {} IS ?{}", expr, args.len()));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), RawRecord::from_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_record()?);
        }
        Ok(out)
    }

    /// 写入完整记录（存在则覆盖）
    pub fn upsert(&self, record: &Record) -> Result<()> {
        let data = serde_json::to_string(&Value::Object(record.fields.clone()))?;
        let sql = format!(
            r#"
            INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                sync_status = excluded.sync_status,
                last_synced = excluded.last_synced
            "#,
            self.entity.table(),
            COLUMNS
        );
        self.conn.execute(
            &sql,
            params![
                record.id,
                data,
                record.created_at,
                record.updated_at,
                record.sync_status.as_str(),
                record.last_synced,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.entity.table());
        Ok(self.conn.execute(&sql, params![id])? > 0)
    }

    pub fn mark_synced(&self, id: &str, at: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET sync_status = ?1, last_synced = ?2 WHERE id = ?3",
            self.entity.table()
        );
        Ok(self.conn.execute(&sql, params![SyncStatus::Synced.as_str(), at, id])? > 0)
    }

    pub fn set_status(&self, id: &str, status: SyncStatus) -> Result<bool> {
        let sql = format!("UPDATE {} SET sync_status = ?1 WHERE id = ?2", self.entity.table());
        Ok(self.conn.execute(&sql, params![status.as_str(), id])? > 0)
    }
}

fn bookkeeping_column(field: &str) -> Option<&'static str> {
    match field {
        fields::ID => Some("id"),
        fields::CREATED_AT => Some("created_at"),
        fields::UPDATED_AT => Some("updated_at"),
        fields::SYNC_STATUS => Some("sync_status"),
        fields::LAST_SYNCED => Some("last_synced"),
        _ => None,
    }
}

fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || field.contains('"') {
        return Err(EdubillSDKError::InvalidInput(format!("非法过滤字段: {:?}", field)));
    }
    Ok(format!("$.\"{}\"", field))
}

/// JSON 值转 SQLite 值，与 json_extract 的返回类型保持一致（bool → 0/1，容器 → JSON 文本）
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

struct RawRecord {
    id: String,
    data: String,
    created_at: String,
    updated_at: String,
    sync_status: String,
    last_synced: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            sync_status: row.get(4)?,
            last_synced: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<Record> {
        let fields = match serde_json::from_str::<Value>(&self.data)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Record {
            id: self.id,
            fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
            sync_status: self.sync_status.parse()?,
            last_synced: self.last_synced,
        })
    }
}
