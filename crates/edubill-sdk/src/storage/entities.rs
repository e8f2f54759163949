//! 数据实体定义 - 本地缓存记录与同步队列条目

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{EdubillSDKError, Result};
use crate::sync::EntityType;

/// 记录中由存储层维护的字段名（业务字段里出现时会被剥离）
pub mod fields {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const SYNC_STATUS: &str = "syncStatus";
    pub const LAST_SYNCED: &str = "lastSynced";
    /// 用户密码（本地只存 Argon2 哈希）
    pub const PASSWORD: &str = "password";

    pub const BOOKKEEPING: &[&str] = &[ID, CREATED_AT, UPDATED_AT, SYNC_STATUS, LAST_SYNCED];
}

/// 精确匹配过滤条件：字段名 -> 期望值（`null` 匹配缺失或为 null 的字段）
pub type RecordFilter = Map<String, Value>;

/// 本地记录的同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// 有未被远端确认的本地修改
    #[default]
    Pending,
    /// 与最后已知的远端状态一致
    Synced,
    /// 最近一次同步失败
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = EdubillSDKError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(EdubillSDKError::Storage(format!("未知 sync_status: {}", other))),
        }
    }
}

/// 同步队列条目状态（与记录状态取值相同，但生命周期独立）
pub type QueueStatus = SyncStatus;

/// 待同步操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SyncOperation {
    type Err = EdubillSDKError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(EdubillSDKError::Storage(format!("未知 operation: {}", other))),
        }
    }
}

/// id 允许是字符串或数字（远端历史数据里可能出现数字 id）
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 统一的 NotFound 文案："User not found"
pub fn not_found(entity: EntityType) -> EdubillSDKError {
    EdubillSDKError::NotFound(format!("{} not found", entity.display_name()))
}

/// 本地缓存的一条实体记录（User、School 等）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    /// 业务字段（不含 id / 时间戳 / 同步元数据）
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
}

impl Record {
    /// 从业务字段中剥离存储层维护的字段
    pub fn strip_bookkeeping(mut data: Map<String, Value>) -> Map<String, Value> {
        for key in fields::BOOKKEEPING {
            data.remove(*key);
        }
        data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// 完整 JSON 表示（业务字段 + 元数据，camelCase）
    pub fn to_value(&self) -> Value {
        let mut out = self.fields.clone();
        out.insert(fields::ID.into(), Value::String(self.id.clone()));
        out.insert(fields::CREATED_AT.into(), Value::String(self.created_at.clone()));
        out.insert(fields::UPDATED_AT.into(), Value::String(self.updated_at.clone()));
        out.insert(
            fields::SYNC_STATUS.into(),
            Value::String(self.sync_status.as_str().to_string()),
        );
        if let Some(last_synced) = &self.last_synced {
            out.insert(fields::LAST_SYNCED.into(), Value::String(last_synced.clone()));
        }
        Value::Object(out)
    }
}

/// 同步队列条目：一次待上传的本地修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: i64,
    pub entity: EntityType,
    pub entity_id: String,
    pub operation: SyncOperation,
    /// 入队时刻的记录快照；delete 只携带 id
    pub data: Value,
    pub timestamp: String,
    pub attempts: u32,
    pub status: QueueStatus,
    pub last_error: Option<String>,
}

/// 同步队列统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.synced + self.failed
    }
}
