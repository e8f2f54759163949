//! 同步游标 - 最近一次成功同步的开始时间，存放在 sync_meta

use crate::error::Result;
use crate::storage::{meta_keys, LocalStore};
use crate::utils::parse_iso;

pub struct SyncCursorStore {
    store: LocalStore,
}

impl SyncCursorStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// `None` 表示从未成功同步过（下一次做全量下载）
    pub async fn last_sync_time(&self) -> Result<Option<String>> {
        let value = self.store.get_meta(meta_keys::LAST_SYNC_TIME).await?;
        // 无法解析的值按全量处理，避免把坏数据发给远端
        Ok(value.filter(|v| parse_iso(v).is_some()))
    }

    pub async fn set_last_sync_time(&self, at: &str) -> Result<()> {
        self.store.set_meta(meta_keys::LAST_SYNC_TIME, at).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.delete_meta(meta_keys::LAST_SYNC_TIME).await
    }
}
