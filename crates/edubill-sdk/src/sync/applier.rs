//! 阶段二：把远端增量写入本地
//!
//! 本地仍有未被远端确认的修改（pending 记录，或 pending/failed 队列条目，包括离线删除）时跳过，
//! 其余直接覆盖并标记 synced。

use serde_json::Value;
use tracing::{debug, warn};

use super::EntityType;
use crate::error::Result;
use crate::storage::{fields, id_from_value, LocalStore, SyncStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub downloaded: usize,
    pub skipped: usize,
}

pub async fn apply_remote_changes(
    store: &LocalStore,
    entity: EntityType,
    items: Vec<Value>,
) -> Result<DownloadOutcome> {
    let mut outcome = DownloadOutcome::default();

    for item in items {
        let Some(id) = item.get(fields::ID).and_then(id_from_value) else {
            warn!("远端 {} 记录缺少 id，已忽略", entity);
            continue;
        };

        let local_pending = store
            .get_by_id(entity, &id)
            .await?
            .is_some_and(|local| local.sync_status == SyncStatus::Pending);
        if local_pending || store.unsynced_count_for(entity, &id).await? > 0 {
            debug!("⏭️ 跳过本地未同步修改 {} {}", entity, id);
            outcome.skipped += 1;
            continue;
        }

        store.apply_remote(entity, item).await?;
        outcome.downloaded += 1;
    }

    Ok(outcome)
}
