//! 阶段一：按 FIFO 顺序上传 sync_queue 中的 pending 条目
//!
//! 单条失败只标记该条目为 failed 并继续；存储层错误才会中断整个阶段。
//! 条目尝试次数用尽时，对应记录也标记为 failed。

use serde_json::Value;
use tracing::{debug, warn};

use super::{SyncEvent, SyncListeners, SyncPhase};
use crate::api::{ApiResponse, Endpoint, Method};
use crate::error::Result;
use crate::remote::RemoteApi;
use crate::storage::{fields, LocalStore, QueueEntry, QueueStatus, SyncOperation, SyncStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub uploaded: usize,
    pub failed: usize,
}

/// 队列条目对应的远端调用
pub fn remote_call(entry: &QueueEntry) -> (String, Method, Option<&Value>) {
    match entry.operation {
        SyncOperation::Create => (
            Endpoint::entity(entry.entity).path(),
            Method::Post,
            Some(&entry.data),
        ),
        SyncOperation::Update => (
            Endpoint::entity_id(entry.entity, entry.entity_id.as_str()).path(),
            Method::Put,
            Some(&entry.data),
        ),
        SyncOperation::Delete => (
            Endpoint::entity_id(entry.entity, entry.entity_id.as_str()).path(),
            Method::Delete,
            None,
        ),
    }
}

pub async fn upload_pending(
    store: &LocalStore,
    remote: &dyn RemoteApi,
    token: Option<&str>,
    max_attempts: u32,
    listeners: &SyncListeners,
) -> Result<UploadOutcome> {
    let entries = store.get_pending().await?;
    let total = entries.len();
    let mut outcome = UploadOutcome::default();

    for (index, entry) in entries.iter().enumerate() {
        let (path, method, body) = remote_call(entry);
        debug!("⬆️ 上传队列条目 id={} {} {}", entry.id, method, path);

        match remote.request(&path, method, body, token).await {
            Ok(response) => {
                store.mark_entry_status(entry.id, QueueStatus::Synced, None).await?;
                confirm_entity(store, entry, response).await?;
                outcome.uploaded += 1;
            }
            Err(e) => {
                warn!(
                    "上传失败 entry_id={} entity={} entity_id={} error={}",
                    entry.id, entry.entity, entry.entity_id, e
                );
                store
                    .mark_entry_status(entry.id, QueueStatus::Failed, Some(e.to_string()))
                    .await?;
                if entry.attempts + 1 >= max_attempts
                    && store.mark_record_status(entry.entity, &entry.entity_id, SyncStatus::Failed).await?
                {
                    warn!("❌ {} {} 重试次数已用尽，记录标记为 failed", entry.entity, entry.entity_id);
                }
                outcome.failed += 1;
            }
        }

        listeners.notify(&SyncEvent::Progress {
            phase: SyncPhase::Upload,
            current: index + 1,
            total,
        });
    }

    Ok(outcome)
}

/// 该实体已没有 pending 条目时，合并远端规范数据并标记 synced
async fn confirm_entity(store: &LocalStore, entry: &QueueEntry, response: ApiResponse) -> Result<()> {
    if entry.operation == SyncOperation::Delete {
        return Ok(());
    }
    if store.pending_count_for(entry.entity, &entry.entity_id).await? > 0 {
        debug!("{} {} 仍有待上传修改，暂不标记 synced", entry.entity, entry.entity_id);
        return Ok(());
    }
    if store.get_by_id(entry.entity, &entry.entity_id).await?.is_none() {
        return Ok(());
    }

    match response.data {
        Some(Value::Object(mut canonical)) => {
            canonical
                .entry(fields::ID.to_string())
                .or_insert_with(|| Value::String(entry.entity_id.clone()));
            store.apply_remote(entry.entity, Value::Object(canonical)).await?;
        }
        _ => {
            store.mark_synced(entry.entity, &entry.entity_id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::sync::EntityType;

    fn entry(operation: SyncOperation) -> QueueEntry {
        QueueEntry {
            id: 1,
            entity: EntityType::Users,
            entity_id: "u1".into(),
            operation,
            data: json!({"id": "u1", "name": "Ali"}),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            attempts: 0,
            status: QueueStatus::Pending,
            last_error: None,
        }
    }

    #[test]
    fn maps_operations_to_remote_calls() {
        let create = entry(SyncOperation::Create);
        let (path, method, body) = remote_call(&create);
        assert_eq!((path.as_str(), method), ("/users", Method::Post));
        assert_eq!(body, Some(&create.data));

        let update = entry(SyncOperation::Update);
        let (path, method, _) = remote_call(&update);
        assert_eq!((path.as_str(), method), ("/users/u1", Method::Put));

        let delete = entry(SyncOperation::Delete);
        let (path, method, body) = remote_call(&delete);
        assert_eq!((path.as_str(), method, body), ("/users/u1", Method::Delete, None));
    }
}
