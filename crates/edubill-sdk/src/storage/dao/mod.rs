//! 数据访问层 (DAO) - 每张表一个操作模块
//!
//! DAO 只借用 `&Connection`，由 DB Actor 线程调用，不跨线程持有连接。

pub mod meta;
pub mod record;
pub mod sync_queue;

pub use meta::MetaDao;
pub use record::RecordDao;
pub use sync_queue::SyncQueueDao;

use rusqlite::Connection;

use crate::error::{EdubillSDKError, Result};
use crate::sync::EntityType;

/// DAO 工厂
pub struct DaoFactory;

impl DaoFactory {
    pub fn record_dao(conn: &Connection, entity: EntityType) -> RecordDao<'_> {
        RecordDao::new(conn, entity)
    }

    pub fn sync_queue_dao(conn: &Connection) -> SyncQueueDao<'_> {
        SyncQueueDao::new(conn)
    }

    pub fn meta_dao(conn: &Connection) -> MetaDao<'_> {
        MetaDao::new(conn)
    }
}

/// 在单个事务中执行一次「写记录 + 追加队列」之类的组合操作
pub fn in_transaction<F, R>(conn: &Connection, f: F) -> Result<R>
where
    F: FnOnce(&Connection) -> Result<R>,
{
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EdubillSDKError::Storage(format!("开始事务失败: {}", e)))?;
    let result = f(&tx)?;
    tx.commit()
        .map_err(|e| EdubillSDKError::Storage(format!("提交事务失败: {}", e)))?;
    Ok(result)
}
