//! 数据库初始化与迁移 - 由 refinery 管理
//!
//! 统一入口 `init_db`：pragmas → migrate → 版本校验。
//! 新增表只需在 migrations/ 下添加 V{n}__{name}.sql，编译期嵌入。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;
use tracing::debug;

use crate::error::{EdubillSDKError, Result};
use crate::version::SDK_DB_VERSION;

const REFINERY_TABLE: &str = "refinery_schema_history";

/// 本地缓存 PRAGMA：WAL、NORMAL 同步、外键、内存临时表
const CACHE_PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA temp_store=MEMORY;
";

pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(CACHE_PRAGMAS.trim())
        .map_err(|e| EdubillSDKError::Storage(format!("设置 PRAGMA 失败: {}", e)))
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| EdubillSDKError::Storage(format!("执行 migration 失败: {}", e)))?;
    debug!("migration 完成: 本次应用 {} 个", report.applied_migrations().len());
    Ok(())
}

/// 当前数据库的 migration 版本；没有历史表时返回 None
fn db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
        [REFINERY_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    let version: Option<i64> = conn.query_row(
        &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
        [],
        |row| row.get(0),
    )?;
    Ok(version.filter(|&v| v > 0))
}

/// 数据库版本高于 SDK 支持的版本时拒绝打开（防降级后 schema 不兼容）
fn check_db_version(conn: &Connection) -> Result<()> {
    match db_migration_version(conn)? {
        Some(v) if v > SDK_DB_VERSION => Err(EdubillSDKError::Storage(format!(
            "数据库版本 {} 高于当前 SDK 支持的最高版本 {}",
            v, SDK_DB_VERSION
        ))),
        _ => Ok(()),
    }
}

/// 打开连接后调用一次；重复调用是幂等的（已应用的 migration 会被跳过）
pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    run_migrations(conn)?;
    check_db_version(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = Connection::open(dir.path().join("cache.db")).unwrap();
        init_db(&mut conn).unwrap();
        init_db(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        for expected in ["schools", "sync_meta", "sync_queue", "users"] {
            assert!(tables.iter().any(|t| t == expected), "缺少表 {}", expected);
        }
        assert_eq!(db_migration_version(&conn).unwrap(), Some(SDK_DB_VERSION));
    }
}
