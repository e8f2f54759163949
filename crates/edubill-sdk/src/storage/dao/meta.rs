//! sync_meta 表 - 同步游标、最近一次 token 等少量键值

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::utils::now_iso;

pub struct MetaDao<'a> {
    conn: &'a Connection,
}

impl<'a> MetaDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM sync_meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sync_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, now_iso()],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM sync_meta WHERE key = ?1", params![key])?;
        Ok(())
    }
}
