//! 时间工具
//!
//! 所有持久化时间戳统一为 UTC RFC3339 毫秒精度（`2024-01-01T08:00:00.000Z`），
//! 定长格式保证字符串排序即时间排序（sync_queue 的 FIFO 依赖这一点）。

use chrono::{DateTime, SecondsFormat, Utc};

/// 当前时间的 ISO-8601 字符串
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解析 ISO-8601 字符串（兼容带时区偏移的写法）
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
