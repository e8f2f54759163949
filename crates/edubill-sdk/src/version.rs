//! SDK 版本与构建元信息
//!
//! - SDK 版本 → Cargo.toml
//! - 数据库 schema 版本 → migrations/ 文件名（refinery 管理）

/// SDK semver，来自 Cargo.toml
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// git commit（build.rs 中由 vergen 生成）
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

/// 构建时间（build.rs 中由 vergen 生成）
pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// 当前 SDK 支持的最高 migration 版本（build.rs 扫描 migrations/ 得出）。
/// 打开的数据库版本高于此值时拒绝使用。
pub const SDK_DB_VERSION: i64 = parse_db_version(env!("SDK_DB_VERSION"));

const fn parse_db_version(s: &str) -> i64 {
    let bytes = s.as_bytes();
    let mut value = 0i64;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            value = value * 10 + (bytes[i] - b'0') as i64;
        }
        i += 1;
    }
    value
}

/// 启动日志用的一行版本摘要
pub fn build_summary() -> String {
    format!("edubill-sdk {} (git {}, built {}, db v{})", SDK_VERSION, GIT_SHA, BUILD_TIME, SDK_DB_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_version_matches_shipped_migrations() {
        assert!(SDK_DB_VERSION >= 1);
        assert_eq!(parse_db_version("12"), 12);
    }
}
