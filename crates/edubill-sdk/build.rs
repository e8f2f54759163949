//! 编译期元信息：
//! - vergen 生成 VERGEN_BUILD_TIMESTAMP / VERGEN_GIT_SHA（供 version.rs 使用）
//! - SDK_DB_VERSION：migrations/ 下 V{n}__{name}.sql 的最大 n

use std::env;
use std::fs;
use std::path::Path;
use vergen::EmitBuilder;

fn main() {
    // 不在 git 仓库中构建时 vergen 会输出占位值，不中断编译
    let _ = EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit();

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let migrations_dir = Path::new(&manifest_dir).join("migrations");

    let max_version = fs::read_dir(&migrations_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter_map(|name| migration_version(&name))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    println!("cargo:rustc-env=SDK_DB_VERSION={}", max_version);
    println!("cargo:rerun-if-changed=migrations/");
}

/// refinery 文件名格式: V{version}__{name}.sql
fn migration_version(file_name: &str) -> Option<i64> {
    let stem = file_name.strip_prefix('V')?.strip_suffix(".sql")?;
    let (version, _) = stem.split_once("__")?;
    version.parse().ok()
}
