//! 密码哈希（Argon2），计算放到阻塞线程池，避免卡住异步运行时

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::error::{EdubillSDKError, Result};

pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| EdubillSDKError::InvalidInput(format!("密码哈希失败: {}", e)))
    })
    .await
    .map_err(|e| EdubillSDKError::Storage(format!("密码哈希任务失败: {}", e)))?
}

/// 校验失败、哈希格式非法都返回 false
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .unwrap_or(false)
}

/// 已经是 PHC 格式的 Argon2 哈希（避免重复哈希远端/快照中的值）
pub fn is_hashed(value: &str) -> bool {
    value.starts_with("$argon2")
}
