use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 对外统一的凭证错误文案（离线/在线登录失败都用它，不区分「用户不存在」与「密码错误」）
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

#[derive(Debug, Error)]
pub enum EdubillSDKError {
    /// 本地不存在的实体
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// 当前会话/角色无权执行该操作
    #[error("{0}")]
    NotAuthorized(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    /// 本地存储引擎错误（磁盘、损坏、约束）
    #[error("Storage error: {0}")]
    Storage(String),
    /// 远端调用失败：连接、超时、非 2xx
    #[error("Network error: {0}")]
    Network(String),
    /// 远端返回 2xx 但 envelope 中 success=false
    #[error("{message}")]
    Remote { status: u16, message: String },
    /// 需要联网的接口在离线时调用
    #[error("{0}")]
    Unavailable(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Config error: {0}")]
    Config(String),
    /// DB Actor 线程已退出
    #[error("Storage error: database actor stopped")]
    ActorStopped,
}

/// 稳定的错误码，写入响应 envelope 的 `error` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidCredentials,
    NotAuthorized,
    NotAuthenticated,
    StorageError,
    NetworkError,
    Unavailable,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::StorageError => "STORAGE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Unavailable => "UNAVAILABLE",
            Self::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl EdubillSDKError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::NotAuthorized(_) => ErrorKind::NotAuthorized,
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::Storage(_) | Self::ActorStopped => ErrorKind::StorageError,
            Self::Network(_) | Self::Remote { .. } => ErrorKind::NetworkError,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::InvalidInput(_) | Self::Serialization(_) | Self::Config(_) => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// 远端层面的失败（Router 据此回退离线路径）
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Remote { .. })
    }
}

impl From<rusqlite::Error> for EdubillSDKError {
    fn from(error: rusqlite::Error) -> Self {
        EdubillSDKError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for EdubillSDKError {
    fn from(error: serde_json::Error) -> Self {
        EdubillSDKError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for EdubillSDKError {
    fn from(error: reqwest::Error) -> Self {
        EdubillSDKError::Network(error.to_string())
    }
}

impl From<std::io::Error> for EdubillSDKError {
    fn from(error: std::io::Error) -> Self {
        EdubillSDKError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EdubillSDKError>;
