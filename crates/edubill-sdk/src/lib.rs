//! Edubill SDK - 学校计费应用的离线优先同步核心
//!
//! 本 SDK 提供：
//! - 💾 本地存储：SQLite 实体表 + sync_queue 变更日志
//! - 📡 网络状态监控（平台上报或主动探测）
//! - 🔄 同步管理：先上传再下载，本地未上传修改优先
//! - 🌐 混合 API 路由：在线走远端，失败或离线回退本地处理，支持离线登录
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use edubill_sdk::{ApiRequest, EdubillConfig, EdubillSDK, EntityType};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     edubill_sdk::init_tracing(false);
//!
//!     let config = EdubillConfig::builder()
//!         .base_url("https://api.example.com")
//!         .data_dir("/path/to/data")
//!         .build();
//!     let sdk = EdubillSDK::initialize(config).await?;
//!
//!     let login = sdk.login("admin@school.edu", "password").await;
//!     println!("登录: {}", login.success);
//!
//!     let _unsubscribe = sdk.add_sync_listener(|event| println!("同步事件: {:?}", event));
//!
//!     let created = sdk
//!         .request(ApiRequest::create(
//!             EntityType::Schools,
//!             json!({ "name": "North High" }),
//!         ))
//!         .await;
//!     println!("创建学校: {:?}", created.data);
//!
//!     sdk.sync_now().await;
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod network;
pub mod remote;
pub mod sdk;
pub mod session;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

pub use api::{ApiRequest, ApiResponse, AuthAction, Endpoint, EntityOperation, HybridApiRouter, Method};
pub use error::{EdubillSDKError, ErrorKind, Result};
pub use network::{ConnectionManager, ConnectivityProbe, NetworkStatus, NetworkStatusEvent};
pub use remote::{HttpRemoteApi, RemoteApi};
pub use sdk::{EdubillConfig, EdubillConfigBuilder, EdubillSDK, HttpClientConfig};
pub use session::AuthSession;
pub use storage::{LocalStore, QueueEntry, QueueStatus, Record, SyncOperation, SyncStatus};
pub use sync::{
    EntityType, SyncEvent, SyncManager, SyncPhase, SyncState, SyncStatusSnapshot, SyncSummary,
    Unsubscribe,
};

/// 初始化全局 tracing 订阅者；`RUST_LOG` 优先，重复调用无副作用
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
