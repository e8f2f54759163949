//! SDK 配置与协调对象
//!
//! `EdubillSDK` 持有本地存储、连接状态、会话、混合路由与同步管理器，
//! 负责它们的创建顺序与生命周期；业务代码只和它打交道。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{ApiRequest, ApiResponse, AuthAction, Endpoint, HybridApiRouter, Method};
use crate::error::{EdubillSDKError, Result};
use crate::network::{ConnectionManager, ConnectivityProbe, NetworkStatus};
use crate::remote::{HttpRemoteApi, RemoteApi};
use crate::session::AuthSession;
use crate::storage::LocalStore;
use crate::sync::manager::SyncManagerConfig;
use crate::sync::{EntityType, SyncEvent, SyncManager, SyncStatusSnapshot, Unsubscribe};

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// Edubill SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdubillConfig {
    /// 远端后端地址，例如 `https://api.example.com`
    pub base_url: String,
    /// 数据目录（数据库文件 edubill.db 放在这里）
    pub data_dir: PathBuf,
    /// 定时同步间隔（秒），0 表示只在网络恢复或手动时同步
    pub sync_interval_secs: u64,
    /// 连通性探测间隔（秒），0 表示不探测，由平台层调用 `set_online`
    pub probe_interval_secs: u64,
    /// 失败条目的最大尝试次数
    pub max_sync_attempts: u32,
    /// 下载阶段拉取的实体
    pub tracked_entities: Vec<EntityType>,
    pub http_client_config: HttpClientConfig,
}

impl Default for EdubillConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            data_dir: get_default_data_dir(),
            sync_interval_secs: 300,
            probe_interval_secs: 30,
            max_sync_attempts: 5,
            tracked_entities: EntityType::ALL.to_vec(),
            http_client_config: HttpClientConfig::default(),
        }
    }
}

/// 默认数据目录 ~/.edubill/
fn get_default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".edubill"))
        .unwrap_or_else(|_| PathBuf::from("./edubill_data"))
}

impl EdubillConfig {
    pub fn builder() -> EdubillConfigBuilder {
        EdubillConfigBuilder::new()
    }

    fn sync_manager_config(&self) -> SyncManagerConfig {
        SyncManagerConfig {
            sync_interval: Duration::from_secs(self.sync_interval_secs),
            max_sync_attempts: self.max_sync_attempts,
            tracked_entities: self.tracked_entities.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(EdubillSDKError::Config("base_url 不能为空".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(EdubillSDKError::Config(format!(
                "base_url 必须是 http(s) 地址: {}",
                base_url
            )));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(EdubillSDKError::Config("数据目录不能为空".to_string()));
        }
        if self.max_sync_attempts == 0 {
            return Err(EdubillSDKError::Config("max_sync_attempts 至少为 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EdubillConfigBuilder {
    config: EdubillConfig,
}

impl EdubillConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn sync_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync_interval_secs = secs;
        self
    }

    pub fn probe_interval_secs(mut self, secs: u64) -> Self {
        self.config.probe_interval_secs = secs;
        self
    }

    pub fn max_sync_attempts(mut self, attempts: u32) -> Self {
        self.config.max_sync_attempts = attempts;
        self
    }

    pub fn tracked_entities<I: IntoIterator<Item = EntityType>>(mut self, entities: I) -> Self {
        self.config.tracked_entities = entities.into_iter().collect();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn build(self) -> EdubillConfig {
        self.config
    }
}

pub struct EdubillSDK {
    config: EdubillConfig,
    store: LocalStore,
    connection: Arc<ConnectionManager>,
    session: AuthSession,
    router: HybridApiRouter,
    sync: Arc<SyncManager>,
    shutting_down: AtomicBool,
}

impl EdubillSDK {
    /// 初始化：存储 → 远端客户端 → 连接状态 → 会话 → 路由 → 同步管理器
    pub async fn initialize(config: EdubillConfig) -> Result<Arc<Self>> {
        info!("正在初始化 EdubillSDK ({})", crate::version::build_summary());
        config.validate()?;

        let remote = Arc::new(HttpRemoteApi::new(config.base_url.trim(), &config.http_client_config)?);
        // 不探测时假设在线，由平台层负责纠正
        let initial = if config.probe_interval_secs > 0 {
            NetworkStatus::Offline
        } else {
            NetworkStatus::Online
        };
        let sdk = Self::assemble(config, remote.clone(), initial).await?;

        if sdk.config.probe_interval_secs > 0 {
            let probe: Arc<dyn ConnectivityProbe> = remote;
            sdk.connection
                .start_probe(Duration::from_secs(sdk.config.probe_interval_secs), probe);
        }
        sdk.restore_session().await?;
        sdk.sync.start();

        info!("EdubillSDK 初始化完成: data_dir={}", sdk.config.data_dir.display());
        Ok(sdk)
    }

    /// 组装各组件（不启动探测与定时器）
    pub(crate) async fn assemble(
        config: EdubillConfig,
        remote: Arc<dyn RemoteApi>,
        initial: NetworkStatus,
    ) -> Result<Arc<Self>> {
        let store = LocalStore::open_in_dir(&config.data_dir).await?;
        let connection = Arc::new(ConnectionManager::new(initial));
        let session = AuthSession::new();
        let router = HybridApiRouter::new(store.clone(), remote.clone(), connection.clone(), session.clone());
        let sync = Arc::new(SyncManager::new(
            store.clone(),
            remote,
            connection.clone(),
            session.clone(),
            config.sync_manager_config(),
        ));

        Ok(Arc::new(Self {
            config,
            store,
            connection,
            session,
            router,
            sync,
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &EdubillConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn sync_manager(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    // ------------------------------------------------------------------
    // 请求
    // ------------------------------------------------------------------

    pub async fn request(&self, request: ApiRequest) -> ApiResponse {
        if self.shutting_down.load(Ordering::Acquire) {
            return ApiResponse::failure(&EdubillSDKError::Unavailable("SDK 已关闭".into()));
        }
        self.router.request(request).await
    }

    /// `sdk.request_path("/users/42", "GET", None)`
    pub async fn request_path(&self, path: &str, method: &str, body: Option<Value>) -> ApiResponse {
        match ApiRequest::from_parts(path, method, body) {
            Ok(request) => self.request(request).await,
            Err(e) => ApiResponse::failure(&e),
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> ApiResponse {
        self.request(ApiRequest::login(identifier, password)).await
    }

    pub async fn me(&self) -> ApiResponse {
        self.request(ApiRequest::new(Endpoint::Auth(AuthAction::Me), Method::Get, None))
            .await
    }

    pub async fn logout(&self) -> ApiResponse {
        self.request(ApiRequest::new(Endpoint::Auth(AuthAction::Logout), Method::Post, None))
            .await
    }

    /// 启动时恢复上次登录的 token
    pub async fn restore_session(&self) -> Result<bool> {
        self.router.auth().restore_session().await
    }

    // ------------------------------------------------------------------
    // 同步 / 网络
    // ------------------------------------------------------------------

    pub async fn sync_now(&self) -> bool {
        self.sync.sync_now().await
    }

    pub fn add_sync_listener<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.sync.add_listener(listener)
    }

    pub async fn sync_status(&self) -> Result<SyncStatusSnapshot> {
        self.sync.status().await
    }

    /// 平台层上报网络状态（离线 → 在线会触发同步）
    pub async fn set_online(&self, online: bool) {
        self.connection.set_online(online).await;
    }

    pub async fn is_online(&self) -> bool {
        self.connection.is_online().await
    }

    /// 停止定时器、探测与 DB Actor；之后的请求返回失败响应
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            warn!("EdubillSDK 已经关闭");
            return Ok(());
        }
        info!("正在关闭 EdubillSDK...");
        self.sync.stop();
        self.connection.stop_probe();
        self.store.shutdown();
        info!("EdubillSDK 关闭完成");
        Ok(())
    }
}
