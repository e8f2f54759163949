//! 认证子协议
//!
//! - login: 在线优先；远端失败或离线时用本地缓存的密码哈希校验
//! - me: 会话中的用户，或从 token 解出用户 id 后从本地加载
//! - logout: 无条件清空会话
//! - 其他认证接口只能在线调用

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::handlers::{sanitize, value_to_id, PASSWORD_FIELD};
use super::password::{hash_password, is_hashed, verify_password};
use super::{ApiResponse, AuthAction, Endpoint, Method};
use crate::error::{EdubillSDKError, Result};
use crate::network::ConnectionManager;
use crate::remote::RemoteApi;
use crate::session::AuthSession;
use crate::storage::{meta_keys, LocalStore, Record, RecordFilter};
use crate::sync::EntityType;
use crate::utils::now_iso;

pub const OFFLINE_TOKEN_PREFIX: &str = "offline_";

const LAST_LOGIN_FIELD: &str = "lastLogin";
const IDENTIFIER_FIELDS: &[&str] = &["email", "username"];
const TOKEN_ID_CLAIMS: &[&str] = &["id", "userId", "sub"];
/// 未知用户时参与校验的占位口令
const DUMMY_PASSWORD: &str = "edubill-offline-login-placeholder";

/// `offline_<uuid>_<userId>`
pub fn offline_token(user_id: &str) -> String {
    format!("{}{}_{}", OFFLINE_TOKEN_PREFIX, uuid::Uuid::new_v4(), user_id)
}

pub fn is_offline_token(token: &str) -> bool {
    token.starts_with(OFFLINE_TOKEN_PREFIX)
}

/// 从 token 中取出用户 id：离线 token 按位置取，JWT 解码 payload 段（不验签）
pub fn user_id_from_token(token: &str) -> Option<String> {
    if is_offline_token(token) {
        return token
            .splitn(3, '_')
            .nth(2)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    TOKEN_ID_CLAIMS
        .iter()
        .find_map(|claim| value_to_id(claims.get(*claim)))
}

pub struct AuthService {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    connection: Arc<ConnectionManager>,
    session: AuthSession,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connection: Arc<ConnectionManager>,
        session: AuthSession,
    ) -> Self {
        Self {
            store,
            remote,
            connection,
            session,
            dummy_hash: OnceCell::new(),
        }
    }

    pub async fn handle(
        &self,
        action: &AuthAction,
        method: Method,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        match action {
            AuthAction::Login => Ok(ApiResponse::ok(self.login(body.unwrap_or(Value::Null)).await?)),
            AuthAction::Me => Ok(ApiResponse::ok(self.me().await?)),
            AuthAction::Logout => Ok(self.logout().await),
            AuthAction::Other(_) => {
                let path = Endpoint::Auth(action.clone()).path();
                if !self.connection.is_online().await {
                    return Err(EdubillSDKError::Unavailable(format!(
                        "{} requires an internet connection",
                        path
                    )));
                }
                let token = self.session.token();
                self.remote
                    .request(&path, method, body.as_ref(), token.as_deref())
                    .await
            }
        }
    }

    /// 返回 `{ user, token, offline }`
    pub async fn login(&self, body: Value) -> Result<Value> {
        let identifier = IDENTIFIER_FIELDS
            .iter()
            .chain(std::iter::once(&"identifier"))
            .find_map(|f| body.get(*f).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string);
        let password = body
            .get(PASSWORD_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        let (Some(identifier), Some(password)) = (identifier, password) else {
            return Err(EdubillSDKError::InvalidInput(
                "Email/username and password are required".into(),
            ));
        };

        if self.connection.is_online().await {
            match self.login_online(&body, &password).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!("在线登录失败，回退离线登录: {}", e),
            }
        }
        self.login_offline(&identifier, &password).await
    }

    async fn login_online(&self, body: &Value, password: &str) -> Result<Value> {
        let path = Endpoint::Auth(AuthAction::Login).path();
        let response = self.remote.request(&path, Method::Post, Some(body), None).await?;
        let data = response.data.unwrap_or(Value::Null);
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| EdubillSDKError::Network("登录响应缺少 token".into()))?
            .to_string();
        let user = data.get("user").cloned().unwrap_or(Value::Null);

        // 缓存用户与密码哈希，供以后离线登录
        let public_user = match self.cache_user(&user, password).await {
            Ok(record) => sanitize(&record),
            Err(e) => {
                warn!("缓存登录用户失败: {}", e);
                strip_password(user)
            }
        };

        self.start_session(&token, public_user.clone()).await;
        info!("✅ 在线登录成功");
        Ok(json!({ "user": public_user, "token": token, "offline": false }))
    }

    async fn cache_user(&self, user: &Value, password: &str) -> Result<Record> {
        let mut local: Map<String, Value> = user
            .as_object()
            .cloned()
            .ok_or_else(|| EdubillSDKError::InvalidInput("登录响应缺少 user".into()))?;
        local.insert(PASSWORD_FIELD.into(), Value::String(hash_password(password).await?));
        local.insert(LAST_LOGIN_FIELD.into(), Value::String(now_iso()));
        self.store.apply_remote(EntityType::Users, Value::Object(local)).await
    }

    async fn login_offline(&self, identifier: &str, password: &str) -> Result<Value> {
        let found = self.find_user(identifier).await?;
        let stored_hash = found
            .as_ref()
            .and_then(|record| record.get_str(PASSWORD_FIELD))
            .filter(|hash| is_hashed(hash))
            .map(str::to_string);

        // 用户不存在或没有缓存哈希时也完整跑一次 Argon2，耗时与密码错误一致
        let verified = match &stored_hash {
            Some(hash) => verify_password(password, hash).await,
            None => {
                let _ = verify_password(password, self.dummy_hash().await?).await;
                false
            }
        };
        let Some(record) = found.filter(|_| verified) else {
            return Err(EdubillSDKError::InvalidCredentials);
        };

        let token = offline_token(&record.id);
        let mut patch = Map::new();
        patch.insert(LAST_LOGIN_FIELD.into(), Value::String(now_iso()));
        let record = self
            .store
            .update(EntityType::Users, &record.id, Value::Object(patch))
            .await?;
        let user = sanitize(&record);

        self.start_session(&token, user.clone()).await;
        info!("✅ 离线登录成功: user_id={}", record.id);
        Ok(json!({ "user": user, "token": token, "offline": true }))
    }

    async fn dummy_hash(&self) -> Result<&str> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_password(DUMMY_PASSWORD))
            .await?;
        Ok(hash.as_str())
    }

    async fn find_user(&self, identifier: &str) -> Result<Option<Record>> {
        for field in IDENTIFIER_FIELDS {
            let mut filter = RecordFilter::new();
            filter.insert(field.to_string(), Value::String(identifier.to_string()));
            if let Some(record) = self.store.get_all(EntityType::Users, filter).await?.into_iter().next() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn start_session(&self, token: &str, user: Value) {
        self.session.set(token, user);
        if let Err(e) = self.store.set_meta(meta_keys::AUTH_TOKEN, token).await {
            warn!("保存 token 失败: {}", e);
        }
    }

    pub async fn me(&self) -> Result<Value> {
        if let Some(user) = self.session.user() {
            return Ok(user);
        }
        let token = self.session.token().ok_or(EdubillSDKError::NotAuthenticated)?;
        let user_id = user_id_from_token(&token).ok_or(EdubillSDKError::NotAuthenticated)?;
        let record = self
            .store
            .get_by_id(EntityType::Users, &user_id)
            .await?
            .ok_or(EdubillSDKError::NotAuthenticated)?;
        let user = sanitize(&record);
        self.session.set_user(Some(user.clone()));
        Ok(user)
    }

    /// 总是成功；在线时尽力通知远端
    pub async fn logout(&self) -> ApiResponse {
        let token = self.session.token();
        self.session.clear();
        if let Err(e) = self.store.delete_meta(meta_keys::AUTH_TOKEN).await {
            warn!("清除本地 token 失败: {}", e);
        }

        if let Some(token) = token.filter(|t| !is_offline_token(t)) {
            if self.connection.is_online().await {
                let path = Endpoint::Auth(AuthAction::Logout).path();
                if let Err(e) = self.remote.request(&path, Method::Post, None, Some(&token)).await {
                    warn!("远端登出失败（忽略）: {}", e);
                }
            }
        }
        info!("已登出");
        ApiResponse::ok_with_message(None, "Logged out successfully")
    }

    /// 启动时从 sync_meta 恢复上次的 token，并从本地缓存加载对应用户；返回是否处于登录状态
    pub async fn restore_session(&self) -> Result<bool> {
        if self.session.token().is_none() {
            if let Some(token) = self.store.get_meta(meta_keys::AUTH_TOKEN).await? {
                self.session.set_token(Some(token));
            }
        }
        if self.session.token().is_some() && self.session.user().is_none() {
            match self.me().await {
                Ok(user) => info!("🔄 会话已恢复: user_id={}", user.get("id").unwrap_or(&serde_json::Value::Null)),
                Err(e) => warn!("恢复会话时无法加载用户（本地操作需要重新登录）: {}", e),
            }
        }
        Ok(self.session.is_authenticated())
    }
}

fn strip_password(mut user: Value) -> Value {
    if let Value::Object(map) = &mut user {
        map.remove(PASSWORD_FIELD);
    }
    user
}
