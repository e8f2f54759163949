//! 认证会话 - Router 与 SyncManager 共享的当前 token / 用户

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<Value>,
}

/// 进程内唯一的认证会话，由 `EdubillSDK` 持有并注入到各组件
#[derive(Debug, Default, Clone)]
pub struct AuthSession {
    inner: Arc<RwLock<SessionState>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登录成功后设置 token 与用户
    pub fn set(&self, token: impl Into<String>, user: Value) {
        let mut state = self.inner.write();
        state.token = Some(token.into());
        state.user = Some(user);
    }

    /// 只替换 token（用户保持不变，`None` 表示清除 token）
    pub fn set_token(&self, token: Option<String>) {
        self.inner.write().token = token;
    }

    pub fn set_user(&self, user: Option<Value>) {
        self.inner.write().user = user;
    }

    pub fn clear(&self) {
        let mut state = self.inner.write();
        state.token = None;
        state.user = None;
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().token.clone()
    }

    pub fn user(&self) -> Option<Value> {
        self.inner.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().token.is_some()
    }
}
