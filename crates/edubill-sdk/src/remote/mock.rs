//! 测试用远端：按顺序记录调用，可按路径脚本化失败、响应与增量数据

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::RemoteApi;
use crate::api::{ApiResponse, Method};
use crate::error::{EdubillSDKError, Result};
use crate::network::ConnectivityProbe;
use crate::sync::EntityType;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
}

#[derive(Default)]
pub struct MockRemoteApi {
    calls: Mutex<Vec<RecordedCall>>,
    fetches: Mutex<Vec<(EntityType, Option<String>)>>,
    failing: Mutex<HashSet<(Method, String)>>,
    rejecting: Mutex<HashMap<(Method, String), String>>,
    responses: Mutex<HashMap<(Method, String), Value>>,
    deltas: Mutex<HashMap<EntityType, Vec<Value>>>,
    network_down: AtomicBool,
    fetch_fails: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockRemoteApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有请求都以网络错误失败
    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    /// 指定请求返回网络错误
    pub fn fail(&self, method: Method, path: &str) {
        self.failing.lock().insert((method, path.to_string()));
    }

    /// 撤销 `fail` 的脚本
    pub fn recover(&self, method: Method, path: &str) {
        self.failing.lock().remove(&(method, path.to_string()));
    }

    /// 指定请求返回 2xx + success=false
    pub fn reject(&self, method: Method, path: &str, message: &str) {
        self.rejecting.lock().insert((method, path.to_string()), message.to_string());
    }

    /// 指定请求的 data；未脚本化时写请求回显 body，读请求返回 null
    pub fn respond(&self, method: Method, path: &str, data: Value) {
        self.responses.lock().insert((method, path.to_string()), data);
    }

    pub fn set_delta(&self, entity: EntityType, items: Vec<Value>) {
        self.deltas.lock().insert(entity, items);
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    /// 每次请求前等待（用于构造并发场景）
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn fetches(&self) -> Vec<(EntityType, Option<String>)> {
        self.fetches.lock().clone()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse> {
        self.maybe_delay().await;
        self.calls.lock().push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
            token: token.map(str::to_string),
        });

        let key = (method, path.to_string());
        if self.network_down.load(Ordering::SeqCst) || self.failing.lock().contains(&key) {
            return Err(EdubillSDKError::Network(format!("simulated failure: {} {}", method, path)));
        }
        if let Some(message) = self.rejecting.lock().get(&key) {
            return Err(EdubillSDKError::Remote { status: 200, message: message.clone() });
        }

        let data = match self.responses.lock().get(&key) {
            Some(data) => data.clone(),
            None => match method {
                Method::Post | Method::Put | Method::Patch => body.cloned().unwrap_or(Value::Null),
                Method::Get | Method::Delete => Value::Null,
            },
        };
        Ok(ApiResponse::ok(data))
    }

    async fn fetch_changes(
        &self,
        entity: EntityType,
        last_sync: Option<&str>,
        _token: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.maybe_delay().await;
        self.fetches.lock().push((entity, last_sync.map(str::to_string)));
        if self.network_down.load(Ordering::SeqCst) || self.fetch_fails.load(Ordering::SeqCst) {
            return Err(EdubillSDKError::Network(format!("simulated failure: /sync/{}", entity)));
        }
        Ok(self.deltas.lock().get(&entity).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ConnectivityProbe for MockRemoteApi {
    async fn probe(&self) -> bool {
        !self.network_down.load(Ordering::SeqCst)
    }
}

/// 常用的远端登录响应
pub fn login_payload(user: Value, token: &str) -> Value {
    json!({ "user": user, "token": token })
}
