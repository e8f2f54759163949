//! 远端后端客户端
//!
//! `RemoteApi` 是 Router 与 SyncManager 访问远端的唯一接口；生产实现为
//! 基于 reqwest 的 [`HttpRemoteApi`]，测试使用 `mock::MockRemoteApi`。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{ApiResponse, Method};
use crate::error::{EdubillSDKError, Result};
use crate::sync::EntityType;

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpRemoteApi;

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// 发送一次 JSON 请求
    ///
    /// 非 2xx 返回 `Network`；2xx 但 envelope 中 `success=false` 返回 `Remote`。
    /// 返回 Ok 时 `success` 一定为 true。
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse>;

    /// `GET /sync/<entity>?lastSync=...`，`None` 表示全量
    async fn fetch_changes(
        &self,
        entity: EntityType,
        last_sync: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<Value>> {
        let query = json!({ "lastSync": last_sync });
        let path = format!("/sync/{}", entity.as_str());
        let response = self.request(&path, Method::Get, Some(&query), token).await?;
        match response.data {
            Some(Value::Array(items)) => Ok(items),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(EdubillSDKError::Serialization(format!(
                "{} 的增量数据不是数组: {}",
                path, other
            ))),
        }
    }
}
