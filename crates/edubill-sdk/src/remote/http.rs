//! 基于 reqwest 的远端客户端（JSON over HTTPS）

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::RemoteApi;
use crate::api::{ApiResponse, Method};
use crate::error::{EdubillSDKError, Result};
use crate::network::ConnectivityProbe;
use crate::sdk::HttpClientConfig;

const HEALTH_PATH: &str = "/health";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
}

impl HttpRemoteApi {
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| EdubillSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn build(&self, path: &str, method: Method, body: Option<&Value>) -> RequestBuilder {
        let url = self.url(path);
        let builder = match method {
            Method::Get => return self.client.get(url).query(&query_pairs(body)),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Patch => self.client.patch(url),
            Method::Delete => self.client.delete(url),
        };
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse> {
        let mut builder = self
            .build(path, method, body)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        debug!("➡️ {} {}", method, path);
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(status, &text);
            warn!("远端返回失败: {} {} -> {} ({})", method, path, status, message);
            return Err(EdubillSDKError::Network(message));
        }

        let envelope: ApiResponse = serde_json::from_str(&text).map_err(|e| {
            EdubillSDKError::Network(format!("无法解析 {} {} 的响应: {}", method, path, e))
        })?;
        if !envelope.success {
            return Err(envelope.into_rejection(status.as_u16()));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl ConnectivityProbe for HttpRemoteApi {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("健康检查失败: {}", e);
                false
            }
        }
    }
}

/// GET 的 body 展开为查询参数：null 跳过，字符串原样，其余转 JSON 文本
fn query_pairs(body: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = body else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key.clone(), s.clone())),
            other => Some((key.clone(), other.to_string())),
        })
        .collect()
}

/// 非 2xx 时优先使用 body 中的 message
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_body_becomes_query_without_nulls() {
        let body = json!({"lastSync": null, "schoolId": "s1", "active": true, "page": 2});
        let mut pairs = query_pairs(Some(&body));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("active".to_string(), "true".to_string()),
                ("page".to_string(), "2".to_string()),
                ("schoolId".to_string(), "s1".to_string()),
            ]
        );
        assert!(query_pairs(None).is_empty());
    }

    #[test]
    fn non_2xx_prefers_body_message() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"success":false,"message":"Email taken"}"#),
            "Email taken"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "<html>"), "HTTP 502 Bad Gateway");
    }

    #[test]
    fn url_joins_base_and_path() {
        let api = HttpRemoteApi::new("https://api.example.com/", &HttpClientConfig::default()).unwrap();
        assert_eq!(api.base_url(), "https://api.example.com");
        assert_eq!(api.url("/users/1"), "https://api.example.com/users/1");
        assert_eq!(api.url("sync/users"), "https://api.example.com/sync/users");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let config = HttpClientConfig { connect_timeout_secs: Some(1), request_timeout_secs: Some(2) };
        let api = HttpRemoteApi::new("http://127.0.0.1:1", &config).unwrap();
        let err = api.request("/users", Method::Get, None, None).await.unwrap_err();
        assert!(err.is_remote_failure());
        assert!(!api.probe().await);
    }
}
