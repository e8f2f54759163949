//! 请求分发层
//!
//! - `ApiRequest`: 调用方构造的类型化请求（实体 + 操作 + id）
//! - `HybridApiRouter`: 在线优先、失败回退离线的统一入口
//! - `auth`: 登录 / me / 登出 子协议（含离线登录）
//! - `handlers`: 各实体的离线处理器（权限检查后访问 LocalStore）

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{EdubillSDKError, Result};
use crate::sync::EntityType;

pub mod auth;
pub mod handlers;
pub mod password;
pub mod response;
pub mod router;

pub use response::ApiResponse;
pub use router::HybridApiRouter;

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = EdubillSDKError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(EdubillSDKError::InvalidInput(format!("不支持的 HTTP 方法: {}", other))),
        }
    }
}

/// 认证子协议的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Me,
    Logout,
    /// 其他认证接口（注册、改密等），只能在线调用
    Other(String),
}

impl AuthAction {
    fn segment(&self) -> &str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Me => "me",
            AuthAction::Logout => "logout",
            AuthAction::Other(name) => name,
        }
    }
}

/// 请求目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Auth(AuthAction),
    Entity { entity: EntityType, id: Option<String> },
}

impl Endpoint {
    pub fn entity(entity: EntityType) -> Self {
        Endpoint::Entity { entity, id: None }
    }

    pub fn entity_id(entity: EntityType, id: impl Into<String>) -> Self {
        Endpoint::Entity { entity, id: Some(id.into()) }
    }

    /// 解析 `/auth/<action>` 或 `/<entity>[/<id>]`
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            ["auth", action] => Ok(Endpoint::Auth(match *action {
                "login" => AuthAction::Login,
                "me" => AuthAction::Me,
                "logout" => AuthAction::Logout,
                other => AuthAction::Other(other.to_string()),
            })),
            [entity] => Ok(Endpoint::entity(parse_entity(entity)?)),
            [entity, id] => Ok(Endpoint::entity_id(parse_entity(entity)?, *id)),
            _ => Err(EdubillSDKError::InvalidInput(format!("无法解析的接口路径: {}", path))),
        }
    }

    /// 远端请求使用的路径
    pub fn path(&self) -> String {
        match self {
            Endpoint::Auth(action) => format!("/auth/{}", action.segment()),
            Endpoint::Entity { entity, id: None } => format!("/{}", entity.as_str()),
            Endpoint::Entity { entity, id: Some(id) } => format!("/{}/{}", entity.as_str(), id),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Endpoint::Auth(_))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn parse_entity(segment: &str) -> Result<EntityType> {
    segment
        .parse::<EntityType>()
        .map_err(|_| EdubillSDKError::InvalidInput(format!("未知实体: {}", segment)))
}

/// 实体请求对应的本地操作
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOperation {
    Get(String),
    List,
    Create,
    Update(String),
    Delete(String),
}

/// 一次 API 请求
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    /// POST/PUT 的 JSON 体；GET 时作为查询条件
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(endpoint: Endpoint, method: Method, body: Option<Value>) -> Self {
        Self { endpoint, method, body }
    }

    /// 从字符串形式构造（`"/users/abc"`, `"GET"`）
    pub fn from_parts(path: &str, method: &str, body: Option<Value>) -> Result<Self> {
        Ok(Self::new(Endpoint::parse(path)?, method.parse()?, body))
    }

    pub fn get(entity: EntityType, id: impl Into<String>) -> Self {
        Self::new(Endpoint::entity_id(entity, id), Method::Get, None)
    }

    pub fn list(entity: EntityType, filter: Option<Value>) -> Self {
        Self::new(Endpoint::entity(entity), Method::Get, filter)
    }

    pub fn create(entity: EntityType, body: Value) -> Self {
        Self::new(Endpoint::entity(entity), Method::Post, Some(body))
    }

    pub fn update(entity: EntityType, id: impl Into<String>, body: Value) -> Self {
        Self::new(Endpoint::entity_id(entity, id), Method::Put, Some(body))
    }

    pub fn delete(entity: EntityType, id: impl Into<String>) -> Self {
        Self::new(Endpoint::entity_id(entity, id), Method::Delete, None)
    }

    pub fn login(identifier: &str, password: &str) -> Self {
        Self::new(
            Endpoint::Auth(AuthAction::Login),
            Method::Post,
            Some(serde_json::json!({ "email": identifier, "password": password })),
        )
    }

    /// 实体请求映射到本地操作；认证请求返回 None
    pub fn operation(&self) -> Result<Option<(EntityType, EntityOperation)>> {
        let (entity, id) = match &self.endpoint {
            Endpoint::Auth(_) => return Ok(None),
            Endpoint::Entity { entity, id } => (*entity, id.clone()),
        };
        let op = match (self.method, id) {
            (Method::Get, Some(id)) => EntityOperation::Get(id),
            (Method::Get, None) => EntityOperation::List,
            (Method::Post, None) => EntityOperation::Create,
            (Method::Put | Method::Patch, Some(id)) => EntityOperation::Update(id),
            (Method::Delete, Some(id)) => EntityOperation::Delete(id),
            (method, id) => {
                return Err(EdubillSDKError::InvalidInput(format!(
                    "不支持的请求: {} {}",
                    method,
                    Endpoint::Entity { entity, id }.path()
                )))
            }
        };
        Ok(Some((entity, op)))
    }
}
