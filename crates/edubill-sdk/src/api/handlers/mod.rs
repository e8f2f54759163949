//! 离线实体处理器
//!
//! 与远端服务器执行相同的授权规则：非管理员只能看到自己学校的数据，
//! 特权操作需要管理员角色，密码字段永不返回。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::api::EntityOperation;
use crate::error::{EdubillSDKError, Result};
use crate::session::AuthSession;
use crate::storage::{id_from_value, Record, RecordFilter};
pub(crate) use crate::storage::not_found;
use crate::sync::EntityType;

pub mod schools;
pub mod users;

pub use schools::SchoolsHandler;
pub use users::UsersHandler;

pub(crate) const PASSWORD_FIELD: &str = crate::storage::fields::PASSWORD;
pub(crate) const ROLE_FIELD: &str = "role";
pub(crate) const SCHOOL_ID_FIELD: &str = "schoolId";

/// 调用方角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("admin") | Some("super_admin") => Role::Admin,
            _ => Role::User,
        }
    }
}

/// 当前会话用户的授权上下文
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
    pub school_id: Option<String>,
}

impl RequestContext {
    pub fn from_user(user: &Value) -> Result<Self> {
        let user_id = value_to_id(user.get("id")).ok_or(EdubillSDKError::NotAuthenticated)?;
        Ok(Self {
            user_id,
            role: Role::parse(user.get(ROLE_FIELD).and_then(Value::as_str)),
            school_id: value_to_id(user.get(SCHOOL_ID_FIELD)),
        })
    }

    /// 未登录时返回 NotAuthenticated
    pub fn from_session(session: &AuthSession) -> Result<Self> {
        let user = session.user().ok_or(EdubillSDKError::NotAuthenticated)?;
        Self::from_user(&user)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(EdubillSDKError::NotAuthorized(format!("Not authorized to {}", action)))
        }
    }
}

/// 每个实体一个离线处理器
#[async_trait]
pub trait EntityHandler: Send + Sync {
    fn entity(&self) -> EntityType;

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Value>;
    async fn list(&self, ctx: &RequestContext, filter: RecordFilter) -> Result<Value>;
    async fn create(&self, ctx: &RequestContext, body: Map<String, Value>) -> Result<Value>;
    async fn update(&self, ctx: &RequestContext, id: &str, body: Map<String, Value>) -> Result<Value>;
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Value>;

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        operation: EntityOperation,
        body: Option<Value>,
    ) -> Result<Value> {
        match operation {
            EntityOperation::Get(id) => self.get(ctx, &id).await,
            EntityOperation::List => self.list(ctx, body_object(body)?).await,
            EntityOperation::Create => self.create(ctx, body_object(body)?).await,
            EntityOperation::Update(id) => self.update(ctx, &id, body_object(body)?).await,
            EntityOperation::Delete(id) => self.delete(ctx, &id).await,
        }
    }
}

/// 返回给调用方的记录：去掉密码字段
pub fn sanitize(record: &Record) -> Value {
    let mut value = record.to_value();
    if let Value::Object(map) = &mut value {
        map.remove(PASSWORD_FIELD);
    }
    value
}

pub fn sanitize_all(records: &[Record]) -> Value {
    Value::Array(records.iter().map(sanitize).collect())
}

pub(crate) fn value_to_id(value: Option<&Value>) -> Option<String> {
    value.and_then(id_from_value)
}

fn body_object(body: Option<Value>) -> Result<Map<String, Value>> {
    match body {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(EdubillSDKError::InvalidInput(format!(
            "请求体必须是 JSON 对象，实际为: {}",
            other
        ))),
    }
}
