//! 混合路由：所有调用方的唯一入口
//!
//! 1. 认证接口交给 [`AuthService`]
//! 2. 在线时先请求远端，失败则回退离线路径
//! 3. 离线时直接交给对应实体的本地处理器

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::auth::AuthService;
use super::handlers::{EntityHandler, RequestContext, SchoolsHandler, UsersHandler};
use super::{ApiRequest, ApiResponse, Endpoint};
use crate::error::{EdubillSDKError, Result};
use crate::network::ConnectionManager;
use crate::remote::RemoteApi;
use crate::session::AuthSession;
use crate::storage::LocalStore;
use crate::sync::EntityType;

pub struct HybridApiRouter {
    remote: Arc<dyn RemoteApi>,
    connection: Arc<ConnectionManager>,
    session: AuthSession,
    auth: AuthService,
    handlers: HashMap<EntityType, Arc<dyn EntityHandler>>,
}

impl HybridApiRouter {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connection: Arc<ConnectionManager>,
        session: AuthSession,
    ) -> Self {
        let auth = AuthService::new(store.clone(), remote.clone(), connection.clone(), session.clone());
        let mut router = Self {
            remote,
            connection,
            session,
            auth,
            handlers: HashMap::new(),
        };
        router.register(Arc::new(UsersHandler::new(store.clone())));
        router.register(Arc::new(SchoolsHandler::new(store)));
        router
    }

    /// 注册（或替换）某个实体的离线处理器
    pub fn register(&mut self, handler: Arc<dyn EntityHandler>) {
        self.handlers.insert(handler.entity(), handler);
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// 从不返回 Err：所有失败都转成 `success=false` 的响应
    pub async fn request(&self, request: ApiRequest) -> ApiResponse {
        if let Endpoint::Auth(action) = &request.endpoint {
            return self
                .auth
                .handle(action, request.method, request.body)
                .await
                .unwrap_or_else(|e| ApiResponse::failure(&e));
        }

        if self.connection.is_online().await {
            let path = request.endpoint.path();
            let token = self.session.token();
            match self
                .remote
                .request(&path, request.method, request.body.as_ref(), token.as_deref())
                .await
            {
                Ok(response) => return response,
                Err(e) if e.is_remote_failure() => {
                    warn!("远端请求失败，回退离线处理: {} {} ({})", request.method, path, e);
                }
                Err(e) => return ApiResponse::failure(&e),
            }
        }

        ApiResponse::from_result(self.handle_offline(request).await)
    }

    /// 字符串形式的入口（`"/users/42"`, `"GET"`）
    pub async fn request_path(&self, path: &str, method: &str, body: Option<Value>) -> ApiResponse {
        match ApiRequest::from_parts(path, method, body) {
            Ok(request) => self.request(request).await,
            Err(e) => ApiResponse::failure(&e),
        }
    }

    async fn handle_offline(&self, request: ApiRequest) -> Result<Value> {
        let Some((entity, operation)) = request.operation()? else {
            return Err(EdubillSDKError::InvalidInput("认证请求不能走实体处理器".into()));
        };
        let handler = self
            .handlers
            .get(&entity)
            .ok_or_else(|| EdubillSDKError::InvalidInput(format!("实体 {} 没有离线处理器", entity)))?;
        let ctx = RequestContext::from_session(&self.session)?;
        debug!("离线处理: {} {:?}", entity, operation);
        handler.dispatch(&ctx, operation, request.body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthAction, Method};
    use crate::network::NetworkStatus;
    use crate::remote::mock::MockRemoteApi;
    use crate::storage::{SyncOperation, SyncStatus};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: LocalStore,
        remote: Arc<MockRemoteApi>,
        connection: Arc<ConnectionManager>,
        session: AuthSession,
        router: HybridApiRouter,
    }

    async fn fixture(status: NetworkStatus) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open_in_dir(dir.path()).await.unwrap();
        let remote = Arc::new(MockRemoteApi::new());
        let connection = Arc::new(ConnectionManager::new(status));
        let session = AuthSession::new();
        let router = HybridApiRouter::new(store.clone(), remote.clone(), connection.clone(), session.clone());
        Fixture { _dir: dir, store, remote, connection, session, router }
    }

    fn login_admin(session: &AuthSession) {
        session.set("offline_x_admin-1", json!({"id": "admin-1", "role": "admin"}));
    }

    #[tokio::test]
    async fn offline_create_is_pending_and_enqueued_once() {
        let f = fixture(NetworkStatus::Offline).await;
        login_admin(&f.session);

        let resp = f
            .router
            .request(ApiRequest::create(
                EntityType::Users,
                json!({"name": "Ali", "email": "a@x.com", "username": "ali", "password": "secret", "role": "user"}),
            ))
            .await;
        assert!(resp.success, "{:?}", resp);
        let data = resp.data.unwrap();
        assert_eq!(data["syncStatus"], "pending");
        assert!(data.get("password").is_none());

        let id = data["id"].as_str().unwrap();
        let pending = f.store.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, SyncOperation::Create);
        assert_eq!(pending[0].entity_id, id);
        assert!(f.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn network_error_falls_back_to_not_found_response() {
        let f = fixture(NetworkStatus::Online).await;
        login_admin(&f.session);
        f.remote.fail(Method::Get, "/users/42");

        let resp = f.router.request_path("/users/42", "GET", None).await;
        assert!(!resp.success);
        assert_eq!(resp.message(), Some("User not found"));
        assert_eq!(resp.error, Some(json!("NOT_FOUND")));
        assert_eq!(f.remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn online_success_is_returned_verbatim() {
        let f = fixture(NetworkStatus::Online).await;
        login_admin(&f.session);
        f.remote.respond(Method::Get, "/schools", json!([{"id": "s1"}]));

        let resp = f.router.request(ApiRequest::list(EntityType::Schools, None)).await;
        assert_eq!(resp, ApiResponse::ok(json!([{"id": "s1"}])));
        let call = &f.remote.calls()[0];
        assert_eq!(call.token.as_deref(), Some("offline_x_admin-1"));
        // 在线成功不写本地
        assert_eq!(f.store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remote_rejection_also_falls_back() {
        let f = fixture(NetworkStatus::Online).await;
        login_admin(&f.session);
        f.remote.reject(Method::Post, "/schools", "validation failed");

        let resp = f
            .router
            .request(ApiRequest::create(EntityType::Schools, json!({"id": "s1", "name": "X"})))
            .await;
        assert!(resp.success);
        let stored = f.store.get_by_id(EntityType::Schools, "s1").await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn offline_requires_session_and_checks_roles() {
        let f = fixture(NetworkStatus::Offline).await;
        let resp = f.router.request(ApiRequest::list(EntityType::Users, None)).await;
        assert_eq!(resp.error, Some(json!("NOT_AUTHENTICATED")));

        f.session.set("t", json!({"id": "u1", "role": "user", "schoolId": "s1"}));
        let resp = f
            .router
            .request(ApiRequest::create(EntityType::Users, json!({"email": "z@x.com"})))
            .await;
        assert!(!resp.success);
        assert_eq!(resp.error, Some(json!("NOT_AUTHORIZED")));
        assert_eq!(f.store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_id_create_twice_grows_queue_by_two() {
        let f = fixture(NetworkStatus::Offline).await;
        login_admin(&f.session);
        let body = json!({"id": "fixed", "name": "Al Noor"});

        for _ in 0..2 {
            let resp = f.router.request(ApiRequest::create(EntityType::Schools, body.clone())).await;
            assert!(resp.success);
        }
        assert_eq!(f.store.entries_for(EntityType::Schools, "fixed").await.unwrap().len(), 2);
        assert_eq!(f.store.get_all(EntityType::Schools, Default::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auth_and_malformed_requests() {
        let f = fixture(NetworkStatus::Offline).await;
        let resp = f
            .router
            .request(ApiRequest::new(Endpoint::Auth(AuthAction::Me), Method::Get, None))
            .await;
        assert_eq!(resp.error, Some(json!("NOT_AUTHENTICATED")));

        let resp = f.router.request_path("/auth/logout", "POST", None).await;
        assert!(resp.success);

        let resp = f.router.request_path("/invoices", "GET", None).await;
        assert_eq!(resp.error, Some(json!("INVALID_INPUT")));

        f.connection.set_online(true).await;
        let resp = f.router.request_path("/auth/refresh", "POST", None).await;
        assert!(resp.success);
    }
}
