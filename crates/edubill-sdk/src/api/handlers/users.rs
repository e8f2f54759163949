use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{
    not_found, sanitize, sanitize_all, value_to_id, EntityHandler, RequestContext, PASSWORD_FIELD,
    ROLE_FIELD, SCHOOL_ID_FIELD,
};
use crate::api::password::{hash_password, is_hashed};
use crate::error::{EdubillSDKError, Result};
use crate::storage::{LocalStore, Record, RecordFilter};
use crate::sync::EntityType;

const UNIQUE_FIELDS: &[&str] = &["email", "username"];

pub struct UsersHandler {
    store: LocalStore,
}

impl UsersHandler {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    async fn load(&self, id: &str) -> Result<Record> {
        self.store
            .get_by_id(EntityType::Users, id)
            .await?
            .ok_or_else(|| not_found(EntityType::Users))
    }

    /// 明文密码在写入前哈希；空值或非字符串直接丢弃
    async fn prepare_password(body: &mut Map<String, Value>) -> Result<()> {
        let plain = body
            .get(PASSWORD_FIELD)
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        match plain {
            Some(p) if !is_hashed(&p) => {
                let hashed = hash_password(&p).await?;
                body.insert(PASSWORD_FIELD.into(), Value::String(hashed));
            }
            Some(_) => {}
            None => {
                body.remove(PASSWORD_FIELD);
            }
        }
        Ok(())
    }

    /// email / username 不能被其他用户占用
    async fn ensure_unique(&self, body: &Map<String, Value>, own_id: Option<&str>) -> Result<()> {
        for field in UNIQUE_FIELDS {
            let Some(value) = body.get(*field).filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
            else {
                continue;
            };
            let mut filter = RecordFilter::new();
            filter.insert(field.to_string(), value.clone());
            let taken = self
                .store
                .get_all(EntityType::Users, filter)
                .await?
                .into_iter()
                .any(|r| Some(r.id.as_str()) != own_id);
            if taken {
                return Err(EdubillSDKError::InvalidInput(format!(
                    "User with this {} already exists",
                    field
                )));
            }
        }
        Ok(())
    }
}

fn same_school(ctx: &RequestContext, record: &Record) -> bool {
    ctx.school_id.is_some() && ctx.school_id == value_to_id(record.get(SCHOOL_ID_FIELD))
}

#[async_trait]
impl EntityHandler for UsersHandler {
    fn entity(&self) -> EntityType {
        EntityType::Users
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Value> {
        let record = self.load(id).await?;
        if !ctx.is_admin() && record.id != ctx.user_id && !same_school(ctx, &record) {
            return Err(EdubillSDKError::NotAuthorized("Not authorized to view this user".into()));
        }
        Ok(sanitize(&record))
    }

    async fn list(&self, ctx: &RequestContext, mut filter: RecordFilter) -> Result<Value> {
        if !ctx.is_admin() {
            match &ctx.school_id {
                Some(school_id) => {
                    filter.insert(SCHOOL_ID_FIELD.into(), Value::String(school_id.clone()));
                }
                None => {
                    filter.insert("id".into(), Value::String(ctx.user_id.clone()));
                }
            }
        }
        let records = self.store.get_all(EntityType::Users, filter).await?;
        Ok(sanitize_all(&records))
    }

    async fn create(&self, ctx: &RequestContext, mut body: Map<String, Value>) -> Result<Value> {
        ctx.require_admin("create users")?;
        let own_id = value_to_id(body.get("id"));
        self.ensure_unique(&body, own_id.as_deref()).await?;
        Self::prepare_password(&mut body).await?;
        let record = self.store.create(EntityType::Users, Value::Object(body)).await?;
        Ok(sanitize(&record))
    }

    async fn update(&self, ctx: &RequestContext, id: &str, mut body: Map<String, Value>) -> Result<Value> {
        let existing = self.load(id).await?;
        if !ctx.is_admin() {
            if existing.id != ctx.user_id {
                return Err(EdubillSDKError::NotAuthorized(
                    "Not authorized to update this user".into(),
                ));
            }
            // 普通用户不能提升自己的角色或换学校
            body.remove(ROLE_FIELD);
            body.remove(SCHOOL_ID_FIELD);
        }
        self.ensure_unique(&body, Some(id)).await?;
        Self::prepare_password(&mut body).await?;
        let record = self.store.update(EntityType::Users, id, Value::Object(body)).await?;
        Ok(sanitize(&record))
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Value> {
        ctx.require_admin("delete users")?;
        if id == ctx.user_id {
            return Err(EdubillSDKError::InvalidInput("Cannot delete your own account".into()));
        }
        self.store.delete(EntityType::Users, id).await?;
        Ok(json!({ "id": id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{admin, member, open_store};
    use crate::api::password::verify_password;
    use crate::storage::SyncOperation;

    #[tokio::test]
    async fn admin_create_hashes_password_and_hides_it() {
        let (_dir, store) = open_store().await;
        let handler = UsersHandler::new(store.clone());

        let created = handler
            .create(
                &admin(),
                json!({"name": "Ali", "email": "a@x.com", "username": "ali", "password": "secret", "role": "user"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(created.get("password").is_none());
        assert_eq!(created["syncStatus"], "pending");

        let id = created["id"].as_str().unwrap();
        let stored = store.get_by_id(EntityType::Users, id).await.unwrap().unwrap();
        let hash = stored.get_str("password").unwrap();
        assert!(verify_password("secret", hash).await);

        // 队列快照里只有哈希
        let entries = store.entries_for(EntityType::Users, id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, SyncOperation::Create);
        assert_ne!(entries[0].data["password"], "secret");
    }

    #[tokio::test]
    async fn non_admin_cannot_create_and_duplicates_rejected() {
        let (_dir, store) = open_store().await;
        let handler = UsersHandler::new(store.clone());
        let body = json!({"email": "a@x.com"}).as_object().cloned().unwrap();

        let err = handler.create(&member("u1", "s1"), body.clone()).await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::NotAuthorized(_)));

        handler.create(&admin(), body.clone()).await.unwrap();
        let err = handler.create(&admin(), body).await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::InvalidInput(_)));
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn member_is_scoped_to_school() {
        let (_dir, store) = open_store().await;
        let handler = UsersHandler::new(store.clone());
        for (id, school) in [("u1", "s1"), ("u2", "s1"), ("u3", "s2")] {
            store
                .create(EntityType::Users, json!({"id": id, "schoolId": school}))
                .await
                .unwrap();
        }

        let ctx = member("u1", "s1");
        let visible = handler.list(&ctx, RecordFilter::new()).await.unwrap();
        assert_eq!(visible.as_array().unwrap().len(), 2);
        // 显式查询其他学校也会被覆盖成自己的学校
        let mut other = RecordFilter::new();
        other.insert("schoolId".into(), json!("s2"));
        let visible = handler.list(&ctx, other).await.unwrap();
        assert!(visible.as_array().unwrap().iter().all(|u| u["schoolId"] == "s1"));

        assert!(handler.get(&ctx, "u2").await.is_ok());
        let err = handler.get(&ctx, "u3").await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::NotAuthorized(_)));
        let err = handler.get(&ctx, "missing").await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn self_update_silently_drops_role_change() {
        let (_dir, store) = open_store().await;
        let handler = UsersHandler::new(store.clone());
        store
            .create(EntityType::Users, json!({"id": "u1", "role": "user", "schoolId": "s1", "name": "A"}))
            .await
            .unwrap();
        store
            .create(EntityType::Users, json!({"id": "u2", "role": "user", "schoolId": "s1"}))
            .await
            .unwrap();

        let ctx = member("u1", "s1");
        let updated = handler
            .update(&ctx, "u1", json!({"name": "B", "role": "admin"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(updated["name"], "B");
        assert_eq!(updated["role"], "user");

        let err = handler
            .update(&ctx, "u2", json!({"name": "C"}).as_object().cloned().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EdubillSDKError::NotAuthorized(_)));

        let promoted = handler
            .update(&admin(), "u2", json!({"role": "admin"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(promoted["role"], "admin");
    }

    #[tokio::test]
    async fn delete_requires_admin_and_existing_user() {
        let (_dir, store) = open_store().await;
        let handler = UsersHandler::new(store.clone());
        store.create(EntityType::Users, json!({"id": "u1"})).await.unwrap();

        assert!(handler.delete(&member("u2", "s1"), "u1").await.is_err());
        let err = handler.delete(&admin(), "nope").await.unwrap_err();
        assert!(matches!(err, EdubillSDKError::NotFound(_)));
        assert_eq!(handler.delete(&admin(), "u1").await.unwrap(), json!({"id": "u1"}));
    }
}
