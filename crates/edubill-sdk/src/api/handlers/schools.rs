use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{not_found, sanitize, sanitize_all, EntityHandler, RequestContext};
use crate::error::{EdubillSDKError, Result};
use crate::storage::{LocalStore, RecordFilter};
use crate::sync::EntityType;

pub struct SchoolsHandler {
    store: LocalStore,
}

impl SchoolsHandler {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntityHandler for SchoolsHandler {
    fn entity(&self) -> EntityType {
        EntityType::Schools
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Value> {
        if !ctx.is_admin() && ctx.school_id.as_deref() != Some(id) {
            return Err(EdubillSDKError::NotAuthorized("Not authorized to view this school".into()));
        }
        let record = self
            .store
            .get_by_id(EntityType::Schools, id)
            .await?
            .ok_or_else(|| not_found(EntityType::Schools))?;
        Ok(sanitize(&record))
    }

    async fn list(&self, ctx: &RequestContext, mut filter: RecordFilter) -> Result<Value> {
        if !ctx.is_admin() {
            match &ctx.school_id {
                Some(school_id) => {
                    filter.insert("id".into(), Value::String(school_id.clone()));
                }
                None => return Ok(Value::Array(Vec::new())),
            }
        }
        let records = self.store.get_all(EntityType::Schools, filter).await?;
        Ok(sanitize_all(&records))
    }

    async fn create(&self, ctx: &RequestContext, body: Map<String, Value>) -> Result<Value> {
        ctx.require_admin("create schools")?;
        let record = self.store.create(EntityType::Schools, Value::Object(body)).await?;
        Ok(sanitize(&record))
    }

    async fn update(&self, ctx: &RequestContext, id: &str, body: Map<String, Value>) -> Result<Value> {
        ctx.require_admin("update schools")?;
        let record = self.store.update(EntityType::Schools, id, Value::Object(body)).await?;
        Ok(sanitize(&record))
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Value> {
        ctx.require_admin("delete schools")?;
        self.store.delete(EntityType::Schools, id).await?;
        Ok(json!({ "id": id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{admin, member, open_store};

    #[tokio::test]
    async fn member_sees_only_own_school() {
        let (_dir, store) = open_store().await;
        let handler = SchoolsHandler::new(store.clone());
        let s1 = json!({"id": "s1", "name": "Al Noor"}).as_object().cloned().unwrap();
        let s2 = json!({"id": "s2", "name": "Al Huda"}).as_object().cloned().unwrap();
        handler.create(&admin(), s1).await.unwrap();
        handler.create(&admin(), s2).await.unwrap();

        let ctx = member("u1", "s1");
        let list = handler.list(&ctx, RecordFilter::new()).await.unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], "s1");
        assert_eq!(handler.get(&ctx, "s1").await.unwrap()["name"], "Al Noor");
        assert!(matches!(
            handler.get(&ctx, "s2").await.unwrap_err(),
            EdubillSDKError::NotAuthorized(_)
        ));

        let all = handler.list(&admin(), RecordFilter::new()).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn writes_are_admin_only() {
        let (_dir, store) = open_store().await;
        let handler = SchoolsHandler::new(store.clone());
        let body = json!({"name": "X"}).as_object().cloned().unwrap();
        assert!(handler.create(&member("u1", "s1"), body.clone()).await.is_err());
        assert!(handler.update(&member("u1", "s1"), "s1", body.clone()).await.is_err());
        assert!(handler.delete(&member("u1", "s1"), "s1").await.is_err());
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let err = handler.update(&admin(), "missing", body).await.unwrap_err();
        assert_eq!(err.to_string(), "School not found");
    }
}
