use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Collections the admin API may touch. Anything else is a 404.
pub const ADMIN_COLLECTIONS: &[&str] = &[
    "skills",
    "projects",
    "blog-posts",
    "experience",
    "contact-submissions",
    "certifications",
    "testimonials",
    "nav-items",
    "profile",
    "social-links",
    "education",
];

pub fn is_admin_collection(name: &str) -> bool {
    ADMIN_COLLECTIONS.contains(&name)
}

/// CRUD over opaque JSON records grouped by collection. Records are objects
/// with a numeric `id` assigned by the store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    async fn create(
        &self,
        collection: &str,
        record: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    /// Merge `changes` into record `id`. `Ok(None)` when there is no such record.
    async fn update(
        &self,
        collection: &str,
        id: i64,
        changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError>;

    /// `Ok(false)` when there is no such record.
    async fn delete(&self, collection: &str, id: i64) -> Result<bool, StoreError>;
}

#[derive(Debug)]
pub struct InMemoryResourceStore {
    next_id: AtomicI64,
    collections: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_id(record: &Map<String, Value>) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|records| records.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default())
    }

    async fn create(
        &self,
        collection: &str,
        mut record: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        record.insert("id".to_string(), Value::from(id));

        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());

        Ok(Value::Object(record))
    }

    async fn update(
        &self,
        collection: &str,
        id: i64,
        changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| record_id(r) == Some(id)))
        else {
            return Ok(None);
        };

        for (key, value) in changes {
            if key != "id" {
                record.insert(key, value);
            }
        }

        Ok(Some(Value::Object(record.clone())))
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(false);
        };

        let before = records.len();
        records.retain(|r| record_id(r) != Some(id));
        Ok(records.len() != before)
    }
}
