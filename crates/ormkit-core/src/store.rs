//! The store: an adapter, the schema it serves and the configuration.

use std::fmt;
use std::sync::Arc;

use ormkit_proto::{ObjectType, Record, Schema};
use tracing::debug;

use crate::adapter::Adapter;
use crate::batch::Batch;
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::Query;

/// Entry point for queries, new entities and batches.
///
/// Cloning a store is cheap; clones share the adapter.
#[derive(Clone)]
pub struct Store {
    adapter: Arc<dyn Adapter>,
    schema: Arc<Schema>,
    config: Arc<StoreConfig>,
}

impl Store {
    /// Create a store with the default configuration.
    pub fn new(adapter: Arc<dyn Adapter>, schema: Schema) -> Self {
        Self::with_config(adapter, schema, StoreConfig::default())
    }

    /// Create a store with an explicit configuration.
    pub fn with_config(adapter: Arc<dyn Adapter>, schema: Schema, config: StoreConfig) -> Self {
        Self {
            adapter,
            schema: Arc::new(schema),
            config: Arc::new(config),
        }
    }

    /// The storage adapter.
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Check whether two stores write through the same adapter instance.
    pub fn same_adapter(&self, other: &Store) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.adapter), Arc::as_ptr(&other.adapter))
    }

    /// Look up an object type.
    pub fn object_type(&self, name: &str) -> Result<Arc<ObjectType>> {
        self.schema
            .object_type(name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Start a query over every object of a type.
    pub fn query(&self, type_name: &str) -> Result<Query> {
        Ok(Query::new(self.clone(), self.object_type(type_name)?))
    }

    /// Create a new, unpersisted entity with default attribute values.
    pub fn create(&self, type_name: &str) -> Result<Entity> {
        Ok(Entity::new(self.clone(), self.object_type(type_name)?))
    }

    /// Hydrate an entity from a record the adapter produced.
    pub fn build(&self, record: Record) -> Result<Entity> {
        let object_type = self.object_type(&record.type_name)?;
        Entity::hydrate(self.clone(), object_type, record)
    }

    /// Fetch one entity by id.
    pub async fn get(&self, type_name: &str, id: &str) -> Result<Option<Entity>> {
        let object_type = self.object_type(type_name)?;
        match self.adapter.get(type_name, id).await? {
            Some(record) => Ok(Some(Entity::hydrate(self.clone(), object_type, record)?)),
            None => Ok(None),
        }
    }

    /// Fetch entities by id, in the order of `ids`.
    pub async fn get_all(&self, type_name: &str, ids: &[String]) -> Result<Vec<Option<Entity>>> {
        let object_type = self.object_type(type_name)?;
        let records = self.adapter.get_all(type_name, ids).await?;
        debug!(type_name, requested = ids.len(), "get_all");
        records
            .into_iter()
            .map(|record| {
                record
                    .map(|r| Entity::hydrate(self.clone(), object_type.clone(), r))
                    .transpose()
            })
            .collect()
    }

    /// Start an empty batch.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("types", &self.schema.types().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use ormkit_proto::{AttributeType, Value};

    fn schema() -> Schema {
        Schema::new().with_type(ObjectType::new("Room").with_attribute("name", AttributeType::Text))
    }

    #[test]
    fn test_same_adapter() {
        let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::new());
        let a = Store::new(adapter.clone(), schema());
        let b = Store::new(adapter, schema());
        let c = Store::new(Arc::new(MemoryAdapter::new()), schema());

        assert!(a.same_adapter(&a.clone()));
        assert!(a.same_adapter(&b));
        assert!(!a.same_adapter(&c));
    }

    #[test]
    fn test_unknown_type() {
        let store = Store::new(Arc::new(MemoryAdapter::new()), schema());
        assert!(matches!(store.query("Phone"), Err(Error::UnknownType(name)) if name == "Phone"));
        assert!(store.create("Room").is_ok());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.insert(Record::new("Room", "r1").with_attribute("name", "Kitchen"));
        let store = Store::new(adapter, schema());

        let room = store.get("Room", "r1").await.unwrap().unwrap();
        assert_eq!(room.get("name").unwrap(), Value::from("Kitchen"));
        assert!(store.get("Room", "r2").await.unwrap().is_none());

        let rooms = store
            .get_all("Room", &["r2".into(), "r1".into()])
            .await
            .unwrap();
        assert!(rooms[0].is_none());
        assert_eq!(rooms[1].as_ref().map(Entity::id), Some("r1"));
    }
}
