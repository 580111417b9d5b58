//! In-memory representation of one persistent object.
//!
//! An [`Entity`] is a cheap, cloneable handle. Clones of a handle share
//! state; two entities hydrated separately from the same record do not, and
//! no identity map unifies them. Edits made through independent instances
//! never merge: whichever batch executes last wins.
//!
//! Attribute values are cast through their type contract on assignment and
//! tracked per attribute as dirty until the next successful save or reload.
//! Belongs-to relationships are tracked by foreign id plus a cached object;
//! see [`Entity::related`].

mod relation;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use ormkit_proto::{ObjectType, Record, Value, ID_FIELD};
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::error::{AdapterError, Error, Result};
use crate::query::Query;
use crate::store::Store;

use relation::RelationSlot;

/// The batch dedup key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub type_name: String,
    pub id: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// Handle to one persistent object.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    id: String,
    object_type: Arc<ObjectType>,
    store: Store,
    state: Mutex<EntityState>,
}

struct EntityState {
    attributes: BTreeMap<String, Value>,
    dirty_attributes: BTreeSet<String>,
    belongs_to: BTreeMap<String, Option<String>>,
    related: BTreeMap<String, RelationSlot>,
    dirty_relations: BTreeSet<String>,
    has_many: BTreeMap<String, Query>,
    persisted: bool,
    destroyed: bool,
    next_ticket: u64,
}

impl EntityState {
    fn empty(persisted: bool) -> Self {
        Self {
            attributes: BTreeMap::new(),
            dirty_attributes: BTreeSet::new(),
            belongs_to: BTreeMap::new(),
            related: BTreeMap::new(),
            dirty_relations: BTreeSet::new(),
            has_many: BTreeMap::new(),
            persisted,
            destroyed: false,
            next_ticket: 0,
        }
    }
}

/// Decode a record's attributes and foreign ids for `object_type`.
fn decode(
    object_type: &ObjectType,
    record: &Record,
) -> Result<(BTreeMap<String, Value>, BTreeMap<String, Option<String>>)> {
    if record.type_name != object_type.name {
        return Err(Error::TypeMismatch {
            expected: object_type.name.clone(),
            actual: record.type_name.clone(),
        });
    }

    let mut attributes = BTreeMap::new();
    for def in object_type.attributes.values() {
        let value = match record.attributes.get(&def.name) {
            Some(json) => def
                .ty
                .value_from_json(json)
                .map_err(|e| e.for_attribute(def.name.clone()))?,
            None => Value::Null,
        };
        attributes.insert(def.name.clone(), value);
    }

    let belongs_to = object_type
        .belongs_to
        .keys()
        .map(|name| (name.clone(), record.relation_id(name).map(str::to_string)))
        .collect();

    Ok((attributes, belongs_to))
}

impl Entity {
    /// Create a new, unpersisted entity with a fresh id and default values.
    pub(crate) fn new(store: Store, object_type: Arc<ObjectType>) -> Self {
        let mut state = EntityState::empty(false);
        for def in object_type.attributes.values() {
            state.attributes.insert(def.name.clone(), def.default.clone());
        }
        for name in object_type.belongs_to.keys() {
            state.belongs_to.insert(name.clone(), None);
        }
        Self::from_parts(Uuid::new_v4().to_string(), object_type, store, state)
    }

    /// Hydrate a persisted entity from an adapter record.
    pub(crate) fn hydrate(
        store: Store,
        object_type: Arc<ObjectType>,
        record: Record,
    ) -> Result<Self> {
        let (attributes, belongs_to) = decode(&object_type, &record)?;
        let mut state = EntityState::empty(true);
        state.attributes = attributes;
        state.belongs_to = belongs_to;
        Ok(Self::from_parts(record.id, object_type, store, state))
    }

    fn from_parts(
        id: String,
        object_type: Arc<ObjectType>,
        store: Store,
        state: EntityState,
    ) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                id,
                object_type,
                store,
                state: Mutex::new(state),
            }),
        }
    }

    /// The id. Never changes.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The object type.
    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.inner.object_type
    }

    /// Name of the object type.
    pub fn type_name(&self) -> &str {
        &self.inner.object_type.name
    }

    /// The store this entity reads from and writes through.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Type name and id.
    pub fn identity(&self) -> Identity {
        Identity {
            type_name: self.type_name().to_string(),
            id: self.id().to_string(),
        }
    }

    /// Check whether two handles share state.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current value of an attribute. `"id"` reads the id.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.inner.state.lock().attributes.get(name) {
            return Ok(value.clone());
        }
        if name == ID_FIELD {
            return Ok(Value::String(self.inner.id.clone()));
        }
        Err(Error::unknown_attribute(self.type_name(), name))
    }

    /// Assign an attribute.
    ///
    /// The value is cast through the attribute's type first; on failure the
    /// attribute keeps its old value. Assigning an equal value does not make
    /// the attribute dirty.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let def = self
            .inner
            .object_type
            .attribute(name)
            .ok_or_else(|| Error::unknown_attribute(self.type_name(), name))?;
        let value = def
            .ty
            .cast(&value.into())
            .map_err(|e| e.for_attribute(name))?;

        let mut state = self.inner.state.lock();
        if state.attributes.get(name) != Some(&value) {
            state.attributes.insert(name.to_string(), value);
            state.dirty_attributes.insert(name.to_string());
        }
        Ok(())
    }

    /// Check if the entity has anything to write: it was never persisted, or
    /// an attribute or relationship changed since it last was.
    pub fn is_dirty(&self) -> bool {
        let state = self.inner.state.lock();
        !state.destroyed
            && (!state.persisted
                || !state.dirty_attributes.is_empty()
                || !state.dirty_relations.is_empty())
    }

    /// Names of changed attributes.
    pub fn dirty_attributes(&self) -> Vec<String> {
        self.inner.state.lock().dirty_attributes.iter().cloned().collect()
    }

    /// Names of changed belongs-to relationships.
    pub fn dirty_relationships(&self) -> Vec<String> {
        self.inner.state.lock().dirty_relations.iter().cloned().collect()
    }

    /// Check if the entity exists in storage.
    pub fn is_persisted(&self) -> bool {
        self.inner.state.lock().persisted
    }

    /// Check if the entity has been deleted.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Serialize for the adapter.
    ///
    /// With `patch_only`, only dirty attributes and relationships are emitted.
    pub fn to_data(&self, patch_only: bool) -> Record {
        let state = self.inner.state.lock();
        let mut record = Record::new(self.type_name(), self.id());

        for (name, value) in &state.attributes {
            if patch_only && !state.dirty_attributes.contains(name) {
                continue;
            }
            let json = match self.inner.object_type.attribute(name) {
                Some(def) => def.ty.value_to_json(value),
                None => value.to_json(),
            };
            record.attributes.insert(name.clone(), json);
        }
        for (name, id) in &state.belongs_to {
            if patch_only && !state.dirty_relations.contains(name) {
                continue;
            }
            record.belongs_to.insert(name.clone(), id.clone());
        }
        record
    }

    /// Save this entity and every dirty entity it refers to.
    ///
    /// On partial failure the first per-entity error is returned.
    pub async fn save(&self) -> Result<()> {
        let mut batch = self.store().batch();
        batch.save(self)?;
        batch.execute().await.map_err(|err| match err {
            Error::Batch(batch_err) => batch_err.into_first_error(),
            other => other,
        })
    }

    /// Delete this entity.
    pub async fn destroy(&self) -> Result<()> {
        let mut batch = self.store().batch();
        batch.destroy(self)?;
        batch.execute().await.map_err(|err| match err {
            Error::Batch(batch_err) => batch_err.into_first_error(),
            other => other,
        })
    }

    /// Re-read the entity from storage.
    ///
    /// Attribute edits are discarded. Relationships set locally are kept;
    /// every other cached relationship and has-many query is dropped.
    pub async fn reload(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed {
                type_name: self.type_name().to_string(),
                id: self.id().to_string(),
            });
        }
        let record = self
            .store()
            .adapter()
            .get(self.type_name(), self.id())
            .await?
            .ok_or_else(|| AdapterError::NotFound {
                type_name: self.type_name().to_string(),
                id: self.id().to_string(),
            })?;
        self.rehydrate(&record)
    }

    /// Replace state with a record's, as after a fetch.
    pub(crate) fn rehydrate(&self, record: &Record) -> Result<()> {
        let (attributes, belongs_to) = decode(&self.inner.object_type, record)?;
        let mut state = self.inner.state.lock();
        state.attributes = attributes;
        state.dirty_attributes.clear();
        for (name, id) in belongs_to {
            if state.dirty_relations.contains(&name) {
                continue;
            }
            state.related.remove(&name);
            state.belongs_to.insert(name, id);
        }
        state.has_many.clear();
        state.persisted = true;
        trace!(object_type = %self.type_name(), id = %self.id(), "rehydrated");
        Ok(())
    }

    /// Record a successful put or patch of `sent`.
    ///
    /// Only fields still equal to what was sent stop being dirty, so edits
    /// made while the write was in flight are kept.
    pub(crate) fn mark_persisted(&self, sent: &Record) {
        let mut state = self.inner.state.lock();
        state.persisted = true;

        let object_type = &self.inner.object_type;
        let EntityState {
            attributes,
            dirty_attributes,
            belongs_to,
            dirty_relations,
            ..
        } = &mut *state;

        dirty_attributes.retain(|name| {
            let current = attributes
                .get(name)
                .map(|value| match object_type.attribute(name) {
                    Some(def) => def.ty.value_to_json(value),
                    None => value.to_json(),
                });
            current.as_ref() != sent.attributes.get(name)
        });
        dirty_relations.retain(|name| belongs_to.get(name) != sent.belongs_to.get(name));
    }

    /// Record a successful delete.
    pub(crate) fn mark_destroyed(&self) {
        let mut state = self.inner.state.lock();
        state.destroyed = true;
        state.persisted = false;
    }

    /// Copy into a new entity of `type_name` (or the same type).
    ///
    /// Attributes and belongs-to relationships the target type shares are
    /// copied and marked dirty. The copy keeps the id and persisted flag when
    /// the source is persisted, and gets a fresh id otherwise.
    pub fn clone_as(&self, type_name: Option<&str>) -> Result<Entity> {
        let target = match type_name {
            Some(name) => self.store().object_type(name)?,
            None => self.inner.object_type.clone(),
        };
        let same_type = target.name == self.inner.object_type.name;

        let source = self.inner.state.lock();
        let persisted = source.persisted && same_type;
        let mut state = EntityState::empty(persisted);

        for def in target.attributes.values() {
            let value = match source.attributes.get(&def.name) {
                Some(value) => {
                    state.dirty_attributes.insert(def.name.clone());
                    def.ty
                        .cast(value)
                        .map_err(|e| e.for_attribute(def.name.clone()))?
                }
                None => def.default.clone(),
            };
            state.attributes.insert(def.name.clone(), value);
        }

        for (name, rel) in &target.belongs_to {
            let compatible = self
                .inner
                .object_type
                .belongs_to_relationship(name)
                .is_some_and(|own| own.foreign_type == rel.foreign_type);
            if !compatible {
                state.belongs_to.insert(name.clone(), None);
                continue;
            }
            let id = source.belongs_to.get(name).cloned().flatten();
            if let Some(RelationSlot::Resolved(cached)) = source.related.get(name) {
                state
                    .related
                    .insert(name.clone(), RelationSlot::Resolved(cached.clone()));
            }
            state.belongs_to.insert(name.clone(), id);
            state.dirty_relations.insert(name.clone());
        }

        let id = if source.persisted {
            self.inner.id.clone()
        } else {
            Uuid::new_v4().to_string()
        };
        drop(source);

        Ok(Self::from_parts(id, target, self.store().clone(), state))
    }
}

impl From<&Entity> for Value {
    fn from(entity: &Entity) -> Self {
        Value::String(entity.id().to_string())
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::from(&entity)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Entity");
        out.field("type", &self.type_name()).field("id", &self.id());
        if let Some(state) = self.inner.state.try_lock() {
            out.field("persisted", &state.persisted)
                .field("destroyed", &state.destroyed)
                .field("dirty", &state.dirty_attributes);
        }
        out.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use ormkit_proto::{AttributeDef, AttributeType, Schema};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> Store {
        let schema = Schema::new()
            .with_type(
                ObjectType::new("Phone")
                    .with_attribute("model", AttributeType::Text)
                    .with_attribute("price", AttributeType::Integer)
                    .with_attribute_def(
                        AttributeDef::new("active", AttributeType::Boolean).with_default(true),
                    )
                    .belongs_to("room", "Room", "phones"),
            )
            .with_type(
                ObjectType::new("Tablet")
                    .with_attribute("model", AttributeType::Text)
                    .belongs_to("room", "Room", "tablets"),
            )
            .with_type(ObjectType::new("Room").with_attribute("name", AttributeType::Text));
        Store::new(Arc::new(MemoryAdapter::new()), schema)
    }

    #[test]
    fn test_new_entity_defaults() {
        let phone = store().create("Phone").unwrap();
        assert!(!phone.is_persisted());
        assert!(phone.is_dirty());
        assert!(phone.dirty_attributes().is_empty());
        assert_eq!(phone.get("active").unwrap(), Value::Bool(true));
        assert_eq!(phone.get("model").unwrap(), Value::Null);
        assert_eq!(phone.get("id").unwrap(), Value::String(phone.id().into()));
        assert!(Uuid::parse_str(phone.id()).is_ok());
    }

    #[test]
    fn test_set_casts_and_tracks_dirty() {
        let store = store();
        let phone = store
            .build(Record::new("Phone", "p1").with_attribute("price", 100))
            .unwrap();
        assert!(!phone.is_dirty());

        phone.set("price", "100").unwrap();
        assert!(!phone.is_dirty(), "equal value after cast is not a change");

        phone.set("price", 120).unwrap();
        assert_eq!(phone.dirty_attributes(), vec!["price"]);
        assert_eq!(phone.get("price").unwrap(), Value::Int(120));
    }

    #[test]
    fn test_failed_cast_leaves_state() {
        let phone = store().create("Phone").unwrap();
        phone.set("price", 5).unwrap();

        let err = phone.set("price", "lots").unwrap_err();
        let Error::Cast(cast) = err else {
            panic!("expected cast error");
        };
        assert_eq!(cast.attribute, "price");
        assert_eq!(phone.get("price").unwrap(), Value::Int(5));

        assert!(matches!(
            phone.set("colour", "red"),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_build_round_trip() {
        let record = Record::new("Phone", "p1")
            .with_attribute("model", "5230")
            .with_attribute("price", 99)
            .with_attribute("active", false)
            .with_relation("room", Some("r1"));
        let phone = store().build(record.clone()).unwrap();
        assert!(phone.is_persisted());
        assert_eq!(phone.to_data(false), record);
        assert_eq!(phone.to_data(true), Record::new("Phone", "p1"));
    }

    #[test]
    fn test_build_rejects_wrong_type_and_bad_values() {
        let store = store();
        let phone_type = store.object_type("Phone").unwrap();
        assert!(matches!(
            Entity::hydrate(store.clone(), phone_type, Record::new("Room", "r1")),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.build(Record::new("Phone", "p1").with_attribute("price", "many")),
            Err(Error::Cast(_))
        ));
    }

    #[test]
    fn test_patch_data_has_only_dirty_fields() {
        let phone = store()
            .build(
                Record::new("Phone", "p1")
                    .with_attribute("model", "5230")
                    .with_relation("room", Some("r1")),
            )
            .unwrap();
        phone.set("model", "5800").unwrap();
        phone.set_related_id("room", Some("r2")).unwrap();

        let patch = phone.to_data(true);
        assert_eq!(patch.attributes.len(), 1);
        assert_eq!(patch.attributes["model"], json!("5800"));
        assert_eq!(patch.relation_id("room"), Some("r2"));
    }

    #[test]
    fn test_mark_persisted_keeps_newer_edits() {
        let phone = store().create("Phone").unwrap();
        phone.set("model", "5230").unwrap();
        phone.set("price", 10).unwrap();
        let sent = phone.to_data(false);
        phone.set("price", 12).unwrap();

        phone.mark_persisted(&sent);
        assert!(phone.is_persisted());
        assert_eq!(phone.dirty_attributes(), vec!["price"]);
    }

    #[test]
    fn test_clone_as() {
        let store = store();
        let fresh = store.create("Phone").unwrap();
        fresh.set("model", "N95").unwrap();
        let copy = fresh.clone_as(None).unwrap();
        assert_ne!(copy.id(), fresh.id());
        assert!(!copy.is_persisted());
        assert_eq!(copy.get("model").unwrap(), Value::from("N95"));

        let saved = store
            .build(
                Record::new("Phone", "p1")
                    .with_attribute("model", "5230")
                    .with_relation("room", Some("r1")),
            )
            .unwrap();
        let same = saved.clone_as(None).unwrap();
        assert_eq!(same.id(), "p1");
        assert!(same.is_persisted());
        assert!(!same.ptr_eq(&saved));

        let tablet = saved.clone_as(Some("Tablet")).unwrap();
        assert_eq!(tablet.type_name(), "Tablet");
        assert_eq!(tablet.get("model").unwrap(), Value::from("5230"));
        assert_eq!(tablet.related_id("room").unwrap(), Some("r1".to_string()));
        assert!(matches!(tablet.get("price"), Err(Error::UnknownAttribute { .. })));
    }

    #[test]
    fn test_entity_as_value() {
        let phone = store().create("Phone").unwrap();
        assert_eq!(Value::from(&phone), Value::String(phone.id().to_string()));
    }
}
