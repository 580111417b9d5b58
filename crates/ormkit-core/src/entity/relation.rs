//! Belongs-to caching and has-many queries.
//!
//! A belongs-to slot is absent (unknown), loading, or resolved to an object
//! or to nothing. A load is a shared future: every caller that asks while it
//! is outstanding awaits the same adapter `get`. Each load carries a ticket,
//! and its result is only stored if the slot still holds that ticket, so a
//! local `set` made while a load is in flight is never overwritten.

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use ormkit_lang::Expression;
use ormkit_proto::Relationship;
use tracing::{debug, trace};

use super::Entity;
use crate::error::{Error, Result};
use crate::query::Query;

pub(super) type LoadFuture = Shared<BoxFuture<'static, Result<Option<Entity>>>>;

pub(super) enum RelationSlot {
    Loading { ticket: u64, future: LoadFuture },
    Resolved(Option<Entity>),
}

impl Entity {
    fn belongs_to_relationship(&self, name: &str) -> Result<&Relationship> {
        self.inner
            .object_type
            .belongs_to_relationship(name)
            .ok_or_else(|| Error::unknown_relationship(self.type_name(), name))
    }

    /// The object a belongs-to relationship points at.
    ///
    /// The first call issues one adapter `get`; calls made while it is
    /// outstanding share its result, and later calls read the cache until the
    /// relationship is set, its id changes, or the entity is reloaded. A
    /// failed load is not cached.
    pub async fn related(&self, name: &str) -> Result<Option<Entity>> {
        let rel = self.belongs_to_relationship(name)?;

        let future = {
            let mut state = self.inner.state.lock();
            let in_flight = match state.related.get(name) {
                Some(RelationSlot::Resolved(target)) => return Ok(target.clone()),
                Some(RelationSlot::Loading { future, .. }) => Some(future.clone()),
                None => None,
            };
            match in_flight {
                Some(future) => {
                    trace!(
                        object_type = %self.type_name(),
                        relationship = name,
                        "joining in-flight load"
                    );
                    future
                }
                None => {
                    let Some(id) = state.belongs_to.get(name).cloned().flatten() else {
                        state
                            .related
                            .insert(name.to_string(), RelationSlot::Resolved(None));
                        return Ok(None);
                    };
                    state.next_ticket += 1;
                    let ticket = state.next_ticket;
                    let future = self.load(name, &rel.foreign_type, id, ticket);
                    state.related.insert(
                        name.to_string(),
                        RelationSlot::Loading {
                            ticket,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    fn load(&self, name: &str, foreign_type: &str, id: String, ticket: u64) -> LoadFuture {
        let store = self.inner.store.clone();
        let owner = Arc::downgrade(&self.inner);
        let name = name.to_string();
        let foreign_type = foreign_type.to_string();

        async move {
            debug!(relationship = %name, %foreign_type, %id, "loading related object");
            let result = store.get(&foreign_type, &id).await;
            if let Some(inner) = owner.upgrade() {
                Entity { inner }.finish_load(&name, ticket, &result);
            }
            result
        }
        .boxed()
        .shared()
    }

    fn finish_load(&self, name: &str, ticket: u64, result: &Result<Option<Entity>>) {
        let mut state = self.inner.state.lock();
        let current = matches!(
            state.related.get(name),
            Some(RelationSlot::Loading { ticket: t, .. }) if *t == ticket
        );
        if !current {
            debug!(relationship = name, ticket, "discarding superseded load");
            return;
        }
        match result {
            Ok(target) => {
                state
                    .related
                    .insert(name.to_string(), RelationSlot::Resolved(target.clone()));
            }
            Err(err) => {
                debug!(relationship = name, error = %err, "related load failed");
                state.related.remove(name);
            }
        }
    }

    /// Point a belongs-to relationship at `target`, or clear it.
    ///
    /// Any load in flight for the relationship is abandoned.
    pub fn set_related(&self, name: &str, target: Option<&Entity>) -> Result<()> {
        let rel = self.belongs_to_relationship(name)?;
        if let Some(target) = target {
            if target.type_name() != rel.foreign_type {
                return Err(Error::TypeMismatch {
                    expected: rel.foreign_type.clone(),
                    actual: target.type_name().to_string(),
                });
            }
        }

        let mut state = self.inner.state.lock();
        state
            .belongs_to
            .insert(name.to_string(), target.map(|t| t.id().to_string()));
        state
            .related
            .insert(name.to_string(), RelationSlot::Resolved(target.cloned()));
        state.dirty_relations.insert(name.to_string());
        Ok(())
    }

    /// Foreign id of a belongs-to relationship.
    pub fn related_id(&self, name: &str) -> Result<Option<String>> {
        self.belongs_to_relationship(name)?;
        Ok(self
            .inner
            .state
            .lock()
            .belongs_to
            .get(name)
            .cloned()
            .flatten())
    }

    /// Set the foreign id of a belongs-to relationship directly.
    ///
    /// A changed id drops the cached object.
    pub fn set_related_id(&self, name: &str, id: Option<&str>) -> Result<()> {
        self.belongs_to_relationship(name)?;
        let id = id.map(str::to_string);

        let mut state = self.inner.state.lock();
        if state.belongs_to.get(name) == Some(&id) {
            return Ok(());
        }
        state.belongs_to.insert(name.to_string(), id);
        state.related.remove(name);
        state.dirty_relations.insert(name.to_string());
        Ok(())
    }

    /// Query over the objects whose belongs-to relationship points back here.
    ///
    /// The query is built once and cached until the entity is reloaded.
    pub fn has_many(&self, name: &str) -> Result<Query> {
        if let Some(query) = self.inner.state.lock().has_many.get(name) {
            return Ok(query.clone());
        }

        let rel = self
            .inner
            .object_type
            .has_many_relationship(name)
            .ok_or_else(|| Error::unknown_relationship(self.type_name(), name))?;
        let foreign = self.store().object_type(&rel.foreign_type)?;
        let query = Query::new(self.store().clone(), foreign)
            .and(Expression::relation_match(rel.foreign_name.clone(), self.id()));

        self.inner
            .state
            .lock()
            .has_many
            .insert(name.to_string(), query.clone());
        Ok(query)
    }

    /// Foreign id to preload for `name`, or `None` if the relationship was
    /// set locally and must be left alone.
    pub(crate) fn preload_target(&self, name: &str) -> Option<Option<String>> {
        let state = self.inner.state.lock();
        if state.dirty_relations.contains(name) {
            return None;
        }
        Some(state.belongs_to.get(name).cloned().flatten())
    }

    /// Store a preloaded object unless the relationship was set locally.
    pub(crate) fn cache_preloaded(&self, name: &str, target: Option<Entity>) {
        let mut state = self.inner.state.lock();
        if state.dirty_relations.contains(name) {
            return;
        }
        state
            .related
            .insert(name.to_string(), RelationSlot::Resolved(target));
    }

    /// Objects currently cached in belongs-to relationships.
    pub(crate) fn cached_related(&self) -> Vec<Entity> {
        self.inner
            .state
            .lock()
            .related
            .values()
            .filter_map(|slot| match slot {
                RelationSlot::Resolved(Some(target)) => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check if a relationship's object is cached (resolved, possibly to nothing).
    pub fn is_related_loaded(&self, name: &str) -> bool {
        matches!(
            self.inner.state.lock().related.get(name),
            Some(RelationSlot::Resolved(_))
        )
    }
}
