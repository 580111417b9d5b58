//! Batched preloading of belongs-to relationships.
//!
//! Each level of the preload tree costs one `get_all` per relationship,
//! however many owners the level has. Sibling relationships load
//! concurrently.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use ormkit_proto::ObjectType;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::store::Store;

/// Nested set of relationship names to preload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadTree {
    children: BTreeMap<String, PreloadTree>,
}

impl PreloadTree {
    /// Add a dotted path such as `"room.floor"`.
    pub fn insert_path(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    /// Check if nothing is requested.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Relationship names at this level with their nested trees.
    pub fn children(&self) -> impl Iterator<Item = (&str, &PreloadTree)> {
        self.children.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    /// Every path from the root, parents before children.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for (name, subtree) in &self.children {
            paths.push(name.clone());
            paths.extend(
                subtree
                    .paths()
                    .into_iter()
                    .map(|rest| format!("{}.{}", name, rest)),
            );
        }
        paths
    }
}

/// Resolve `tree` for `owners`, all of type `object_type`.
pub(crate) fn resolve<'a>(
    store: &'a Store,
    object_type: Arc<ObjectType>,
    owners: Vec<Entity>,
    tree: &'a PreloadTree,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let branches = tree
            .children()
            .map(|(name, subtree)| resolve_branch(store, &object_type, &owners, name, subtree));
        try_join_all(branches).await?;
        Ok(())
    }
    .boxed()
}

async fn resolve_branch(
    store: &Store,
    object_type: &ObjectType,
    owners: &[Entity],
    name: &str,
    subtree: &PreloadTree,
) -> Result<()> {
    let rel = object_type
        .belongs_to_relationship(name)
        .ok_or_else(|| Error::unknown_relationship(&object_type.name, name))?;
    let foreign = store.object_type(&rel.foreign_type)?;

    // Owners holding a locally set relationship keep it.
    let targets: Vec<(&Entity, Option<String>)> = owners
        .iter()
        .filter_map(|owner| owner.preload_target(name).map(|id| (owner, id)))
        .collect();

    let mut seen = HashSet::new();
    let ids: Vec<String> = targets
        .iter()
        .filter_map(|(_, id)| id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect();

    debug!(
        object_type = %object_type.name,
        relationship = name,
        owners = targets.len(),
        ids = ids.len(),
        "preloading relationship"
    );

    let mut resolved: HashMap<String, Entity> = HashMap::new();
    if !ids.is_empty() {
        let records = store.adapter().get_all(&foreign.name, &ids).await?;
        for (id, record) in ids.iter().zip(records) {
            if let Some(record) = record {
                let entity = Entity::hydrate(store.clone(), foreign.clone(), record)?;
                resolved.insert(id.clone(), entity);
            }
        }
    }

    for (owner, id) in &targets {
        let target = id.as_ref().and_then(|id| resolved.get(id)).cloned();
        owner.cache_preloaded(name, target);
    }

    if !subtree.is_empty() {
        let next: Vec<Entity> = ids.iter().filter_map(|id| resolved.get(id).cloned()).collect();
        if !next.is_empty() {
            resolve(store, foreign, next, subtree).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_paths_share_prefixes() {
        let mut tree = PreloadTree::default();
        tree.insert_path("room.floor");
        tree.insert_path("owner");
        tree.insert_path("room.building");
        tree.insert_path("room");

        assert_eq!(
            tree.paths(),
            vec!["owner", "room", "room.building", "room.floor"]
        );
        assert!(!tree.is_empty());
        assert!(PreloadTree::default().is_empty());
    }
}
