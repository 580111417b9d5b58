//! Write batching.
//!
//! A batch records save and destroy intents per entity identity and turns
//! them into at most one adapter operation per identity when executed. The
//! first intent for an identity fixes its position; a destroy, once
//! recorded, overrides every save. Operations are computed from entity
//! state when the batch is materialized, not when intents are recorded.

use std::collections::{HashMap, HashSet};

use ormkit_proto::BatchOp;
use tracing::debug;

use crate::entity::{Entity, Identity};
use crate::error::{AdapterError, BatchError, BatchFailure, Error, Result};
use crate::store::Store;

struct Slot {
    entity: Entity,
    destroy: bool,
}

/// One materialized operation and the entity it came from.
struct Planned {
    entity: Entity,
    op: BatchOp,
}

/// Pending saves and destroys for one adapter.
pub struct Batch {
    store: Store,
    slots: Vec<Slot>,
    index: HashMap<Identity, usize>,
}

impl Batch {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The store this batch writes through.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Record a save of `entity` and of every dirty entity reachable through
    /// its cached belongs-to relationships.
    ///
    /// Related entities on another adapter are skipped. Destroyed entities
    /// are ignored.
    pub fn save(&mut self, entity: &Entity) -> Result<()> {
        self.check_adapter(entity)?;

        let mut visited = HashSet::new();
        let mut pending = vec![entity.clone()];
        while let Some(next) = pending.pop() {
            if !visited.insert(next.identity()) || next.is_destroyed() {
                continue;
            }
            self.record(&next, false);

            for related in next.cached_related() {
                if !related.is_dirty() {
                    continue;
                }
                if !self.store.same_adapter(related.store()) {
                    debug!(
                        owner = %next.identity(),
                        related = %related.identity(),
                        "skipping related entity on another adapter"
                    );
                    continue;
                }
                pending.push(related);
            }
        }
        Ok(())
    }

    /// Record a destroy of `entity`. Overrides any save of the same identity.
    pub fn destroy(&mut self, entity: &Entity) -> Result<()> {
        self.check_adapter(entity)?;
        if entity.is_destroyed() {
            return Ok(());
        }
        self.record(entity, true);
        Ok(())
    }

    fn check_adapter(&self, entity: &Entity) -> Result<()> {
        if self.store.same_adapter(entity.store()) {
            Ok(())
        } else {
            Err(Error::ForeignAdapter {
                type_name: entity.type_name().to_string(),
                id: entity.id().to_string(),
            })
        }
    }

    fn record(&mut self, entity: &Entity, destroy: bool) {
        match self.index.get(&entity.identity()) {
            Some(&position) => {
                let slot = &mut self.slots[position];
                if slot.destroy {
                    return;
                }
                slot.entity = entity.clone();
                slot.destroy = destroy;
            }
            None => {
                self.index.insert(entity.identity(), self.slots.len());
                self.slots.push(Slot {
                    entity: entity.clone(),
                    destroy,
                });
            }
        }
    }

    /// Number of identities recorded.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn plan(&self) -> Vec<Planned> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let entity = &slot.entity;
                if entity.is_destroyed() {
                    return None;
                }
                let op = if slot.destroy {
                    if !entity.is_persisted() {
                        return None;
                    }
                    BatchOp::delete(entity.type_name(), entity.id())
                } else if !entity.is_persisted() {
                    BatchOp::put(entity.to_data(false))
                } else if entity.is_dirty() {
                    BatchOp::patch(entity.to_data(true))
                } else {
                    return None;
                };
                Some(Planned {
                    entity: entity.clone(),
                    op,
                })
            })
            .collect()
    }

    /// The operations the batch would send right now, in order.
    pub fn ops(&self) -> Vec<BatchOp> {
        self.plan().into_iter().map(|planned| planned.op).collect()
    }

    /// Send the batch to the adapter in one call.
    ///
    /// Successful operations mark their entities persisted or destroyed.
    /// Failed ones leave their entities untouched, so saving again retries
    /// them, and are reported together as [`Error::Batch`].
    pub async fn execute(self) -> Result<()> {
        // Destroying something that was never stored needs no round trip, but
        // only takes effect once the rest of the batch went through.
        let local_destroys: Vec<&Entity> = self
            .slots
            .iter()
            .filter(|slot| slot.destroy && !slot.entity.is_persisted())
            .map(|slot| &slot.entity)
            .collect();

        let planned = self.plan();
        if planned.is_empty() {
            debug!("batch has nothing to write");
            local_destroys.iter().for_each(|entity| entity.mark_destroyed());
            return Ok(());
        }

        let ops: Vec<BatchOp> = planned.iter().map(|p| p.op.clone()).collect();
        debug!(ops = ops.len(), "executing batch");
        let results = self.store.adapter().apply_batch(&ops).await?;
        if results.len() != ops.len() {
            return Err(AdapterError::Storage(format!(
                "adapter returned {} results for {} operations",
                results.len(),
                ops.len()
            ))
            .into());
        }
        local_destroys.iter().for_each(|entity| entity.mark_destroyed());

        let total = ops.len();
        let mut failures = Vec::new();
        for (Planned { entity, op }, result) in planned.into_iter().zip(results) {
            match result {
                Ok(()) => apply_success(&entity, &op),
                Err(error) => {
                    debug!(entity = %entity.identity(), %error, "batch operation failed");
                    failures.push(BatchFailure { entity, error });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            debug!(failed = failures.len(), total, "batch partially failed");
            Err(BatchError { failures, total }.into())
        }
    }
}

fn apply_success(entity: &Entity, op: &BatchOp) {
    match op {
        BatchOp::Put { record } | BatchOp::Patch { record } => entity.mark_persisted(record),
        BatchOp::Delete { .. } => entity.mark_destroyed(),
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots: Vec<(Identity, bool)> = self
            .slots
            .iter()
            .map(|slot| (slot.entity.identity(), slot.destroy))
            .collect();
        f.debug_struct("Batch").field("slots", &slots).finish()
    }
}
