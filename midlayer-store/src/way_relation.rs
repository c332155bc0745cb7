//! Persistent id→record store for ways and relations, with a diff-style
//! way→relations reverse index and per-channel pending tracking (4.D).
//!
//! Grounded on `examples/original_source/middle/middle-pgsql.hpp`'s
//! composition of an `id_tracker` per pending channel, and
//! `examples/other_examples/a1c8d3b5_jake-low-osmx-rs__src-lib.rs.rs`'s
//! reverse-index-as-separate-table idiom.

use std::collections::{BTreeMap, BTreeSet};

use midlayer_core::{IdTracker, IdTrackerError, PendingMarker, Relation, StrictMode, Way};
use thiserror::Error;

/// Errors raised by [`WayRelationStore`] operations.
#[derive(Debug, Error)]
pub enum WayRelationStoreError {
    /// A pending-id tracker observed a non-monotonic pop.
    #[error(transparent)]
    IdTracker(#[from] IdTrackerError),
}

/// The way and relation half of the middle (4.D): two id-keyed record
/// maps, a diff-maintained way→relations reverse index, and a pending-id
/// tracker per channel.
#[derive(Default)]
pub struct WayRelationStore {
    ways: BTreeMap<i64, Way>,
    relations: BTreeMap<i64, Relation>,
    way_relations: BTreeMap<i64, BTreeSet<i64>>,
    ways_pending: IdTracker,
    relations_pending: IdTracker,
}

impl WayRelationStore {
    /// Construct an empty store using the given strictness policy for its
    /// pending-id trackers.
    #[must_use]
    pub fn new(strict_mode: StrictMode) -> Self {
        Self {
            ways: BTreeMap::new(),
            relations: BTreeMap::new(),
            way_relations: BTreeMap::new(),
            ways_pending: IdTracker::new(strict_mode),
            relations_pending: IdTracker::new(strict_mode),
        }
    }

    /// Insert or replace a way record.
    pub fn store_way(&mut self, way: Way) {
        self.ways.insert(way.id, way);
    }

    /// Fetch a single way by id.
    #[must_use]
    pub fn way(&self, id: i64) -> Option<&Way> {
        self.ways.get(&id)
    }

    /// Fetch the subset of `ids` that exist, preserving input order.
    #[must_use]
    pub fn ways(&self, ids: &[i64]) -> Vec<Way> {
        ids.iter().filter_map(|id| self.ways.get(id).cloned()).collect()
    }

    /// Delete a way record. Does not touch any relation's reverse index
    /// entry; that happens only when the relations that reference it are
    /// themselves updated or deleted.
    pub fn delete_way(&mut self, id: i64) {
        self.ways.remove(&id);
    }

    /// Insert or replace a relation record, diffing its way members
    /// against the previous record (if any): way ids present in the old
    /// but not the new lose this relation from their reverse-index entry,
    /// ids newly present gain it.
    pub fn store_relation(&mut self, relation: Relation) {
        let old_way_ids: BTreeSet<i64> = self
            .relations
            .get(&relation.id)
            .map(Relation::way_member_ids)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let new_way_ids: BTreeSet<i64> = relation.way_member_ids().into_iter().collect();

        for &way_id in old_way_ids.difference(&new_way_ids) {
            self.remove_reverse_entry(way_id, relation.id);
        }
        for &way_id in new_way_ids.difference(&old_way_ids) {
            self.way_relations.entry(way_id).or_default().insert(relation.id);
        }

        self.relations.insert(relation.id, relation);
    }

    /// Fetch a single relation by id.
    #[must_use]
    pub fn relation(&self, id: i64) -> Option<&Relation> {
        self.relations.get(&id)
    }

    /// Delete a relation record, dropping it from every member way's
    /// reverse-index entry.
    pub fn delete_relation(&mut self, id: i64) {
        if let Some(relation) = self.relations.remove(&id) {
            for way_id in relation.way_member_ids() {
                self.remove_reverse_entry(way_id, id);
            }
        }
    }

    /// Return the ids of relations currently referencing `way_id`,
    /// ascending and deduplicated.
    #[must_use]
    pub fn relations_using_way(&self, way_id: i64) -> Vec<i64> {
        self.way_relations
            .get(&way_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mark a way id as pending processing.
    pub fn mark_way_pending(&mut self, id: i64) {
        self.ways_pending.mark(id);
    }

    /// Mark a relation id as pending processing.
    pub fn mark_relation_pending(&mut self, id: i64) {
        self.relations_pending.mark(id);
    }

    /// Invoke `callback` once per pending way id, ascending, removing
    /// each mark as it is delivered.
    ///
    /// # Errors
    ///
    /// Propagates a non-monotonic pop from the underlying id tracker.
    pub fn iterate_pending_ways(
        &mut self,
        mut callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), WayRelationStoreError> {
        let relations_pending = &mut self.relations_pending;
        self.ways_pending.iterate_pending(|id, tracker| {
            let mut marker = StoreMarker {
                ways_pending: tracker,
                relations_pending,
            };
            callback(id, &mut marker);
        })?;
        Ok(())
    }

    /// As [`Self::iterate_pending_ways`], for pending relation ids.
    ///
    /// # Errors
    ///
    /// Propagates a non-monotonic pop from the underlying id tracker.
    pub fn iterate_pending_relations(
        &mut self,
        mut callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), WayRelationStoreError> {
        let ways_pending = &mut self.ways_pending;
        self.relations_pending.iterate_pending(|id, tracker| {
            let mut marker = StoreMarker {
                ways_pending,
                relations_pending: tracker,
            };
            callback(id, &mut marker);
        })?;
        Ok(())
    }

    fn remove_reverse_entry(&mut self, way_id: i64, relation_id: i64) {
        if let Some(entry) = self.way_relations.get_mut(&way_id) {
            entry.remove(&relation_id);
            if entry.is_empty() {
                self.way_relations.remove(&way_id);
            }
        }
    }
}

/// Bridges the two independent pending-id trackers so a single
/// `&mut dyn PendingMarker` can be handed to an `iterate_pending_*`
/// callback regardless of which channel is currently iterating.
struct StoreMarker<'a> {
    ways_pending: &'a mut IdTracker,
    relations_pending: &'a mut IdTracker,
}

impl PendingMarker for StoreMarker<'_> {
    fn mark_way_pending(&mut self, id: i64) {
        self.ways_pending.mark_pending_after_watermark(id);
    }

    fn mark_relation_pending(&mut self, id: i64) {
        self.relations_pending.mark_pending_after_watermark(id);
    }
}
