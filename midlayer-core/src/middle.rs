//! The middle facade (4.E): the only capability surface the output stage
//! may call, kept as a small interface rather than a class hierarchy (see
//! the "Polymorphism" design note).
//!
//! [`MiddleRead`] is the read-only half, clonable per worker via
//! [`Middle::read_view`]; [`Middle`] adds the single-writer mutation and
//! pending-id iteration surface.

use geo::Coord;

use crate::primitive::{Relation, Way};

/// The write half of the pending-id protocol, passed to `iterate_pending_*`
/// callbacks so they may re-enqueue ids without otherwise touching the
/// store (4.D, 4.E, and the open question on late enqueue in `SPEC_FULL.md`
/// §9).
pub trait PendingMarker {
    /// Mark a way id as pending, honouring the late-enqueue tombstone
    /// policy documented on [`Middle::iterate_pending_ways`].
    fn mark_way_pending(&mut self, id: i64);
    /// Mark a relation id as pending, honouring the same policy.
    fn mark_relation_pending(&mut self, id: i64);
}

/// Read-only access to the middle's stores.
///
/// Implementers must tolerate absence for any id: a missing node is
/// dropped from `nodes_get_list`'s output rather than erroring, and a
/// missing way or relation is `None`. This mirrors §6's "callers must not
/// assume any particular backing; they must tolerate MISSING for any id."
pub trait MiddleRead {
    /// Resolve `refs` to coordinates, preserving order and dropping ids
    /// with no known location.
    fn nodes_get_list(&self, refs: &[i64]) -> Vec<Coord<f64>>;

    /// Fetch a single way by id.
    fn way_get(&self, id: i64) -> Option<Way>;

    /// Fetch the subset of `ids` that exist, preserving the input order.
    fn ways_get_list(&self, ids: &[i64]) -> Vec<Way>;

    /// Fetch a single relation by id.
    fn relation_get(&self, id: i64) -> Option<Relation>;

    /// Return the ids of relations currently referencing `way_id` as a
    /// member, ascending and deduplicated.
    fn relations_using_way(&self, way_id: i64) -> Vec<i64>;
}

/// The full middle facade: read access plus the single-writer mutation
/// surface and the pending-id protocol.
///
/// A `Middle` implementation must support cloning for read (§4.E, §5): N
/// independent [`Middle::ReadView`] handles usable concurrently from N
/// worker threads, while writes remain confined to the thread holding the
/// `Middle` itself.
pub trait Middle: MiddleRead + PendingMarker {
    /// A cloned, read-only handle usable from a worker thread.
    type ReadView: MiddleRead;

    /// The error type surfaced by this implementation's fallible
    /// operations (cache exhaustion, flat-file I/O, invariant violations).
    type Error: std::error::Error + 'static;

    /// Produce an independent read-only view of the current state.
    #[must_use]
    fn read_view(&self) -> Self::ReadView;

    /// Store or update a node's location.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the underlying store rejects the write in
    /// strict mode (cache exhaustion, out-of-order sparse insert, or flat
    /// file I/O failure).
    fn nodes_set(&mut self, id: i64, location: Coord<f64>) -> Result<(), Self::Error>;

    /// Delete a node's location from every backing store.
    fn nodes_delete(&mut self, id: i64);

    /// Insert or replace a way record.
    fn ways_set(&mut self, way: Way);

    /// Delete a way record. Its membership is also dropped from every
    /// relation's reverse index as a side effect of later `relations_set`
    /// diffs, but the way record itself is removed immediately.
    fn ways_delete(&mut self, id: i64);

    /// Insert or replace a relation record, diffing its way members
    /// against the previous record (if any) to update the way→relations
    /// reverse index (4.D).
    fn relations_set(&mut self, relation: Relation);

    /// Delete a relation record, dropping it from every member way's
    /// reverse index entry.
    fn relations_delete(&mut self, id: i64);

    /// Invoke `callback` once per pending way id, ascending, removing each
    /// mark as it is delivered.
    ///
    /// Ids (re-)marked by the callback via
    /// [`PendingMarker::mark_way_pending`] above the current watermark are
    /// delivered within the same pass; ids at or below the watermark are
    /// silently dropped. This is the documented, preserved behaviour from
    /// `SPEC_FULL.md` §9's first Open Question, not a bug to be fixed.
    ///
    /// # Errors
    ///
    /// Propagates a non-monotonic pop from the underlying id tracker.
    fn iterate_pending_ways(
        &mut self,
        callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), Self::Error>;

    /// As [`Middle::iterate_pending_ways`], for pending relation ids.
    ///
    /// # Errors
    ///
    /// Propagates a non-monotonic pop from the underlying id tracker.
    fn iterate_pending_relations(
        &mut self,
        callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), Self::Error>;
}
