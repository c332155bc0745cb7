//! `RamMiddle`: the in-process `Middle` implementation (4.E) composing the
//! RAM node cache (4.B), the optional flat node file (4.C), and the
//! way/relation store (4.D) behind a single shared lock.
//!
//! Grounded on `examples/original_source/middle/middle-pgsql.hpp`'s
//! aggregation of a node cache, a persistent node store, and way/relation
//! tables behind one facade, and on `wildside_core::store::PoiStore`'s
//! clone-for-read shape (§4.E, §5).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use geo::Coord;
use midlayer_core::{Middle, MiddleRead, PendingMarker, Relation, StrictMode, Way};
use thiserror::Error;

use crate::flat_file::{FlatNodeStore, FlatNodeStoreError};
use crate::ram_cache::{RamCacheConfig, RamCacheError, RamNodeCache};
use crate::way_relation::{WayRelationStore, WayRelationStoreError};

/// Construction-time configuration for [`RamMiddle`].
#[derive(Debug, Clone)]
pub struct RamMiddleConfig {
    /// Strictness policy for the ways-pending and relations-pending
    /// trackers.
    pub strict_mode: StrictMode,
    /// RAM node cache configuration (4.B).
    pub ram_cache: RamCacheConfig,
    /// Path to the flat node file (4.C). `None` runs the node cache
    /// without a persistent companion, so capacity exhaustion loses data
    /// rather than falling back to disk.
    pub flat_node_file: Option<PathBuf>,
}

impl Default for RamMiddleConfig {
    fn default() -> Self {
        Self {
            strict_mode: StrictMode::default(),
            ram_cache: RamCacheConfig::default(),
            flat_node_file: None,
        }
    }
}

/// Errors raised by [`RamMiddle`] operations.
#[derive(Debug, Error)]
pub enum RamMiddleError {
    /// The flat node file rejected a read or write.
    #[error(transparent)]
    FlatFile(#[from] FlatNodeStoreError),
    /// The way/relation store's pending-id tracker observed a violation.
    #[error(transparent)]
    WayRelation(#[from] WayRelationStoreError),
    /// The RAM node cache is exhausted (or received an out-of-order sparse
    /// insert) in strict mode, with no flat node file configured to absorb
    /// the loss (§5 back-pressure, §6 `CACHE_FULL`, §7: a memory-budget
    /// overflow in B is fatal in strict mode without a flat-file backstop).
    #[error(transparent)]
    Cache(#[from] RamCacheError),
}

struct Inner {
    node_cache: RamNodeCache,
    flat_file: Option<FlatNodeStore>,
    way_relation: WayRelationStore,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_nodes(inner: &Mutex<Inner>, refs: &[i64]) -> Vec<Coord<f64>> {
    let mut guard = lock(inner);
    let Inner {
        node_cache,
        flat_file,
        ..
    } = &mut *guard;
    refs.iter()
        .filter_map(|&id| {
            node_cache.get(id).or_else(|| {
                flat_file
                    .as_mut()
                    .and_then(|store| store.get(id).ok().flatten())
            })
        })
        .collect()
}

/// Shared state behind [`RamMiddle`] and its [`RamMiddleReadView`] clones.
///
/// In-process only; `midlayer-store` is the sole implementation of
/// `Middle` in this workspace (§4.E "leaving room for an
/// external-store implementation as a non-goal").
pub struct RamMiddle {
    inner: Arc<Mutex<Inner>>,
}

impl RamMiddle {
    /// Construct an empty middle, opening the flat node file if
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`RamMiddleError::FlatFile`] if `config.flat_node_file` is
    /// set and cannot be opened.
    pub fn new(config: RamMiddleConfig) -> Result<Self, RamMiddleError> {
        let flat_file = config
            .flat_node_file
            .as_ref()
            .map(FlatNodeStore::open)
            .transpose()?;
        let inner = Inner {
            node_cache: RamNodeCache::new(config.ram_cache),
            flat_file,
            way_relation: WayRelationStore::new(config.strict_mode),
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }
}

impl MiddleRead for RamMiddle {
    fn nodes_get_list(&self, refs: &[i64]) -> Vec<Coord<f64>> {
        read_nodes(&self.inner, refs)
    }

    fn way_get(&self, id: i64) -> Option<Way> {
        lock(&self.inner).way_relation.way(id).cloned()
    }

    fn ways_get_list(&self, ids: &[i64]) -> Vec<Way> {
        lock(&self.inner).way_relation.ways(ids)
    }

    fn relation_get(&self, id: i64) -> Option<Relation> {
        lock(&self.inner).way_relation.relation(id).cloned()
    }

    fn relations_using_way(&self, way_id: i64) -> Vec<i64> {
        lock(&self.inner).way_relation.relations_using_way(way_id)
    }
}

impl PendingMarker for RamMiddle {
    fn mark_way_pending(&mut self, id: i64) {
        lock(&self.inner).way_relation.mark_way_pending(id);
    }

    fn mark_relation_pending(&mut self, id: i64) {
        lock(&self.inner).way_relation.mark_relation_pending(id);
    }
}

impl Middle for RamMiddle {
    type ReadView = RamMiddleReadView;
    type Error = RamMiddleError;

    fn read_view(&self) -> Self::ReadView {
        RamMiddleReadView {
            inner: Arc::clone(&self.inner),
        }
    }

    fn nodes_set(&mut self, id: i64, location: Coord<f64>) -> Result<(), Self::Error> {
        let mut guard = lock(&self.inner);
        if let Some(flat_file) = guard.flat_file.as_mut() {
            flat_file.set(id, location)?;
        }
        let has_backstop = guard.flat_file.is_some();
        match guard.node_cache.set(id, location) {
            Ok(()) => Ok(()),
            // The flat file already has the authoritative copy; losing the
            // cache's copy only costs a slower lookup on the next read.
            Err(err) if has_backstop => {
                log::warn!(
                    "ram node cache could not retain node {id}, falling back to the flat node file: {err}"
                );
                Ok(())
            }
            Err(err) => Err(RamMiddleError::Cache(err)),
        }
    }

    fn nodes_delete(&mut self, id: i64) {
        let mut guard = lock(&self.inner);
        guard.node_cache.delete(id);
        if let Some(flat_file) = guard.flat_file.as_mut() {
            if let Err(err) = flat_file.delete(id) {
                log::warn!("flat node file failed to clear node {id}: {err}");
            }
        }
    }

    fn ways_set(&mut self, way: Way) {
        lock(&self.inner).way_relation.store_way(way);
    }

    fn ways_delete(&mut self, id: i64) {
        lock(&self.inner).way_relation.delete_way(id);
    }

    fn relations_set(&mut self, relation: Relation) {
        lock(&self.inner).way_relation.store_relation(relation);
    }

    fn relations_delete(&mut self, id: i64) {
        lock(&self.inner).way_relation.delete_relation(id);
    }

    fn iterate_pending_ways(
        &mut self,
        callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), Self::Error> {
        lock(&self.inner)
            .way_relation
            .iterate_pending_ways(callback)?;
        Ok(())
    }

    fn iterate_pending_relations(
        &mut self,
        callback: impl FnMut(i64, &mut dyn PendingMarker),
    ) -> Result<(), Self::Error> {
        lock(&self.inner)
            .way_relation
            .iterate_pending_relations(callback)?;
        Ok(())
    }
}

/// A cloned, read-only handle to a [`RamMiddle`], usable from a single
/// worker thread (§4.E, §5). Shares the same underlying lock as the
/// middle it was cloned from, so it always observes the writer's
/// latest committed state.
#[derive(Clone)]
pub struct RamMiddleReadView {
    inner: Arc<Mutex<Inner>>,
}

impl MiddleRead for RamMiddleReadView {
    fn nodes_get_list(&self, refs: &[i64]) -> Vec<Coord<f64>> {
        read_nodes(&self.inner, refs)
    }

    fn way_get(&self, id: i64) -> Option<Way> {
        lock(&self.inner).way_relation.way(id).cloned()
    }

    fn ways_get_list(&self, ids: &[i64]) -> Vec<Way> {
        lock(&self.inner).way_relation.ways(ids)
    }

    fn relation_get(&self, id: i64) -> Option<Relation> {
        lock(&self.inner).way_relation.relation(id).cloned()
    }

    fn relations_using_way(&self, way_id: i64) -> Vec<i64> {
        lock(&self.inner).way_relation.relations_using_way(way_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{RamMiddle, RamMiddleConfig, RamMiddleError};
    use crate::ram_cache::{CacheStrategy, RamCacheConfig, RamCacheError};
    use geo::Coord;
    use midlayer_core::{Member, MemberType, Middle, MiddleRead, Relation, Way};
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn coord(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[rstest]
    fn nodes_round_trip_through_cache_only() {
        let mut middle = RamMiddle::new(RamMiddleConfig::default()).expect("construct middle");
        middle.nodes_set(1, coord(1.0, 2.0)).expect("store node");
        assert_eq!(middle.nodes_get_list(&[1, 2]), vec![coord(1.0, 2.0)]);
    }

    #[rstest]
    fn nodes_fall_back_to_flat_file_when_evicted_from_cache() {
        let file = NamedTempFile::new().expect("create temp file");
        let config = RamMiddleConfig {
            flat_node_file: Some(file.path().to_path_buf()),
            ram_cache: crate::ram_cache::RamCacheConfig {
                capacity_bytes: 0,
                ..crate::ram_cache::RamCacheConfig::default()
            },
            ..RamMiddleConfig::default()
        };
        let mut middle = RamMiddle::new(config).expect("construct middle");
        middle.nodes_set(7, coord(3.0, 4.0)).expect("store node");
        assert_eq!(middle.nodes_get_list(&[7]), vec![coord(3.0, 4.0)]);
    }

    #[rstest]
    fn nodes_set_fails_fatally_when_cache_is_full_and_no_flat_file_backstops_it() {
        let config = RamMiddleConfig {
            ram_cache: RamCacheConfig {
                capacity_bytes: 0,
                strategy: CacheStrategy::Dense,
                lossy: false,
            },
            ..RamMiddleConfig::default()
        };
        let mut middle = RamMiddle::new(config).expect("construct middle");
        let err = middle
            .nodes_set(1, coord(1.0, 2.0))
            .expect_err("no backstop means a full cache is fatal");
        match err {
            RamMiddleError::Cache(RamCacheError::Exhausted { id }) => assert_eq!(id, 1),
            other => panic!("expected RamMiddleError::Cache(Exhausted), found {other:?}"),
        }
    }

    #[rstest]
    fn nodes_delete_clears_both_layers() {
        let file = NamedTempFile::new().expect("create temp file");
        let config = RamMiddleConfig {
            flat_node_file: Some(file.path().to_path_buf()),
            ..RamMiddleConfig::default()
        };
        let mut middle = RamMiddle::new(config).expect("construct middle");
        middle.nodes_set(9, coord(0.0, 0.0)).expect("store node");
        middle.nodes_delete(9);
        assert_eq!(middle.nodes_get_list(&[9]), Vec::<Coord<f64>>::new());
    }

    #[rstest]
    fn read_view_observes_writer_updates() {
        let mut middle = RamMiddle::new(RamMiddleConfig::default()).expect("construct middle");
        let view = middle.read_view();
        middle.ways_set(Way::new(1, vec![10, 20], Vec::new()));
        assert_eq!(view.way_get(1), Some(Way::new(1, vec![10, 20], Vec::new())));
    }

    #[rstest]
    fn relations_using_way_reflects_stored_relation() {
        let mut middle = RamMiddle::new(RamMiddleConfig::default()).expect("construct middle");
        middle.relations_set(Relation::new(
            100,
            vec![Member::new(MemberType::Way, 5, "outer".to_owned())],
            Vec::new(),
        ));
        assert_eq!(middle.relations_using_way(5), vec![100]);
    }
}
