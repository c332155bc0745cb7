//! Bounded in-memory node location cache (4.B).
//!
//! Holds an id→coordinate map under a byte budget, using a dense/sparse
//! hybrid layout: a dense array per fixed-width id block, with a min-heap
//! of blocks keyed on "used count" so the least-full block is evicted
//! first once the block budget is exhausted. Grounded on
//! `examples/original_source/node-ram-cache.{hpp,cpp}`.

use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::Once;

use geo::Coord;
use thiserror::Error;

/// Ids per dense block (`BLOCK_SHIFT` in the original `node-ram-cache.cpp`,
/// distinct from the unrelated `middle-ram.cpp` constant of the same
/// name).
const BLOCK_SHIFT: u32 = 13;
const PER_BLOCK: usize = 1 << BLOCK_SHIFT;

/// How a [`RamNodeCache`] stores incoming node locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Dense blocks only; reject sparse migration.
    Dense,
    /// A single sorted sparse table only.
    Sparse,
    /// Dense blocks that migrate to the sparse table below the break-even
    /// fill ratio.
    #[default]
    Hybrid,
}

/// Construction-time configuration for [`RamNodeCache`].
#[derive(Debug, Clone, Copy)]
pub struct RamCacheConfig {
    /// Approximate byte budget. Compared against `blocks_len *
    /// size_of::<Block>() + sparse_len * size_of::<(i64, Coord)>()`, an
    /// estimate rather than exact allocator accounting (`SPEC_FULL.md` §9,
    /// Open Question 3).
    pub capacity_bytes: usize,
    /// Storage layout strategy.
    pub strategy: CacheStrategy,
    /// When `true`, capacity exhaustion drops the incoming record instead
    /// of returning [`RamCacheError::Exhausted`].
    pub lossy: bool,
}

impl Default for RamCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
            strategy: CacheStrategy::default(),
            lossy: false,
        }
    }
}

/// Errors raised by [`RamNodeCache::set`].
#[derive(Debug, Error, PartialEq)]
pub enum RamCacheError {
    /// The configured byte budget is exhausted and the store is in strict
    /// (non-lossy) mode.
    #[error("node cache exhausted storing node {id}")]
    Exhausted {
        /// The id that could not be stored.
        id: i64,
    },
    /// A sparse-table insertion arrived out of ascending order and the
    /// store is in strict mode.
    #[error("node {id} arrived out of order for the sparse node cache")]
    OutOfOrder {
        /// The id that violated ordering.
        id: i64,
    },
}

#[derive(Debug, Clone)]
struct Block {
    block_id: i64,
    slots: Box<[Option<Coord<f64>>]>,
    used: usize,
}

impl Block {
    fn new(block_id: i64) -> Self {
        Self {
            block_id,
            slots: vec![None; PER_BLOCK].into_boxed_slice(),
            used: 0,
        }
    }
}

#[expect(
    clippy::integer_division,
    reason = "block/offset decomposition is exact bit arithmetic on the fixed BLOCK_SHIFT width"
)]
const fn id2block(id: i64) -> i64 {
    id >> BLOCK_SHIFT
}

#[expect(
    clippy::cast_sign_loss,
    reason = "masking by PER_BLOCK-1 always yields a non-negative result representable in usize"
)]
#[expect(
    clippy::cast_possible_wrap,
    reason = "PER_BLOCK is a small compile-time constant, far within i64 range"
)]
const fn id2offset(id: i64) -> usize {
    (id & ((PER_BLOCK as i64) - 1)) as usize
}

/// Bounded in-memory id→location cache (4.B).
///
/// Writes go to the dense representation first. A completed block below
/// the break-even fill ratio (`size_of::<Coord>() / size_of::<(i64,
/// Coord)>()`) migrates to the sparse table when storage moves on to a
/// new block, freeing the dense slot for reuse; this mirrors the
/// original's check on "the previous block" at the point a new one is
/// opened.
pub struct RamNodeCache {
    config: RamCacheConfig,
    max_blocks: usize,
    blocks: Vec<Block>,
    block_index: BTreeMap<i64, usize>,
    heap: Vec<usize>,
    current_block: Option<usize>,
    sparse: Vec<(i64, Coord<f64>)>,
    max_sparse_len: usize,
    break_even_ratio: f64,
    order_warned: Once,
}

impl RamNodeCache {
    /// Construct an empty cache under the given configuration.
    #[must_use]
    pub fn new(config: RamCacheConfig) -> Self {
        let block_bytes = PER_BLOCK * size_of::<Option<Coord<f64>>>();
        #[expect(
            clippy::integer_division,
            reason = "capacity accounting is an explicit estimate (SPEC_FULL.md §9, Open Question 3)"
        )]
        let max_blocks = if block_bytes == 0 {
            0
        } else {
            config.capacity_bytes / block_bytes
        };
        let pair_bytes = size_of::<(i64, Coord<f64>)>();
        #[expect(
            clippy::integer_division,
            reason = "capacity accounting is an explicit estimate (SPEC_FULL.md §9, Open Question 3)"
        )]
        let max_sparse_len = if pair_bytes == 0 {
            0
        } else {
            config.capacity_bytes / pair_bytes
        };
        #[expect(
            clippy::float_arithmetic,
            reason = "break-even ratio is a one-time derived constant from type sizes, not hot-path math"
        )]
        #[expect(
            clippy::cast_precision_loss,
            reason = "type sizes are small; precision loss is not observable for this ratio"
        )]
        let break_even_ratio =
            size_of::<Option<Coord<f64>>>() as f64 / (size_of::<i64>() + pair_bytes) as f64;

        Self {
            config,
            max_blocks,
            blocks: Vec::new(),
            block_index: BTreeMap::new(),
            heap: Vec::new(),
            current_block: None,
            sparse: Vec::new(),
            max_sparse_len,
            break_even_ratio,
            order_warned: Once::new(),
        }
    }

    /// Store `location` for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RamCacheError::Exhausted`] or [`RamCacheError::OutOfOrder`]
    /// in strict mode; in lossy mode the record is dropped and `Ok(())` is
    /// returned.
    pub fn set(&mut self, id: i64, location: Coord<f64>) -> Result<(), RamCacheError> {
        match self.config.strategy {
            CacheStrategy::Dense => self.set_dense(id, location),
            CacheStrategy::Sparse => self.set_sparse(id, location),
            CacheStrategy::Hybrid => self.set_dense(id, location),
        }
    }

    /// Look up a single id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Coord<f64>> {
        let block_id = id2block(id);
        if let Some(&idx) = self.block_index.get(&block_id) {
            #[expect(
                clippy::indexing_slicing,
                reason = "idx came from block_index, which only ever names live arena slots"
            )]
            let slot = self.blocks[idx].slots[id2offset(id)];
            if slot.is_some() {
                return slot;
            }
        }
        self.get_sparse(id)
    }

    /// Resolve `ids` to coordinates, preserving order and skipping ids
    /// with no stored location.
    #[must_use]
    pub fn get_list(&self, ids: &[i64]) -> Vec<Coord<f64>> {
        ids.iter().filter_map(|&id| self.get(id)).collect()
    }

    /// Remove any stored location for `id`. A no-op if `id` is not
    /// currently cached.
    pub fn delete(&mut self, id: i64) {
        let block_id = id2block(id);
        if let Some(&idx) = self.block_index.get(&block_id) {
            let offset = id2offset(id);
            #[expect(
                clippy::indexing_slicing,
                reason = "idx came from block_index, which only ever names live arena slots"
            )]
            let block = &mut self.blocks[idx];
            if let Some(slot) = block.slots.get_mut(offset) {
                if slot.take().is_some() {
                    block.used -= 1;
                }
            }
        }
        if let Ok(sparse_idx) = self
            .sparse
            .binary_search_by_key(&id, |&(sparse_id, _)| sparse_id)
        {
            self.sparse.remove(sparse_idx);
        }
    }

    fn get_sparse(&self, id: i64) -> Option<Coord<f64>> {
        self.sparse
            .binary_search_by_key(&id, |&(sparse_id, _)| sparse_id)
            .ok()
            .and_then(|idx| self.sparse.get(idx))
            .map(|&(_, loc)| loc)
    }

    fn set_sparse(&mut self, id: i64, location: Coord<f64>) -> Result<(), RamCacheError> {
        let in_order = self.sparse.last().is_none_or(|&(last_id, _)| id > last_id);
        let has_room = self.sparse.len() < self.max_sparse_len;
        if !in_order {
            return self.fail_or_drop(RamCacheError::OutOfOrder { id });
        }
        if !has_room {
            return self.fail_or_drop(RamCacheError::Exhausted { id });
        }
        self.sparse.push((id, location));
        Ok(())
    }

    fn set_dense(&mut self, id: i64, location: Coord<f64>) -> Result<(), RamCacheError> {
        if self.max_blocks == 0 {
            return self.fail_or_drop(RamCacheError::Exhausted { id });
        }
        let block_id = id2block(id);
        let offset = id2offset(id);

        let idx = match self.block_index.get(&block_id).copied() {
            Some(idx) => idx,
            None => match self.open_block(block_id)? {
                Some(idx) => idx,
                None => return Ok(()),
            },
        };

        #[expect(
            clippy::indexing_slicing,
            reason = "idx is freshly resolved from block_index/open_block and names a live arena slot"
        )]
        let block = &mut self.blocks[idx];
        if block.slots[offset].is_none() {
            block.used += 1;
        }
        block.slots[offset] = Some(location);
        self.current_block = Some(idx);
        Ok(())
    }

    /// Resolve or allocate the arena slot for `block_id`, closing out the
    /// previously open block (possibly migrating it to sparse) and
    /// evicting the least-used block if the block budget is exhausted.
    /// Returns `Ok(None)` when the write should be silently dropped
    /// (lossy mode, no capacity).
    fn open_block(&mut self, block_id: i64) -> Result<Option<usize>, RamCacheError> {
        if let Some(prev_idx) = self.current_block.take() {
            self.close_block(prev_idx);
        }

        if self.blocks.len() < self.max_blocks {
            let idx = self.blocks.len();
            self.blocks.push(Block::new(block_id));
            self.block_index.insert(block_id, idx);
            self.heap.push(idx);
            sift_up(&mut self.heap, &self.blocks, self.heap.len() - 1);
            return Ok(Some(idx));
        }

        if self.heap.is_empty() {
            return match self.fail_or_drop(RamCacheError::Exhausted { id: block_id }) {
                Ok(()) => Ok(None),
                Err(err) => Err(err),
            };
        }

        #[expect(
            clippy::indexing_slicing,
            reason = "heap is checked non-empty above"
        )]
        let evicted_idx = self.heap[0];
        #[expect(
            clippy::indexing_slicing,
            reason = "evicted_idx came from the heap, which only ever names live arena slots"
        )]
        let evicted_block_id = self.blocks[evicted_idx].block_id;
        self.block_index.remove(&evicted_block_id);
        #[expect(
            clippy::indexing_slicing,
            reason = "evicted_idx came from the heap, which only ever names live arena slots"
        )]
        {
            self.blocks[evicted_idx] = Block::new(block_id);
        }
        sift_down_from_root(&mut self.heap, &self.blocks);
        self.block_index.insert(block_id, evicted_idx);
        Ok(Some(evicted_idx))
    }

    /// Migrate `idx`'s entries to the sparse table if it closed below the
    /// break-even fill ratio and sparse migration is enabled; otherwise
    /// leave it resident.
    fn close_block(&mut self, idx: usize) {
        if self.config.strategy != CacheStrategy::Hybrid {
            return;
        }
        #[expect(
            clippy::indexing_slicing,
            reason = "idx is always a live arena slot passed in from set_dense/open_block"
        )]
        let block = &self.blocks[idx];
        #[expect(
            clippy::float_arithmetic,
            reason = "fill-ratio comparison against the precomputed break-even constant"
        )]
        #[expect(
            clippy::cast_precision_loss,
            reason = "PER_BLOCK and used counts are small relative to f64 precision"
        )]
        let fill_ratio = block.used as f64 / PER_BLOCK as f64;
        if fill_ratio >= self.break_even_ratio {
            return;
        }

        let block_id = block.block_id;
        let entries: Vec<(i64, Coord<f64>)> = block
            .slots
            .iter()
            .enumerate()
            .filter_map(|(offset, loc)| {
                let coord = (*loc)?;
                #[expect(
                    clippy::cast_possible_wrap,
                    reason = "offset is bounded by PER_BLOCK, far within i64 range"
                )]
                let offset = offset as i64;
                Some(((block_id << BLOCK_SHIFT) + offset, coord))
            })
            .collect();
        for (id, coord) in entries {
            if self.set_sparse(id, coord).is_err() {
                break;
            }
        }
    }

    fn fail_or_drop(&self, error: RamCacheError) -> Result<(), RamCacheError> {
        if self.config.lossy {
            self.order_warned.call_once(|| {
                log::warn!("node cache dropping record under lossy mode: {error}");
            });
            Ok(())
        } else {
            Err(error)
        }
    }
}

fn sift_up(heap: &mut [usize], blocks: &[Block], mut i: usize) {
    #[expect(
        clippy::integer_division,
        reason = "standard binary-heap parent-index arithmetic"
    )]
    while i > 0 {
        let parent = (i - 1) / 2;
        #[expect(
            clippy::indexing_slicing,
            reason = "heap indices are always in-bounds arena handles"
        )]
        let should_swap = blocks[heap[i]].used < blocks[heap[parent]].used;
        if should_swap {
            heap.swap(i, parent);
            i = parent;
        } else {
            break;
        }
    }
}

fn sift_down_from_root(heap: &mut [usize], blocks: &[Block]) {
    let mut i = 0;
    loop {
        let left = 2 * i + 1;
        let right = 2 * i + 2;
        let mut smallest = i;
        #[expect(
            clippy::indexing_slicing,
            reason = "bounds are checked against heap.len() before indexing"
        )]
        if left < heap.len() && blocks[heap[left]].used < blocks[heap[smallest]].used {
            smallest = left;
        }
        #[expect(
            clippy::indexing_slicing,
            reason = "bounds are checked against heap.len() before indexing"
        )]
        if right < heap.len() && blocks[heap[right]].used < blocks[heap[smallest]].used {
            smallest = right;
        }
        if smallest == i {
            break;
        }
        heap.swap(i, smallest);
        i = smallest;
    }
}
