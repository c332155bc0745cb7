//! Concrete in-process storage for the OSM middle layer: the RAM node
//! cache (4.B), the flat node file (4.C), the way/relation store (4.D),
//! and `RamMiddle`, the sole `Middle` (4.E) implementation in this
//! workspace.

#![forbid(unsafe_code)]

pub mod flat_file;
pub mod middle_ram;
pub mod ram_cache;
pub mod way_relation;

pub use flat_file::{FlatNodeStore, FlatNodeStoreError};
pub use middle_ram::{RamMiddle, RamMiddleConfig, RamMiddleError, RamMiddleReadView};
pub use ram_cache::{CacheStrategy, RamCacheConfig, RamCacheError, RamNodeCache};
pub use way_relation::{WayRelationStore, WayRelationStoreError};
