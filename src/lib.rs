//! Facade crate for the OSM middle layer and multipolygon assembler.
//!
//! Re-exports the domain model and `Middle` facade trait (`midlayer-core`),
//! the in-process store implementations (`midlayer-store`), and the
//! multipolygon assembler and line splitter (`midlayer-geom`) under a
//! single crate.

#![forbid(unsafe_code)]

pub use midlayer_core::{
    IdTracker, IdTrackerError, Location, Member, MemberType, Middle, MiddleRead, Node,
    PendingMarker, Relation, StrictMode, Tag, TagList, Way,
};

pub use midlayer_store::{
    CacheStrategy, FlatNodeStore, FlatNodeStoreError, RamCacheConfig, RamCacheError, RamMiddle,
    RamMiddleConfig, RamMiddleError, RamMiddleReadView, RamNodeCache, WayRelationStore,
    WayRelationStoreError,
};

pub use midlayer_geom::{
    AssembledGeometry, AssemblerConfig, DiscardReason, Ring, assemble_multipolygon, split,
};
