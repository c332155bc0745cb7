//! Domain types and the middle facade for the OSM middle layer.
//!
//! This crate holds the pieces shared between the concrete store
//! implementation (`midlayer-store`) and the geometry assembler
//! (`midlayer-geom`): the OSM primitive model (§3), the ID tracker (4.A),
//! and the `Middle` facade trait (4.E) that the output stage is restricted
//! to calling (§6, "middle consumer contract").

#![forbid(unsafe_code)]

pub mod id_tracker;
pub mod middle;
pub mod primitive;

pub use id_tracker::{IdTracker, IdTrackerError, StrictMode};
pub use middle::{Middle, MiddleRead, PendingMarker};
pub use primitive::{Location, Member, MemberType, Node, Relation, Tag, TagList, Way};
