//! Geometry assembly for the OSM middle layer: turning a relation's
//! member way coordinates into validated polygons (4.F), and chunking
//! long linestrings to a maximum length (4.G).

#![forbid(unsafe_code)]

pub mod assembler;
pub mod ring;
pub mod splitter;

pub use assembler::{AssembledGeometry, AssemblerConfig, DiscardReason, assemble_multipolygon};
pub use ring::Ring;
pub use splitter::split;
