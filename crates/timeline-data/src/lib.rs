//! Ingestion and projection for the listening timeline.
//!
//! Reads listening-history export files of either schema generation,
//! normalises them into a sorted play sequence and projects that sequence
//! onto day/hour coordinates.

pub mod projector;
pub mod reader;
pub mod schema;

pub use timeline_core as core;
