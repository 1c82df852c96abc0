//! Shared types for the listening timeline.
//!
//! Canonical play and point models, the error taxonomy, timestamp parsing
//! and local-calendar helpers, and command-line settings.

pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{Result, TimelineError};
pub use models::{Play, Point, Projection};
