//! Streams photo-library assets created inside a date window to a host
//! application, one event at a time, ending with an end-of-stream marker.
//!
//! The photo index is injected as an [`gallery::AssetIndex`]; a SQLite
//! catalog backend ([`gallery::CatalogIndex`]) is included.

pub mod config;
pub mod error;
pub mod gallery;
pub mod state;

pub use error::{Error, Result};
