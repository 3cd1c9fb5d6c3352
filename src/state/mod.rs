/// Catalog state module
///
/// This module handles the photo catalog behind the stream pipeline:
/// - Shared data structures (data.rs)
/// - SQLite catalog connections and queries (library.rs)
/// - Folder import with creation-date detection (import.rs)

pub mod data;
pub mod import;
pub mod library;
