/// Crate-wide error type
///
/// Catalog, import, configuration and invocation failures surface through
/// this enum. Per-asset resolution failures never do: the pipeline swallows
/// them and degrades the emitted item instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `on_listen` was called without usable `startPeriod`/`endPeriod` values
    #[error("invalid stream arguments: {0}")]
    InvalidArguments(String),

    /// A lazy asset accessor could not produce content
    #[error("asset {id} unavailable: {reason}")]
    AssetUnavailable { id: i64, reason: String },

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
