/// Gallery streaming module
///
/// This module handles:
/// - The injected asset-index capability and its catalog backend (index.rs)
/// - Bounded thumbnail rendering and persistence (thumbnail.rs)
/// - Image property extraction (metadata.rs)
/// - Per-asset resolution policies (resolve.rs)
/// - The enumerate-filter-resolve-stream pipeline (pipeline.rs)
/// - The host-facing event channel (channel.rs)

pub mod channel;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod resolve;
pub mod thumbnail;

pub use channel::{EventSink, GalleryStreamHandler, CHANNEL_NAME};
pub use index::{AssetIndex, CatalogIndex};
pub use pipeline::{AssetStreamPipeline, PendingCount, Sink};
pub use resolve::Resolver;
