use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::index::AssetIndex;
use super::{metadata, thumbnail};
use crate::config::{Config, ResolutionPolicy};
use crate::state::data::{Asset, ResolvedItem};

/// Turns one matching asset into a stream item.
///
/// Resolution is best effort. Nothing here returns an error: a failed
/// path lookup skips the asset (`None`), and a failed render, write or
/// extraction degrades the item instead.
///
/// The timeout bounds each index access and each blocking step on its
/// own. A step that runs out fails like any other, so a thumbnail item
/// whose byte fetch hangs is still emitted, without metadata.
#[derive(Debug, Clone)]
pub struct Resolver {
    policy: ResolutionPolicy,
    thumbnail_size: u32,
    jpeg_quality: u8,
    temp_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self::from_config(&Config {
            resolution_policy: policy,
            ..Config::default()
        })
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.resolution_policy,
            thumbnail_size: config.thumbnail_size,
            jpeg_quality: config.jpeg_quality,
            temp_dir: config.temp_dir(),
            timeout: config.resolve_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub async fn resolve(&self, index: Arc<dyn AssetIndex>, asset: Asset) -> Option<ResolvedItem> {
        match self.policy {
            ResolutionPolicy::PathOnly => self
                .bounded(index.full_size_path(&asset))
                .await
                .and_then(|path| path.ok())
                .map(ResolvedItem::PathOnly),
            ResolutionPolicy::ThumbnailWithMetadata => {
                Some(self.thumbnail_with_metadata(index.as_ref(), &asset).await)
            }
        }
    }

    async fn thumbnail_with_metadata(&self, index: &dyn AssetIndex, asset: &Asset) -> ResolvedItem {
        let rendered = self
            .bounded(index.render(asset, self.thumbnail_size))
            .await
            .and_then(|img| img.ok());

        let path = thumbnail::thumbnail_path(&self.temp_dir);
        let quality = self.jpeg_quality;
        let target = path.clone();
        // A failed write still hands out the path
        let _ = self
            .bounded(tokio::task::spawn_blocking(move || {
                thumbnail::persist_thumbnail(&target, rendered.as_ref(), quality)
            }))
            .await;

        let metadata = match self.bounded(index.raw_bytes(asset)).await {
            Some(Ok(bytes)) => self
                .bounded(tokio::task::spawn_blocking(move || {
                    metadata::extract_properties(&bytes)
                }))
                .await
                .and_then(|joined| joined.ok())
                .flatten(),
            _ => None,
        };

        ResolvedItem::PathWithMetadata {
            path: path.to_string_lossy().to_string(),
            metadata,
        }
    }

    /// `None` when the step outlives the timeout
    async fn bounded<F: Future>(&self, step: F) -> Option<F::Output> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, step).await.ok(),
            None => Some(step.await),
        }
    }
}
