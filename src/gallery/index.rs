use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::path::PathBuf;

use super::thumbnail;
use crate::error::{Error, Result};
use crate::state::data::Asset;
use crate::state::library::Library;

/// Access to a photo-library index.
///
/// The pipeline receives this as an injected handle instead of reaching
/// for a global. Every accessor is lazy and may fail independently.
#[async_trait]
pub trait AssetIndex: Send + Sync {
    /// Assets created at or before `until`, ordered by creation timestamp,
    /// newest first
    async fn fetch_newest_first(&self, until: DateTime<Utc>) -> Result<Vec<Asset>>;

    /// Locator of the full-size original
    async fn full_size_path(&self, asset: &Asset) -> Result<String>;

    /// Original version rendered to fit within `bound`×`bound`
    async fn render(&self, asset: &Asset, bound: u32) -> Result<DynamicImage>;

    /// Raw encoded bytes of the original
    async fn raw_bytes(&self, asset: &Asset) -> Result<Vec<u8>>;
}

/// Asset index backed by the SQLite catalog and the files it points at
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    db_path: PathBuf,
}

impl CatalogIndex {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[async_trait]
impl AssetIndex for CatalogIndex {
    async fn fetch_newest_first(&self, until: DateTime<Utc>) -> Result<Vec<Asset>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            // Connection is not Sync; each query gets its own
            Library::open(&db_path)?.get_assets_newest_first(until)
        })
        .await?
    }

    async fn full_size_path(&self, asset: &Asset) -> Result<String> {
        let canonical = tokio::fs::canonicalize(&asset.path)
            .await
            .map_err(|e| unavailable(asset, e))?;
        Ok(canonical.to_string_lossy().to_string())
    }

    async fn render(&self, asset: &Asset, bound: u32) -> Result<DynamicImage> {
        let bytes = self.raw_bytes(asset).await?;
        tokio::task::spawn_blocking(move || thumbnail::render_bounded(&bytes, bound)).await?
    }

    async fn raw_bytes(&self, asset: &Asset) -> Result<Vec<u8>> {
        tokio::fs::read(&asset.path)
            .await
            .map_err(|e| unavailable(asset, e))
    }
}

fn unavailable(asset: &Asset, err: std::io::Error) -> Error {
    Error::AssetUnavailable {
        id: asset.id,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use image::GenericImageView;
    use std::path::Path;
    use tempfile::tempdir;

    #[tokio::test]
    async fn catalog_index_serves_catalogued_files() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("wide.png");
        image::RgbImage::new(1000, 500).save(&photo).unwrap();

        let db_path = dir.path().join("catalog.db");
        let library = Library::open(&db_path).unwrap();
        library
            .import_asset(
                &photo.to_string_lossy(),
                "wide.png",
                Utc.timestamp_millis_opt(10).unwrap(),
            )
            .unwrap();

        let index = CatalogIndex::new(&db_path);
        let assets = index.fetch_newest_first(Utc::now()).await.unwrap();
        assert_eq!(assets.len(), 1);

        let path = index.full_size_path(&assets[0]).await.unwrap();
        assert!(Path::new(&path).is_absolute());
        assert!(path.ends_with("wide.png"));

        let rendered = index.render(&assets[0], 512).await.unwrap();
        assert_eq!(rendered.dimensions(), (512, 256));

        let bytes = index.raw_bytes(&assets[0]).await.unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn catalog_fetch_leaves_out_assets_newer_than_until() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");
        let library = Library::open(&db_path).unwrap();
        for (name, ms) in [("old.jpg", 100), ("edge.jpg", 200), ("new.jpg", 300)] {
            let created_at = Utc.timestamp_millis_opt(ms).unwrap();
            library
                .import_asset(&format!("/photos/{name}"), name, created_at)
                .unwrap();
        }

        let index = CatalogIndex::new(&db_path);
        let assets = index
            .fetch_newest_first(Utc.timestamp_millis_opt(200).unwrap())
            .await
            .unwrap();

        let names: Vec<&str> = assets.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["edge.jpg", "old.jpg"]);
    }

    #[tokio::test]
    async fn missing_original_is_reported_as_unavailable() {
        let index = CatalogIndex::new("/unused.db");
        let asset = Asset {
            id: 7,
            path: "/no/such/file.jpg".into(),
            filename: "file.jpg".into(),
            created_at: Utc.timestamp_millis_opt(0).unwrap(),
        };

        let err = index.raw_bytes(&asset).await.unwrap_err();
        assert!(matches!(err, Error::AssetUnavailable { id: 7, .. }));
        assert!(index.full_size_path(&asset).await.is_err());
    }
}
