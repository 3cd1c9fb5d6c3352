//! Configuration for the stream pipeline and the CLI host, stored as a
//! `settings.toml` file in the user's config directory.
//!
//! ```no_run
//! use gallery_stream::config::{self, ResolutionPolicy};
//!
//! let mut config = config::load().unwrap_or_default();
//! config.resolution_policy = ResolutionPolicy::ThumbnailWithMetadata;
//! config::save(&config).expect("Failed to save config");
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::gallery::thumbnail::{self, DEFAULT_JPEG_QUALITY, DEFAULT_THUMBNAIL_SIZE};
use crate::state::library::Library;

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "gallery-stream";

pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 30_000;

/// How each matching asset is turned into a stream item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Emit the full-size original's path
    #[default]
    PathOnly,
    /// Emit a persisted thumbnail path plus extracted metadata
    ThumbnailWithMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolution_policy: ResolutionPolicy,
    /// Square bound of rendered thumbnails, in pixels
    pub thumbnail_size: u32,
    /// JPEG quality of persisted thumbnails (1-100)
    pub jpeg_quality: u8,
    /// Where thumbnails are written; defaults to a scoped system temp dir
    pub temp_dir: Option<PathBuf>,
    /// Timeout for each step of a resolution; 0 disables it
    pub resolve_timeout_ms: u64,
    /// Catalog database location; defaults to the user data dir
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution_policy: ResolutionPolicy::default(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            temp_dir: None,
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(thumbnail::default_temp_dir)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(Library::default_db_path)
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        (self.resolve_timeout_ms > 0).then(|| Duration::from_millis(self.resolve_timeout_ms))
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

/// Invalid TOML falls back to defaults rather than failing startup
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            log::warn!("Ignoring invalid config at {}: {}", path.display(), e);
            Ok(Config::default())
        }
    }
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, content)?;
    Ok(())
}
