/// Shared data structures for the stream pipeline
///
/// These structs represent the data model that flows between
/// the catalog layer, the pipeline and the host-facing event channel.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Flattened key-value image properties, passed through opaquely
pub type Metadata = BTreeMap<String, Value>;

/// Represents a single photo in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Unique catalog ID
    pub id: i64,
    /// Full path to the original file
    pub path: String,
    /// Filename only (e.g., "IMG_0001.JPG")
    pub filename: String,
    /// When the photo was taken
    pub created_at: DateTime<Utc>,
}

/// Inclusive creation-date range `[start, end]`.
///
/// Never validated: an inverted window simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Build a window from two epoch-millisecond values.
    ///
    /// Fractional milliseconds are truncated. Values outside chrono's
    /// representable range clamp to the minimum/maximum date.
    pub fn from_millis(start_ms: f64, end_ms: f64) -> Self {
        Self {
            start: millis_to_datetime(start_ms),
            end: millis_to_datetime(end_ms),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// True once a newest-first scan has passed the window for good
    pub fn is_before_start(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp < self.start
    }
}

fn millis_to_datetime(ms: f64) -> DateTime<Utc> {
    if ms.is_nan() {
        return DateTime::<Utc>::MIN_UTC;
    }
    Utc.timestamp_millis_opt(ms.trunc() as i64)
        .single()
        .unwrap_or(if ms < 0.0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

/// Per-asset result pushed to the host.
///
/// Serializes to a bare string for path-only items and to a
/// `{path, metadata}` object for thumbnail items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedItem {
    /// Full-resolution file path
    PathOnly(String),
    /// Persisted thumbnail path plus extracted properties (`None` when
    /// extraction failed)
    PathWithMetadata {
        path: String,
        metadata: Option<Metadata>,
    },
}

impl ResolvedItem {
    pub fn path(&self) -> &str {
        match self {
            ResolvedItem::PathOnly(path) => path,
            ResolvedItem::PathWithMetadata { path, .. } => path,
        }
    }
}

/// Everything that can travel over the event channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Item(ResolvedItem),
    /// Terminal marker: no more items will follow. Serializes to `null`.
    EndOfStream,
}

impl StreamEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::EndOfStream)
    }
}
