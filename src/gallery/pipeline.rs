/// Asset stream pipeline
///
/// fetch → date-filter → per-asset resolve → emit → close
///
/// Resolutions run concurrently as tokio tasks. Their completions are
/// drained by the task calling `run`, so every `emit`, `close` and
/// pending-count transition happens on that one task, in completion
/// order. `PendingCount` is therefore a plain counter.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::index::AssetIndex;
use super::resolve::Resolver;
use crate::config::Config;
use crate::state::data::{DateWindow, ResolvedItem};

/// Caller-side receiver of streamed items
pub trait Sink: Send + Sync {
    fn emit(&self, item: ResolvedItem);

    /// Called exactly once, after the last `emit`
    fn close(&self);
}

/// In-flight resolutions plus one unit for the scan itself.
///
/// Reaches zero exactly once: when the scan is over and every dispatched
/// resolution has completed.
#[derive(Debug)]
pub struct PendingCount {
    count: usize,
}

impl PendingCount {
    pub fn new() -> Self {
        Self { count: 1 }
    }

    pub fn enter(&mut self) {
        debug_assert!(self.count > 0, "enter after completion");
        self.count += 1;
    }

    /// Decrement and report whether this call brought the count to zero
    #[must_use]
    pub fn leave(&mut self) -> bool {
        match self.count {
            0 => false,
            n => {
                self.count = n - 1;
                self.count == 0
            }
        }
    }

    pub fn get(&self) -> usize {
        self.count
    }
}

impl Default for PendingCount {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AssetStreamPipeline {
    index: Arc<dyn AssetIndex>,
    resolver: Arc<Resolver>,
}

impl AssetStreamPipeline {
    pub fn new(index: Arc<dyn AssetIndex>, resolver: Resolver) -> Self {
        Self {
            index,
            resolver: Arc::new(resolver),
        }
    }

    pub fn from_config(index: Arc<dyn AssetIndex>, config: &Config) -> Self {
        Self::new(index, Resolver::from_config(config))
    }

    /// Bound every step of a resolution; a step that runs out counts as
    /// failed and degrades or skips its asset the same way
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolver = Arc::new(Resolver::clone(&self.resolver).with_timeout(timeout));
        self
    }

    /// Stream every asset created inside `window` into `sink`, then close it.
    ///
    /// Never fails: an unreadable index behaves like an empty one and a
    /// failed resolution only affects its own asset.
    pub async fn run<S: Sink + ?Sized>(&self, window: DateWindow, sink: &S) {
        let mut pending = PendingCount::new();
        let mut in_flight = JoinSet::new();

        // Assets newer than the window are left out at the source when the
        // index can; the checks below still hold for every index
        let assets = match self.index.fetch_newest_first(window.end).await {
            Ok(assets) => assets,
            Err(e) => {
                log::warn!("Asset index unavailable, streaming nothing: {}", e);
                Vec::new()
            }
        };

        for asset in assets {
            // Newest-first: everything after this is older still
            if window.is_before_start(asset.created_at) {
                break;
            }
            // Newer than the window; older assets may still match
            if !window.contains(asset.created_at) {
                continue;
            }

            pending.enter();
            let index = Arc::clone(&self.index);
            let resolver = Arc::clone(&self.resolver);
            in_flight.spawn(async move { resolver.resolve(index, asset).await });
        }

        log::debug!("Scan finished, {} resolutions in flight", in_flight.len());

        if pending.leave() {
            sink.close();
            return;
        }

        while let Some(joined) = in_flight.join_next().await {
            // A panicked resolution is a failed one
            if let Ok(Some(item)) = joined {
                sink.emit(item);
            }
            if pending.leave() {
                sink.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionPolicy;
    use crate::error::{Error, Result};
    use crate::state::data::Asset;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use image::DynamicImage;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Emit(String),
        Close,
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
        items: Mutex<Vec<ResolvedItem>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn emitted(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Emit(path) => Some(path),
                    Event::Close => None,
                })
                .collect()
        }
    }

    impl Sink for RecordingSink {
        fn emit(&self, item: ResolvedItem) {
            self.events.lock().unwrap().push(Event::Emit(item.path().to_string()));
            self.items.lock().unwrap().push(item);
        }

        fn close(&self) {
            self.events.lock().unwrap().push(Event::Close);
        }
    }

    enum Behaviour {
        After(Duration),
        Fail,
        Hang,
        Panic,
    }

    /// Newest-first fixture index; path lookups follow per-asset behaviour
    #[derive(Default)]
    struct FakeIndex {
        assets: Vec<Asset>,
        behaviour: HashMap<i64, Behaviour>,
        unavailable: bool,
        bytes_hang: bool,
    }

    impl FakeIndex {
        /// `(id, created_at_ms)` pairs, given newest first
        fn with_assets(stamps: &[(i64, i64)]) -> Self {
            Self {
                assets: stamps
                    .iter()
                    .map(|&(id, ms)| Asset {
                        id,
                        path: format!("/photos/{id}.jpg"),
                        filename: format!("{id}.jpg"),
                        created_at: Utc.timestamp_millis_opt(ms).unwrap(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn behave(mut self, id: i64, behaviour: Behaviour) -> Self {
            self.behaviour.insert(id, behaviour);
            self
        }
    }

    #[async_trait]
    impl AssetIndex for FakeIndex {
        async fn fetch_newest_first(&self, _until: DateTime<Utc>) -> Result<Vec<Asset>> {
            if self.unavailable {
                return Err(Error::Io(std::io::Error::other("index offline")));
            }
            // Unfiltered on purpose, so the scan's own window checks are exercised
            Ok(self.assets.clone())
        }

        async fn full_size_path(&self, asset: &Asset) -> Result<String> {
            match self.behaviour.get(&asset.id) {
                Some(Behaviour::After(delay)) => tokio::time::sleep(*delay).await,
                Some(Behaviour::Fail) => {
                    return Err(Error::AssetUnavailable {
                        id: asset.id,
                        reason: "gone".into(),
                    })
                }
                Some(Behaviour::Hang) => std::future::pending::<()>().await,
                Some(Behaviour::Panic) => panic!("native crash"),
                None => {}
            }
            Ok(asset.path.clone())
        }

        async fn render(&self, asset: &Asset, _bound: u32) -> Result<DynamicImage> {
            Err(Error::AssetUnavailable {
                id: asset.id,
                reason: "not rendered in pipeline tests".into(),
            })
        }

        async fn raw_bytes(&self, asset: &Asset) -> Result<Vec<u8>> {
            if self.bytes_hang {
                std::future::pending::<()>().await;
            }
            Err(Error::AssetUnavailable {
                id: asset.id,
                reason: "no bytes in pipeline tests".into(),
            })
        }
    }

    fn pipeline(index: FakeIndex) -> AssetStreamPipeline {
        AssetStreamPipeline::new(Arc::new(index), Resolver::new(ResolutionPolicy::PathOnly))
    }

    fn window(start: i64, end: i64) -> DateWindow {
        DateWindow::from_millis(start as f64, end as f64)
    }

    #[test]
    fn pending_count_reaches_zero_once() {
        let mut pending = PendingCount::new();
        pending.enter();
        pending.enter();
        assert!(!pending.leave());
        assert!(!pending.leave());
        assert!(pending.leave());
        assert!(!pending.leave());
        assert_eq!(pending.get(), 0);
    }

    #[tokio::test]
    async fn empty_collection_closes_without_emitting() {
        let sink = RecordingSink::default();
        pipeline(FakeIndex::default()).run(window(0, 1_000), &sink).await;
        assert_eq!(sink.events(), vec![Event::Close]);
    }

    #[tokio::test]
    async fn unreadable_index_behaves_like_empty_one() {
        let index = FakeIndex {
            unavailable: true,
            ..FakeIndex::default()
        };
        let sink = RecordingSink::default();
        pipeline(index).run(window(0, 1_000), &sink).await;
        assert_eq!(sink.events(), vec![Event::Close]);
    }

    #[tokio::test]
    async fn newer_assets_are_skipped_and_older_one_halts_the_scan() {
        let t0 = 1_000_000;
        // The last asset is in-window but sits behind the halt point
        let index = FakeIndex::with_assets(&[
            (1, t0 + 2_000),
            (2, t0 + 500),
            (3, t0 - 100),
            (4, t0 + 700),
        ]);
        let sink = RecordingSink::default();

        pipeline(index).run(window(t0, t0 + 1_000), &sink).await;

        assert_eq!(
            sink.events(),
            vec![Event::Emit("/photos/2.jpg".into()), Event::Close]
        );
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let index = FakeIndex::with_assets(&[
            (1, 2_001),
            (2, 2_000),
            (3, 1_500),
            (4, 1_000),
            (5, 999),
        ]);
        let sink = RecordingSink::default();

        pipeline(index).run(window(1_000, 2_000), &sink).await;

        let mut emitted = sink.emitted();
        emitted.sort();
        assert_eq!(emitted, vec!["/photos/2.jpg", "/photos/3.jpg", "/photos/4.jpg"]);
        assert_eq!(sink.events().last(), Some(&Event::Close));
    }

    #[tokio::test]
    async fn inverted_window_yields_nothing() {
        let index = FakeIndex::with_assets(&[(1, 3_000), (2, 2_000), (3, 1_000)]);
        let sink = RecordingSink::default();

        pipeline(index).run(window(2_500, 1_500), &sink).await;

        assert_eq!(sink.events(), vec![Event::Close]);
    }

    #[tokio::test]
    async fn exhausting_the_collection_still_closes() {
        // Nothing is older than the window start, so no halt ever fires
        let index = FakeIndex::with_assets(&[(1, 5_000), (2, 4_000), (3, 3_000)]);
        let sink = RecordingSink::default();

        pipeline(index).run(window(0, 10_000), &sink).await;

        let events = sink.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&Event::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn emission_follows_completion_order_not_scan_order() {
        let index = FakeIndex::with_assets(&[(1, 3_000), (2, 2_000), (3, 1_000)])
            .behave(1, Behaviour::After(Duration::from_millis(300)))
            .behave(2, Behaviour::After(Duration::from_millis(100)))
            .behave(3, Behaviour::After(Duration::from_millis(200)));
        let sink = RecordingSink::default();

        pipeline(index).run(window(0, 10_000), &sink).await;

        assert_eq!(
            sink.events(),
            vec![
                Event::Emit("/photos/2.jpg".into()),
                Event::Emit("/photos/3.jpg".into()),
                Event::Emit("/photos/1.jpg".into()),
                Event::Close,
            ]
        );
    }

    #[tokio::test]
    async fn failed_and_panicked_resolutions_are_isolated() {
        let index = FakeIndex::with_assets(&[(1, 4_000), (2, 3_000), (3, 2_000), (4, 1_000)])
            .behave(2, Behaviour::Fail)
            .behave(3, Behaviour::Panic);
        let sink = RecordingSink::default();

        pipeline(index).run(window(0, 10_000), &sink).await;

        let mut emitted = sink.emitted();
        emitted.sort();
        assert_eq!(emitted, vec!["/photos/1.jpg", "/photos/4.jpg"]);
        assert_eq!(sink.events().last(), Some(&Event::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_a_hung_resolution_from_blocking_close() {
        let index = FakeIndex::with_assets(&[(1, 2_000), (2, 1_000)]).behave(1, Behaviour::Hang);
        let sink = RecordingSink::default();

        pipeline(index)
            .with_timeout(Some(Duration::from_secs(5)))
            .run(window(0, 10_000), &sink)
            .await;

        assert_eq!(
            sink.events(),
            vec![Event::Emit("/photos/2.jpg".into()), Event::Close]
        );
    }

    #[tokio::test]
    async fn hung_byte_fetch_still_emits_the_thumbnail_item() {
        let thumbs = tempfile::tempdir().unwrap();
        let index = FakeIndex {
            bytes_hang: true,
            ..FakeIndex::with_assets(&[(1, 2_000), (2, 1_000)])
        };
        let resolver = Resolver::new(ResolutionPolicy::ThumbnailWithMetadata)
            .with_temp_dir(thumbs.path());
        let sink = RecordingSink::default();

        AssetStreamPipeline::new(Arc::new(index), resolver)
            .with_timeout(Some(Duration::from_millis(200)))
            .run(window(0, 10_000), &sink)
            .await;

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events().last(), Some(&Event::Close));
        for item in sink.items.lock().unwrap().iter() {
            let ResolvedItem::PathWithMetadata { path, metadata } = item else {
                panic!("expected a thumbnail item, got {item:?}");
            };
            assert!(std::path::Path::new(path).starts_with(thumbs.path()));
            assert_eq!(*metadata, None);
        }
    }
}
