use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::pipeline::{AssetStreamPipeline, Sink};
use crate::error::{Error, Result};
use crate::state::data::{DateWindow, ResolvedItem, StreamEvent};

/// Name the host registers the event channel under
pub const CHANNEL_NAME: &str = "gallery_stream/paths";

/// One-way, backpressure-free push channel towards the host.
///
/// Clones share one attachment: once any clone is detached, every
/// further push is silently dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Arc<Mutex<Option<UnboundedSender<StreamEvent>>>>,
}

impl EventSink {
    pub fn new(sender: UnboundedSender<StreamEvent>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// A fresh sink plus the host-side receiving end
    pub fn channel() -> (Self, UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn detach(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_attached(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn push(&self, event: StreamEvent) {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = sender.as_ref() {
            // Receiver gone: the host stopped listening without cancelling
            if tx.send(event).is_err() {
                *sender = None;
            }
        }
    }
}

impl Sink for EventSink {
    fn emit(&self, item: ResolvedItem) {
        self.push(StreamEvent::Item(item));
    }

    fn close(&self) {
        self.push(StreamEvent::EndOfStream);
    }
}

/// Bridges host stream callbacks to the pipeline
pub struct GalleryStreamHandler {
    pipeline: Arc<AssetStreamPipeline>,
    current: Mutex<Option<EventSink>>,
}

impl GalleryStreamHandler {
    pub fn new(pipeline: AssetStreamPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            current: Mutex::new(None),
        }
    }

    /// Start streaming for `{"startPeriod": ms, "endPeriod": ms}`.
    ///
    /// Bad arguments fail here, before any work starts. Must be called from
    /// within a tokio runtime; the returned handle finishes after `close`.
    pub fn on_listen(&self, arguments: &Value, sink: EventSink) -> Result<JoinHandle<()>> {
        let window = parse_arguments(arguments)?;

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sink.clone());
        if let Some(previous) = previous {
            previous.detach();
        }

        log::debug!(
            "Streaming assets created between {} and {}",
            window.start,
            window.end
        );

        let pipeline = Arc::clone(&self.pipeline);
        Ok(tokio::spawn(async move {
            pipeline.run(window, &sink).await;
        }))
    }

    /// Detach the current sink. In-flight work keeps running; its
    /// emits and close just go nowhere.
    pub fn on_cancel(&self) {
        if let Some(sink) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sink.detach();
        }
    }
}

/// Read the date window out of the listen arguments
pub fn parse_arguments(arguments: &Value) -> Result<DateWindow> {
    let period = |key: &str| {
        arguments.get(key).and_then(Value::as_f64).ok_or_else(|| {
            Error::InvalidArguments(format!("`{key}` must be a number of epoch milliseconds"))
        })
    };

    Ok(DateWindow::from_millis(period("startPeriod")?, period("endPeriod")?))
}
