use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use parking_lot::Mutex;

use crate::models::error::RecorderError;
use crate::models::frame::Frame;
use crate::models::source::SourceId;

/// Latest-frame mailbox a backend pushes into and the compositor reads from.
///
/// Cloning shares the same mailbox. Producers never block on consumers:
/// each push simply replaces the previous frame.
#[derive(Clone)]
pub struct SourceFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    source: SourceId,
    latest: Mutex<Option<Frame>>,
    sequence: AtomicU64,
    fault: Mutex<Option<RecorderError>>,
}

impl SourceFeed {
    pub fn new(source: SourceId) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                source,
                latest: Mutex::new(None),
                sequence: AtomicU64::new(0),
                fault: Mutex::new(None),
            }),
        }
    }

    pub fn source(&self) -> SourceId {
        self.inner.source
    }

    pub fn push_frame(&self, image: RgbaImage) {
        self.push_shared(Arc::new(image));
    }

    /// Push an already shared buffer, e.g. a still re-stamped every tick.
    pub fn push_shared(&self, image: Arc<RgbaImage>) {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Frame {
            image,
            captured_at: Instant::now(),
            source: self.inner.source,
            sequence,
        };
        *self.inner.latest.lock() = Some(frame);
    }

    /// Report that the device is gone. Only the first report is kept.
    pub fn report_lost(&self, reason: impl Into<String>) {
        self.report(RecorderError::SourceUnavailable(format!(
            "{}: {}",
            self.inner.source,
            reason.into()
        )));
    }

    pub fn report(&self, error: RecorderError) {
        let mut fault = self.inner.fault.lock();
        if fault.is_none() {
            log::warn!("{} reported a fault: {}", self.inner.source, error);
            *fault = Some(error);
        }
    }

    pub fn latest(&self) -> Option<Frame> {
        self.inner.latest.lock().clone()
    }

    pub fn take_fault(&self) -> Option<RecorderError> {
        self.inner.fault.lock().take()
    }

    pub fn frames_pushed(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// Forget frames and faults from a previous run.
    pub fn clear(&self) {
        *self.inner.latest.lock() = None;
        *self.inner.fault.lock() = None;
    }
}
