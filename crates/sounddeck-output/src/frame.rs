//! Video frames and the host sinks that consume them.

use parking_lot::RwLock;
use std::sync::Arc;

/// A host-owned video frame. The core never reads or writes pixel data; it
/// only holds frames until their presentation time has passed.
pub trait VideoFrame: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn row_bytes(&self) -> usize;
    fn bytes(&self) -> &[u8];
}

/// Shared ownership of a frame. The queue holds its own clone for as long as
/// the frame is buffered.
pub type FrameHandle = Arc<dyn VideoFrame>;

/// Notified when a scheduled frame's presentation time has passed.
pub trait FrameCompletionSink: Send + Sync {
    /// Receives the queue's reference to the retired frame; dropping it
    /// releases that reference.
    fn frame_completed(&self, frame: FrameHandle);
}

impl<F> FrameCompletionSink for F
where
    F: Fn(FrameHandle) + Send + Sync,
{
    fn frame_completed(&self, frame: FrameHandle) {
        self(frame);
    }
}

/// Given the current head frame for incidental display.
pub trait PreviewSink: Send + Sync {
    fn draw_frame(&self, frame: &dyn VideoFrame);
}

impl<F> PreviewSink for F
where
    F: Fn(&dyn VideoFrame) + Send + Sync,
{
    fn draw_frame(&self, frame: &dyn VideoFrame) {
        self(frame);
    }
}

/// The host's registered sinks. At most one of each; the last one set wins.
#[derive(Default)]
pub struct SinkRegistry {
    completion: RwLock<Option<Arc<dyn FrameCompletionSink>>>,
    preview: RwLock<Option<Arc<dyn PreviewSink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_completion(&self, sink: Option<Arc<dyn FrameCompletionSink>>) {
        *self.completion.write() = sink;
    }

    pub fn set_preview(&self, sink: Option<Arc<dyn PreviewSink>>) {
        *self.preview.write() = sink;
    }

    pub fn completion(&self) -> Option<Arc<dyn FrameCompletionSink>> {
        self.completion.read().clone()
    }

    pub fn preview(&self) -> Option<Arc<dyn PreviewSink>> {
        self.preview.read().clone()
    }

    /// True if anyone would ever observe a scheduled frame.
    pub fn any(&self) -> bool {
        self.completion.read().is_some() || self.preview.read().is_some()
    }
}
