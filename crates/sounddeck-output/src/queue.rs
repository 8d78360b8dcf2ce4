//! Frame queue shared by the host and the scheduler thread.
//!
//! Entries are kept in insertion order, not sorted by due time; hosts
//! schedule in presentation order. Every mutation happens under the one
//! queue mutex, which also guards the scheduler's stop flag.

use parking_lot::{Condvar, Mutex, MutexGuard};
use sounddeck_core::{StreamTime, TimeScale, TimeValue};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::frame::FrameHandle;

/// A buffered frame together with the stream time at which it is due.
pub struct QueuedFrame {
    due: StreamTime,
    frame: FrameHandle,
}

impl QueuedFrame {
    /// Takes the queue's own reference to `frame`.
    fn acquire(frame: &FrameHandle, due: StreamTime) -> Self {
        Self {
            due,
            frame: Arc::clone(frame),
        }
    }

    pub const fn due(&self) -> StreamTime {
        self.due
    }

    /// Hands the queue's reference to the caller.
    fn into_frame(self) -> FrameHandle {
        self.frame
    }
}

/// State protected by the queue mutex.
#[derive(Default)]
pub struct QueueState {
    entries: VecDeque<QueuedFrame>,
    stop: bool,
}

impl QueueState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn stop_requested(&self) -> bool {
        self.stop
    }

    /// Pops the head frame if at least `lookahead` frames are queued and the
    /// head is due strictly before the current stream time.
    pub fn retire_due<F>(&mut self, lookahead: usize, stream_time: F) -> Option<FrameHandle>
    where
        F: Fn(TimeScale) -> Option<TimeValue>,
    {
        if self.entries.len() < lookahead.max(1) {
            return None;
        }
        let due = self.entries.front()?.due;
        let now = stream_time(due.scale)?;
        if due.value < now {
            self.entries.pop_front().map(QueuedFrame::into_frame)
        } else {
            None
        }
    }

    /// A temporary reference to the head frame.
    pub fn head(&self) -> Option<FrameHandle> {
        self.entries.front().map(|entry| Arc::clone(&entry.frame))
    }

    /// Releases every queued reference, returning how many were held.
    pub fn drain(&mut self) -> usize {
        let released = self.entries.len();
        self.entries.clear();
        released
    }
}

/// Mutex-guarded FIFO of scheduled frames plus the scheduler wake signal.
#[derive(Default)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame due at `due`, taking one reference to it.
    pub fn push_back(&self, frame: &FrameHandle, due: StreamTime) {
        let mut state = self.state.lock();
        state.entries.push_back(QueuedFrame::acquire(frame, due));
        trace!("Queued frame due at {}/{}", due.value, due.scale);
    }

    /// Replaces the head entry with `frame`. The new head inherits the old
    /// head's due time, or zero when the queue was empty.
    pub fn replace_head(&self, frame: &FrameHandle) {
        let mut state = self.state.lock();
        let due = state
            .entries
            .pop_front()
            .map_or(StreamTime::new(0, 1), |old| old.due);
        state.entries.push_front(QueuedFrame::acquire(frame, due));
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Due time of the head frame.
    pub fn head_due(&self) -> Option<StreamTime> {
        self.state.lock().entries.front().map(QueuedFrame::due)
    }

    /// Releases all queued frames without involving the scheduler.
    pub fn clear(&self) -> usize {
        self.state.lock().drain()
    }

    /// Sets the stop flag and wakes the scheduler.
    pub fn request_stop(&self) {
        self.state.lock().stop = true;
        self.wake.notify_all();
    }

    /// Clears the stop flag ahead of spawning a new scheduler.
    pub fn reset_stop(&self) {
        self.state.lock().stop = false;
    }

    pub fn stop_requested(&self) -> bool {
        self.state.lock().stop
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    /// Releases the lock until `deadline` or a wake-up, then reacquires it.
    pub(crate) fn wait_until(&self, state: &mut MutexGuard<'_, QueueState>, deadline: Instant) {
        let _ = self.wake.wait_until(state, deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_frame;
    use proptest::prelude::*;

    #[test]
    fn test_push_takes_one_reference() {
        let queue = FrameQueue::new();
        let frame = test_frame(1);
        queue.push_back(&frame, StreamTime::new(1000, 25_000));
        assert_eq!(Arc::strong_count(&frame), 2);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.clear(), 1);
        assert_eq!(Arc::strong_count(&frame), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retire_requires_lookahead() {
        let queue = FrameQueue::new();
        let first = test_frame(1);
        queue.push_back(&first, StreamTime::new(10, 1000));

        let mut state = queue.lock();
        assert!(state.retire_due(2, |_| Some(1_000_000)).is_none());
        drop(state);

        let second = test_frame(2);
        queue.push_back(&second, StreamTime::new(20, 1000));
        let mut state = queue.lock();
        let retired = state.retire_due(2, |_| Some(1_000_000));
        assert!(retired.is_some_and(|f| Arc::ptr_eq(&f, &first)));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_retire_only_strictly_past_due() {
        let queue = FrameQueue::new();
        let a = test_frame(1);
        let b = test_frame(2);
        queue.push_back(&a, StreamTime::new(2000, 25_000));
        queue.push_back(&b, StreamTime::new(3000, 25_000));

        let mut state = queue.lock();
        assert!(state.retire_due(2, |_| Some(2000)).is_none());
        assert!(state.retire_due(2, |_| None).is_none());
        assert!(state.retire_due(2, |_| Some(2001)).is_some());
    }

    #[test]
    fn test_due_time_compared_in_its_own_scale() {
        let queue = FrameQueue::new();
        queue.push_back(&test_frame(1), StreamTime::new(40, 1000));
        queue.push_back(&test_frame(2), StreamTime::new(80, 1000));

        let mut state = queue.lock();
        let retired = state.retire_due(2, |scale| {
            assert_eq!(scale, 1000);
            Some(41)
        });
        assert!(retired.is_some());
    }

    #[test]
    fn test_replace_head_keeps_due_time() {
        let queue = FrameQueue::new();
        let old = test_frame(1);
        let tail = test_frame(2);
        let new = test_frame(3);
        queue.push_back(&old, StreamTime::new(500, 1000));
        queue.push_back(&tail, StreamTime::new(600, 1000));

        queue.replace_head(&new);
        assert_eq!(queue.len(), 2);
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(Arc::strong_count(&new), 2);
        assert_eq!(queue.head_due(), Some(StreamTime::new(500, 1000)));
        assert!(queue.lock().head().is_some_and(|f| Arc::ptr_eq(&f, &new)));
    }

    #[test]
    fn test_replace_head_on_empty_queue() {
        let queue = FrameQueue::new();
        queue.replace_head(&test_frame(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head_due(), Some(StreamTime::new(0, 1)));
    }

    #[test]
    fn test_stop_flag() {
        let queue = FrameQueue::new();
        assert!(!queue.stop_requested());
        queue.request_stop();
        assert!(queue.stop_requested());
        queue.reset_stop();
        assert!(!queue.stop_requested());
    }

    proptest! {
        #[test]
        fn prop_buffered_count_is_scheduled_minus_retired(
            scheduled in 0usize..40,
            attempts in 0usize..60,
        ) {
            let queue = FrameQueue::new();
            let frames: Vec<FrameHandle> = (0..scheduled).map(test_frame).collect();
            for (i, frame) in frames.iter().enumerate() {
                let due = i64::try_from(i).unwrap_or(i64::MAX);
                queue.push_back(frame, StreamTime::new(due, 1000));
            }

            let mut retired = Vec::new();
            {
                let mut state = queue.lock();
                for _ in 0..attempts {
                    if let Some(frame) = state.retire_due(2, |_| Some(i64::MAX)) {
                        retired.push(frame);
                    }
                }
            }

            prop_assert_eq!(queue.len(), scheduled - retired.len());
            for (frame, expected) in retired.iter().zip(&frames) {
                prop_assert!(Arc::ptr_eq(frame, expected));
            }
        }
    }
}
