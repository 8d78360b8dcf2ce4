//! Scheduler thread.
//!
//! One background thread per output object wakes about once per frame
//! interval, retires the head frame once its due time has passed, feeds the
//! preview sink, and sleeps on the queue's condition variable. Sinks run
//! with the queue mutex released, so they may call back into the output.

use parking_lot::MutexGuard;
use sounddeck_core::{Error, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::clock::PlaybackClock;
use crate::frame::SinkRegistry;
use crate::queue::FrameQueue;

/// Wait used while no frame rate is anchored.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(40);

/// Everything the scheduler thread shares with the output object.
#[derive(Clone)]
pub struct SchedulerContext {
    pub queue: Arc<FrameQueue>,
    pub sinks: Arc<SinkRegistry>,
    pub clock: Arc<PlaybackClock>,
    /// Frames required in the queue before the head may be retired.
    pub lookahead: usize,
}

/// Handle to a running scheduler thread.
pub struct Scheduler {
    queue: Arc<FrameQueue>,
    handle: Option<JoinHandle<usize>>,
}

impl Scheduler {
    /// Spawns the scheduler thread with a cleared stop flag.
    pub fn spawn(context: SchedulerContext) -> Result<Self> {
        let queue = Arc::clone(&context.queue);
        queue.reset_stop();

        let handle = std::thread::Builder::new()
            .name("sounddeck-scheduler".to_string())
            .spawn(move || run(&context))
            .map_err(|e| Error::Internal(format!("Failed to spawn scheduler thread: {e}")))?;

        info!("Scheduler thread started");
        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    /// True once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signals the thread to stop and waits for it, returning how many
    /// queued frames it released on the way out.
    ///
    /// Called from a sink on the scheduler thread itself, this only signals.
    /// The loop drains the queue once the sink returns, and the count is 0.
    pub fn shutdown(mut self) -> Result<usize> {
        self.queue.request_stop();
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };
        if handle.thread().id() == std::thread::current().id() {
            debug!("Scheduler shut down from its own thread, not joining");
            return Ok(0);
        }
        handle
            .join()
            .map_err(|_| Error::Internal("Scheduler thread panicked".to_string()))
    }
}

fn run(context: &SchedulerContext) -> usize {
    let mut state = context.queue.lock();

    loop {
        if state.stop_requested() {
            let released = state.drain();
            drop(state);
            info!("Scheduler thread stopped, released {released} queued frames");
            return released;
        }

        let completion = context.sinks.completion();
        let preview = context.sinks.preview();

        let retired = completion.as_ref().and_then(|_| {
            state.retire_due(context.lookahead, |scale| context.clock.stream_time(scale))
        });
        let head = preview.as_ref().and_then(|_| state.head());

        if retired.is_some() || head.is_some() {
            MutexGuard::unlocked(&mut state, || {
                if let (Some(sink), Some(frame)) = (&completion, retired) {
                    trace!("Frame completed");
                    sink.frame_completed(frame);
                }
                if let (Some(sink), Some(frame)) = (&preview, head) {
                    sink.draw_frame(frame.as_ref());
                }
            });
            if state.stop_requested() {
                continue;
            }
        }

        let interval = match context.clock.frame_interval() {
            Some(interval) if !interval.is_zero() => interval,
            Some(_) => {
                error!("Degenerate frame rate, falling back to idle polling");
                IDLE_POLL_INTERVAL
            }
            None => IDLE_POLL_INTERVAL,
        };
        context.queue.wait_until(&mut state, Instant::now() + interval);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Dropped without an explicit shutdown: still let the thread drain.
        if !self.is_finished() {
            debug!("Scheduler dropped while running, signalling stop");
            self.queue.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameHandle, VideoFrame};
    use crate::testing::test_frame;
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;
    use sounddeck_core::{FrameRate, StreamTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAL: FrameRate = FrameRate::new(1000, 25_000);

    fn context() -> SchedulerContext {
        let clock = Arc::new(PlaybackClock::new());
        clock.start(PAL);
        SchedulerContext {
            queue: Arc::new(FrameQueue::new()),
            sinks: Arc::new(SinkRegistry::new()),
            clock,
            lookahead: 2,
        }
    }

    #[test]
    fn test_frames_retire_in_fifo_order_handing_over_queue_reference() {
        let ctx = context();
        let queue = Arc::clone(&ctx.queue);
        let (tx, rx) = unbounded::<(FrameHandle, usize, usize)>();
        ctx.sinks.set_completion(Some(Arc::new(move |frame: FrameHandle| {
            // The queue no longer holds the frame. Its reference moved into
            // this call, so the count is the host clone plus this one.
            let count = Arc::strong_count(&frame);
            let _ = tx.send((frame, count, queue.len()));
        })));

        let frames: Vec<FrameHandle> = (0..5).map(test_frame).collect();
        for (i, frame) in (1i64..).zip(&frames) {
            ctx.queue.push_back(frame, StreamTime::new(i * 1000, 25_000));
        }

        let scheduler = Scheduler::spawn(ctx.clone()).unwrap();
        for (retired, expected) in (1..).zip(frames.iter().take(4)) {
            let (frame, count, queued) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(Arc::ptr_eq(&frame, expected));
            assert_eq!(count, 2);
            assert_eq!(queued, frames.len() - retired);
        }

        // The last frame never retires without a successor queued behind it.
        std::thread::sleep(Duration::from_millis(120));
        assert!(rx.try_recv().is_err());
        assert_eq!(ctx.queue.len(), 1);
        for frame in frames.iter().take(4) {
            assert_eq!(Arc::strong_count(frame), 1);
        }

        assert_eq!(scheduler.shutdown().unwrap(), 1);
        assert_eq!(Arc::strong_count(&frames[4]), 1);
    }

    #[test]
    fn test_frames_not_due_stay_queued() {
        let ctx = context();
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        ctx.sinks.set_completion(Some(Arc::new(move |_frame: FrameHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        // Due an hour from now.
        ctx.queue.push_back(&test_frame(1), StreamTime::new(3600, 1));
        ctx.queue.push_back(&test_frame(2), StreamTime::new(3601, 1));

        let scheduler = Scheduler::spawn(ctx.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.shutdown().unwrap(), 2);
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_preview_sees_head_without_removing_it() {
        let ctx = context();
        let (tx, rx) = unbounded::<u32>();
        ctx.sinks.set_preview(Some(Arc::new(move |frame: &dyn VideoFrame| {
            let _ = tx.send(frame.width());
        })));

        ctx.queue.push_back(&test_frame(7), StreamTime::new(0, 25_000));
        let scheduler = Scheduler::spawn(ctx.clone()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        assert_eq!(ctx.queue.len(), 1);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn test_sink_may_reenter_queue() {
        let ctx = context();
        let queue = Arc::clone(&ctx.queue);
        let (tx, rx) = unbounded::<usize>();
        ctx.sinks.set_completion(Some(Arc::new(move |_frame: FrameHandle| {
            // Re-entrant call from inside the notification.
            let _ = tx.send(queue.len());
        })));

        ctx.queue.push_back(&test_frame(1), StreamTime::new(0, 25_000));
        ctx.queue.push_back(&test_frame(2), StreamTime::new(1, 25_000));
        let scheduler = Scheduler::spawn(ctx.clone()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_from_sink_does_not_join_own_thread() {
        let ctx = context();
        let slot: Arc<Mutex<Option<Scheduler>>> = Arc::default();
        let sink_slot = Arc::clone(&slot);
        let (tx, rx) = unbounded::<Result<usize>>();
        ctx.sinks.set_completion(Some(Arc::new(move |_frame: FrameHandle| {
            let scheduler = sink_slot.lock().take();
            if let Some(scheduler) = scheduler {
                let _ = tx.send(scheduler.shutdown());
            }
        })));

        let frames: Vec<FrameHandle> = (0..4).map(test_frame).collect();
        for frame in &frames {
            ctx.queue.push_back(frame, StreamTime::new(0, 25_000));
        }
        {
            // Held until the handle is stored, so the sink always finds it.
            let mut guard = slot.lock();
            *guard = Some(Scheduler::spawn(ctx.clone()).unwrap());
        }

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap(), 0);

        // The loop drains on its next pass and exits.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !ctx.queue.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(ctx.queue.is_empty());
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_shutdown_releases_every_queued_frame() {
        let ctx = context();
        ctx.sinks.set_preview(Some(Arc::new(|_frame: &dyn VideoFrame| {})));

        let frames: Vec<FrameHandle> = (0..6).map(test_frame).collect();
        for frame in &frames {
            ctx.queue.push_back(frame, StreamTime::new(i64::MAX, 25_000));
        }
        let scheduler = Scheduler::spawn(ctx.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert_eq!(scheduler.shutdown().unwrap(), 6);
        // The stop request wakes the thread instead of waiting out the tick.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(ctx.queue.is_empty());
        for frame in &frames {
            assert_eq!(Arc::strong_count(frame), 1);
        }
    }
}
