//! Replay: the start/pause/stop facade over `BufferData` + `ScheduleBroadcasts`
//! (spec §4.J).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::replay::buffer::{BufferData, RecordSource, DEFAULT_QUEUE_CAPACITY};
use crate::replay::scheduler::ScheduleBroadcasts;

/// Bound on how long `start()` waits for the buffer to report ready, and how
/// long `pause()`/`stop()` wait for workers to join — 1s for replay workers
/// (spec §5), distinct from QueuedListener's 10s barriers.
const WORKER_TIMEOUT: Duration = Duration::from_secs(1);

/// Two-stage replay pipeline: a `BufferData` prefetches records from a log
/// source, a `ScheduleBroadcasts` emits them at recorded pace (scaled by
/// `speed`) onto their original multicast groups.
pub struct Replay {
    buffer: Arc<BufferData>,
    scheduler: ScheduleBroadcasts,
    running: AtomicBool,
}

impl Replay {
    pub fn new(source: Box<dyn RecordSource>, speed: f64) -> Result<Replay> {
        Replay::with_capacity(source, DEFAULT_QUEUE_CAPACITY, speed)
    }

    pub fn with_capacity(source: Box<dyn RecordSource>, capacity: usize, speed: f64) -> Result<Replay> {
        let buffer = Arc::new(BufferData::new(source, capacity));
        let scheduler = ScheduleBroadcasts::new(buffer.clone(), speed)?;
        Ok(Replay {
            buffer,
            scheduler,
            running: AtomicBool::new(false),
        })
    }

    /// Resets to the beginning if the previous run fully drained, then
    /// starts the buffer, waits up to [`WORKER_TIMEOUT`] for it to report
    /// ready, and starts the scheduler. Returns whether both workers are
    /// alive.
    pub fn start(&self) -> Result<bool> {
        if !self.running.load(Ordering::SeqCst) && self.buffer.is_ready() && !self.buffer.is_data_pending() {
            self.buffer.reset()?;
        }

        self.buffer.start();
        let deadline = Instant::now() + WORKER_TIMEOUT;
        while !self.buffer.is_ready() {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(WORKER_TIMEOUT, "replay buffer readiness"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        self.scheduler.start();
        self.running.store(true, Ordering::SeqCst);
        Ok(self.buffer.is_running() && self.scheduler.is_running())
    }

    /// Stop both workers without discarding buffered position.
    pub fn pause(&self) {
        self.scheduler.stop();
        self.buffer.stop();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop both workers and reset position to the beginning.
    pub fn stop(&self) -> Result<()> {
        self.pause();
        self.buffer.reset()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::logfile::LogRecord;

    struct EmptySource;
    impl RecordSource for EmptySource {
        fn next_record(&mut self) -> CrateResult<Option<LogRecord>> {
            Ok(None)
        }
        fn reset_source(&mut self) -> CrateResult<()> {
            Ok(())
        }
    }

    #[test]
    fn start_on_empty_source_reports_ready_immediately() {
        let replay = Replay::new(Box::new(EmptySource), 1.0).unwrap();
        let alive = replay.start().unwrap();
        // The buffer worker exits the instant it observes end-of-stream, so
        // by the time start() returns it may already be gone; only the
        // scheduler is guaranteed still running against an empty queue.
        let _ = alive;
        replay.stop().unwrap();
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(Replay::new(Box::new(EmptySource), 0.0).is_err());
    }
}
