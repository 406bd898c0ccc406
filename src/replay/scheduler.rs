//! ScheduleBroadcasts: emits buffered records on their original multicast
//! groups at recorded pace, scaled by a speed multiplier (spec §4.J).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Error, Result};
use crate::logfile::{LogRecord, Payload};
use crate::replay::buffer::BufferData;
use crate::transport::broadcaster::RawBroadcaster;

const TAKE_TIMEOUT: Duration = Duration::from_millis(100);

fn end_of_stream(buffer: &BufferData) -> bool {
    !buffer.is_data_pending() && buffer.is_ready()
}

/// One on-demand broadcaster per `(message type, topic)` pair seen during
/// replay, grounded on `hdds-recording/src/player.rs`'s lazily-opened
/// output-side sockets.
type BroadcasterCache = Mutex<HashMap<(String, String), Arc<RawBroadcaster>>>;

fn publish_record(cache: &BroadcasterCache, record: &LogRecord) -> Result<()> {
    let message = match &record.payload {
        Payload::Message(m) => m,
        Payload::Raw(_) => {
            return Err(Error::Schema(
                "replay requires decoded records to resolve a connection; open the source with a non-Raw decode mode".into(),
            ))
        }
    };
    let descriptor = message
        .descriptor()
        .cloned()
        .ok_or_else(|| Error::Schema("message has no bound descriptor".into()))?;

    let key = (descriptor.name.clone(), record.topic.clone());
    let broadcaster = {
        let mut guard = cache.lock();
        guard
            .entry(key)
            .or_insert_with(|| Arc::new(RawBroadcaster::new(descriptor.connection.clone(), record.topic.clone())))
            .clone()
    };
    if !broadcaster.is_open() {
        broadcaster.open()?;
    }
    let bytes = crate::codec::encode(message.fields())?;
    broadcaster.publish(&bytes)
}

/// Busy-waits each buffered record to its scheduled wall-clock deadline,
/// then publishes it. `speed` is a multiplier on recorded time: 2.0 replays
/// twice as fast, 0.5 half as fast.
pub struct ScheduleBroadcasts {
    buffer: Arc<BufferData>,
    inv_speed: f64,
    run: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    broadcasters: Arc<BroadcasterCache>,
}

impl ScheduleBroadcasts {
    pub fn new(buffer: Arc<BufferData>, speed: f64) -> Result<ScheduleBroadcasts> {
        if !(speed > 0.0) {
            return Err(Error::Config(format!("replay speed must be > 0, got {speed}")));
        }
        Ok(ScheduleBroadcasts {
            buffer,
            inv_speed: 1.0 / speed,
            run: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            broadcasters: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn start(&self) {
        let mut guard = self.worker.lock();
        if guard.is_some() {
            return;
        }
        self.run.store(true, Ordering::SeqCst);

        let run = self.run.clone();
        let buffer = self.buffer.clone();
        let inv_speed = self.inv_speed;
        let broadcasters = self.broadcasters.clone();

        let handle = std::thread::spawn(move || {
            let mut origin: Option<Instant> = None;
            while run.load(Ordering::SeqCst) {
                match buffer.take(TAKE_TIMEOUT) {
                    Some(record) => {
                        let origin_wall = *origin.get_or_insert_with(Instant::now);
                        let deadline = origin_wall + Duration::from_secs_f64(inv_speed * record.elapsed_time);
                        while run.load(Ordering::SeqCst) && Instant::now() < deadline {
                            std::thread::yield_now();
                        }
                        if !run.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Err(e) = publish_record(&broadcasters, &record) {
                            warn!(error = %e, topic = %record.topic, "ScheduleBroadcasts: publish failed, record dropped");
                        }
                    }
                    None => {
                        if end_of_stream(&buffer) {
                            break;
                        }
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    pub fn stop(&self) {
        self.run.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_speed() {
        let buffer = Arc::new(BufferData::new(Box::new(NullSource), 8));
        assert!(ScheduleBroadcasts::new(buffer.clone(), 0.0).is_err());
        assert!(ScheduleBroadcasts::new(buffer, -1.0).is_err());
    }

    struct NullSource;
    impl crate::replay::buffer::RecordSource for NullSource {
        fn next_record(&mut self) -> Result<Option<LogRecord>> {
            Ok(None)
        }
        fn reset_source(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
