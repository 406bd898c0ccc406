//! BufferData: prefetches records from a reader into a bounded queue (spec §4.J).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::warn;

use crate::error::Result;
use crate::logfile::{DirectoryReader, LogReader, LogRecord};

pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;
const QUEUE_SEND_RETRY: Duration = Duration::from_millis(200);

/// Anything that can hand back one record at a time, in non-decreasing
/// `elapsed_time` order — a `LogReader` or a `DirectoryReader`.
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Result<Option<LogRecord>>;
    fn reset_source(&mut self) -> Result<()>;
}

impl RecordSource for LogReader {
    fn next_record(&mut self) -> Result<Option<LogRecord>> {
        self.read()
    }
    fn reset_source(&mut self) -> Result<()> {
        self.reset()
    }
}

impl RecordSource for DirectoryReader {
    fn next_record(&mut self) -> Result<Option<LogRecord>> {
        self.read()
    }
    fn reset_source(&mut self) -> Result<()> {
        self.reset()
    }
}

/// Owns a reader and a bounded queue. A worker thread reads records and
/// blocking-puts them on the queue until the source is exhausted or
/// [`BufferData::stop`] is called.
pub struct BufferData {
    source: Arc<Mutex<Box<dyn RecordSource>>>,
    capacity: usize,
    tx: Sender<LogRecord>,
    rx: Receiver<LogRecord>,
    run: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferData {
    pub fn new(source: Box<dyn RecordSource>, capacity: usize) -> BufferData {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        BufferData {
            source: Arc::new(Mutex::new(source)),
            capacity,
            tx,
            rx,
            run: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Queue full or source exhausted: gates the scheduler's start.
    pub fn is_ready(&self) -> bool {
        self.rx.len() >= self.capacity || self.exhausted.load(Ordering::SeqCst)
    }

    pub fn is_data_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Blocking take with a timeout; `Ok(None)` on timeout, never on EOF
    /// (the channel itself never closes while the worker is registered).
    pub fn take(&self, timeout: Duration) -> Option<LogRecord> {
        match self.rx.recv_timeout(timeout) {
            Ok(record) => Some(record),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn start(&self) {
        let mut guard = self.worker.lock();
        if guard.is_some() {
            return;
        }
        self.run.store(true, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);

        let run = self.run.clone();
        let exhausted = self.exhausted.clone();
        let source = self.source.clone();
        let tx = self.tx.clone();

        let handle = std::thread::spawn(move || {
            while run.load(Ordering::SeqCst) {
                let next = {
                    let mut guard = source.lock();
                    guard.next_record()
                };
                match next {
                    Ok(Some(mut record)) => loop {
                        if !run.load(Ordering::SeqCst) {
                            return;
                        }
                        match tx.send_timeout(record, QUEUE_SEND_RETRY) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(returned)) => {
                                record = returned;
                                continue;
                            }
                            Err(SendTimeoutError::Disconnected(_)) => return,
                        }
                    },
                    Ok(None) => {
                        exhausted.store(true, Ordering::SeqCst);
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "BufferData: source read error, treating as end of stream");
                        exhausted.store(true, Ordering::SeqCst);
                        return;
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

    /// Stop the worker, drop any queue remainder, and reset the underlying
    /// source so the next `start()` replays from the beginning.
    pub fn reset(&self) -> Result<()> {
        self.stop();
        while self.rx.try_recv().is_ok() {}
        self.source.lock().reset_source()?;
        self.exhausted.store(false, Ordering::SeqCst);
        Ok(())
    }
}
