//! QueuedListener: decouples socket reception from user callbacks via a
//! bounded cross-process queue (spec §4.E).
//!
//! `mcl`'s `QueuedListener` (original_source: `mcl/network/network.py`) uses
//! Python's `multiprocessing.Process` plus a `multiprocessing.Queue`. The
//! nearest idiomatic Rust realization of "a dedicated OS-level receiver
//! decoupled from the parent by a real process boundary" is to re-exec the
//! current binary as a worker subprocess and carry frames back over its
//! stdout pipe; every `meshcast` binary must call
//! [`run_worker_if_requested`] first thing in `main` to support this.
//!
//! The "bounded queue with a non-blocking put" lives on the child side,
//! between the `RawListener` callback (producer) and the single thread that
//! writes frames to the pipe (consumer) — this is where a slow parent must
//! not be allowed to stall the socket-reading loop. The parent's reader
//! thread treats the pipe as a plain byte stream and invokes the
//! `QueuedListener`'s own callbacks directly as frames arrive.

use std::io::{BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::connection::{Connection, Topics};
use crate::transport::listener::RawListener;
use crate::transport::publisher::{Callback, Publisher};

/// Default queue capacity (spec §4.E).
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Hidden subcommand marker: `QueuedListener::open` re-execs the current
/// binary with this as `argv[1]`. Every binary's `main` must call
/// [`run_worker_if_requested`] before doing anything else.
pub const WORKER_ARG: &str = "--meshcast-queued-listener-worker";

const TAG_READY: u8 = 1;
const TAG_EVENT: u8 = 2;

/// Event emitted by a [`QueuedListener`]: a reassembled payload that crossed
/// the process boundary.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub topic: String,
    pub payload: Arc<Vec<u8>>,
}

fn write_event<W: Write>(out: &mut W, topic: &str, payload: &[u8]) -> std::io::Result<()> {
    out.write_u8(TAG_EVENT)?;
    let topic_bytes = topic.as_bytes();
    out.write_u16::<BigEndian>(topic_bytes.len() as u16)?;
    out.write_all(topic_bytes)?;
    out.write_u32::<BigEndian>(payload.len() as u32)?;
    out.write_all(payload)?;
    out.flush()
}

fn write_ready<W: Write>(out: &mut W) -> std::io::Result<()> {
    out.write_u8(TAG_READY)?;
    out.flush()
}

enum Frame {
    Ready,
    Event(QueuedEvent),
}

/// Read one frame from the pipe. `Ok(None)` means EOF (child exited).
fn read_frame<R: Read>(input: &mut R) -> std::io::Result<Option<Frame>> {
    let tag = match input.read_u8() {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    match tag {
        TAG_READY => Ok(Some(Frame::Ready)),
        TAG_EVENT => {
            let topic_len = input.read_u16::<BigEndian>()? as usize;
            let mut topic_buf = vec![0u8; topic_len];
            input.read_exact(&mut topic_buf)?;
            let topic = String::from_utf8_lossy(&topic_buf).into_owned();
            let payload_len = input.read_u32::<BigEndian>()? as usize;
            let mut payload = vec![0u8; payload_len];
            input.read_exact(&mut payload)?;
            Ok(Some(Frame::Event(QueuedEvent {
                topic,
                payload: Arc::new(payload),
            })))
        }
        other => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown queued-listener frame tag {other}"),
        )),
    }
}

/// Child-process entry point. If `argv[1] == WORKER_ARG`, runs the
/// dedicated-receiver worker loop and never returns (the process exits
/// directly); otherwise returns `false` immediately so normal `main` logic
/// continues.
pub fn run_worker_if_requested(argv: &[String]) -> Result<bool> {
    if argv.get(1).map(|s| s.as_str()) != Some(WORKER_ARG) {
        return Ok(false);
    }
    let group = argv
        .get(2)
        .cloned()
        .ok_or_else(|| Error::Config("queued-listener worker: missing group argument".into()))?;
    let port: u16 = argv
        .get(3)
        .ok_or_else(|| Error::Config("queued-listener worker: missing port argument".into()))?
        .parse()
        .map_err(|e| Error::Config(format!("queued-listener worker: invalid port: {e}")))?;
    let topics = Topics::from_csv(argv.get(4).map(|s| s.as_str()).unwrap_or(""));
    let capacity: usize = argv
        .get(5)
        .map(|s| s.as_str())
        .unwrap_or("")
        .parse()
        .unwrap_or(DEFAULT_QUEUE_CAPACITY);

    let connection = Connection::new(group, Some(port), Some(topics), None)?;
    let listener = RawListener::new(connection);

    let (tx, rx) = bounded::<QueuedEvent>(capacity.max(1));
    let relay: Callback<crate::transport::listener::RawEvent> = Arc::new(move |event| {
        let queued = QueuedEvent {
            topic: event.topic.clone(),
            payload: event.payload.clone(),
        };
        if tx.try_send(queued).is_err() {
            // Queue full: the child drops rather than applying backpressure
            // to the socket-draining loop (spec §4.E rationale).
            warn!("QueuedListener worker: queue full, dropping record");
        }
    });
    listener.subscribe(relay);
    listener.open()?;

    let mut stdout = std::io::stdout();
    write_ready(&mut stdout).map_err(Error::Io)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_stdin = stop.clone();
    let stdin_thread = std::thread::spawn(move || {
        let mut line = String::new();
        let mut reader = BufReader::new(std::io::stdin());
        loop {
            line.clear();
            match std::io::BufRead::read_line(&mut reader, &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line.trim() == "STOP" {
                        stop_for_stdin.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }
    });

    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                if write_event(&mut stdout, &event.topic, &event.payload).is_err() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    listener.close();
    let _ = stdin_thread.join();
    std::process::exit(0);
}

/// Wraps a `RawListener` so reception runs in a dedicated child process and
/// user callbacks run on a thread in the parent.
pub struct QueuedListener {
    connection: Connection,
    capacity: usize,
    publisher: Arc<Publisher<QueuedEvent>>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    run: Arc<AtomicBool>,
}

impl QueuedListener {
    pub fn new(connection: Connection) -> QueuedListener {
        QueuedListener {
            connection,
            capacity: DEFAULT_QUEUE_CAPACITY,
            publisher: Arc::new(Publisher::new()),
            child: Mutex::new(None),
            reader: Mutex::new(None),
            run: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn subscribe(&self, cb: Callback<QueuedEvent>) -> bool {
        self.publisher.subscribe(cb)
    }
    pub fn unsubscribe(&self, cb: &Callback<QueuedEvent>) -> bool {
        self.publisher.unsubscribe(cb)
    }
    pub fn is_subscribed(&self, cb: &Callback<QueuedEvent>) -> bool {
        self.publisher.is_subscribed(cb)
    }
    pub fn is_open(&self) -> bool {
        self.child.lock().is_some()
    }

    /// Spawn the child receiver process and the parent reader thread. Blocks
    /// until both signal readiness or [`STARTUP_TIMEOUT`] elapses, in which
    /// case the partially-started pair is torn down and a fatal
    /// `Error::Timeout` is returned. A second call while already open is a
    /// no-op.
    pub fn open(&self) -> Result<()> {
        let mut child_guard = self.child.lock();
        if child_guard.is_some() {
            return Ok(());
        }

        let exe = std::env::current_exe()?;
        let mut child = Command::new(exe)
            .arg(WORKER_ARG)
            .arg(&self.connection.group)
            .arg(self.connection.port.to_string())
            .arg(self.connection.topics.to_csv())
            .arg(self.capacity.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::State("queued-listener: child stdout was not piped".into()))?;

        self.run.store(true, Ordering::SeqCst);
        let run = self.run.clone();
        let publisher = self.publisher.clone();
        let child_ready = Arc::new(AtomicBool::new(false));
        let reader_ready = Arc::new(AtomicBool::new(false));
        let child_ready_w = child_ready.clone();
        let reader_ready_w = reader_ready.clone();

        let handle = std::thread::spawn(move || {
            reader_ready_w.store(true, Ordering::SeqCst);
            let mut reader = BufReader::new(stdout);
            while run.load(Ordering::SeqCst) {
                match read_frame(&mut reader) {
                    Ok(Some(Frame::Ready)) => child_ready_w.store(true, Ordering::SeqCst),
                    Ok(Some(Frame::Event(event))) => publisher.trigger(event),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "QueuedListener: reader thread error");
                        break;
                    }
                }
            }
            debug!("QueuedListener reader thread stopped");
        });

        let deadline = Instant::now() + STARTUP_TIMEOUT;
        loop {
            if child_ready.load(Ordering::SeqCst) && reader_ready.load(Ordering::SeqCst) {
                break;
            }
            if Instant::now() >= deadline {
                self.run.store(false, Ordering::SeqCst);
                let _ = child.kill();
                let _ = handle.join();
                return Err(Error::Timeout(STARTUP_TIMEOUT, "QueuedListener startup"));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        *child_guard = Some(child);
        *self.reader.lock() = Some(handle);
        Ok(())
    }

    /// Signal both sides to stop, join the reader thread and child process
    /// with a bounded wait, and drop any queue remainder. Exceeding the
    /// shutdown timeout is fatal (spec §7: a leaked worker is always an
    /// error, never a silent no-op).
    pub fn close(&self) -> Result<bool> {
        let mut child_guard = self.child.lock();
        let mut child = match child_guard.take() {
            Some(c) => c,
            None => return Ok(false),
        };

        self.run.store(false, Ordering::SeqCst);
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"STOP\n");
            let _ = stdin.flush();
        }

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        loop {
            match child.try_wait()? {
                Some(_status) => break,
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(Error::Timeout(SHUTDOWN_TIMEOUT, "QueuedListener shutdown"));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }

        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
        Ok(true)
    }
}

impl Drop for QueuedListener {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trip() {
        let mut buf = Vec::new();
        write_ready(&mut buf).unwrap();
        write_event(&mut buf, "bulk", &[1, 2, 3]).unwrap();

        let mut cur = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cur).unwrap(), Some(Frame::Ready)));
        match read_frame(&mut cur).unwrap() {
            Some(Frame::Event(e)) => {
                assert_eq!(e.topic, "bulk");
                assert_eq!(*e.payload, vec![1, 2, 3]);
            }
            _ => panic!("expected an event frame"),
        }
        assert!(read_frame(&mut cur).unwrap().is_none());
    }
}
