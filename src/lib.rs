//! `meshcast`: schema-validated pub/sub messaging over IPv6 UDP multicast,
//! with a self-describing log format and timed replay, for multi-process
//! robotics deployments.
//!
//! - [`message`] — message type descriptors, the process-wide registry, and
//!   tagged-map message instances.
//! - [`codec`] — the byte-array encoder message instances and log records
//!   are serialized through.
//! - [`transport`] — the fragmenting UDP multicast broadcaster/listener
//!   pair, the publisher callback list, the queued (subprocess-isolated)
//!   listener, and typed overlays that bind a transport to a message type.
//! - [`logfile`] — the rotating, self-describing log writer and the
//!   split-file-aware, directory-merging readers.
//! - [`replay`] — the two-stage prefetch/schedule pipeline that replays a
//!   recorded session at a chosen speed.
//! - [`config`] — network/simulation configuration file parsing.
//! - [`logging`] — shared `tracing` subscriber setup for the `bin/` front-ends.

pub mod codec;
pub mod config;
pub mod error;
pub mod logfile;
pub mod logging;
pub mod message;
pub mod replay;
pub mod transport;

pub use error::{Error, Result};
