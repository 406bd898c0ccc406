//! Fragmenting UDP multicast transport: publisher, connection descriptor,
//! raw broadcaster/listener, the queued-listener pipeline, and typed
//! overlays (spec §4.A–§4.F).

pub mod broadcaster;
pub mod connection;
pub mod frame;
pub mod listener;
pub mod publisher;
pub mod queued_listener;
pub mod typed;

pub use broadcaster::RawBroadcaster;
pub use connection::{Connection, Topics};
pub use listener::{RawEvent, RawListener};
pub use publisher::{Callback, Publisher};
pub use queued_listener::{run_worker_if_requested, QueuedEvent, QueuedListener};
pub use typed::{MessageBroadcaster, MessageEvent, MessageListener};
