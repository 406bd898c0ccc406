//! Two-stage replay pipeline: prefetch records to a queue, emit them on
//! their original multicast groups at recorded pace (spec §4.J).

mod buffer;
mod facade;
mod scheduler;

pub use buffer::{BufferData, RecordSource, DEFAULT_QUEUE_CAPACITY};
pub use facade::Replay;
pub use scheduler::ScheduleBroadcasts;
