//! Message descriptors, the process-wide registry, and message instances.
//!
//! Grounded on `mcl/message/messages.py` (original_source) for the reserved
//! key / mandatory-field invariants, and on the value-type shape of
//! `hdds-recording::format` for the Rust representation.

pub mod descriptor;
pub mod instance;

pub use descriptor::{MessageDescriptor, Registry};
pub use instance::{FieldValue, Message};
