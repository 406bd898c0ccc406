//! Typed overlays: `MessageBroadcaster`/`MessageListener` (spec §4.F).
//!
//! These are the only place the codec touches the transport layer — the
//! `RawBroadcaster`/`RawListener` beneath them only ever see already-encoded
//! bytes.

use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::message::descriptor::MessageDescriptor;
use crate::message::instance::Message;
use crate::transport::broadcaster::RawBroadcaster;
use crate::transport::connection::Topics;
use crate::transport::listener::{RawEvent, RawListener};
use crate::transport::publisher::{Callback, Publisher};

/// Schema-validated overlay over [`RawBroadcaster`]: `publish` requires the
/// message's type to match the bound descriptor, encodes it via the codec,
/// then forwards to the inherited byte-oriented `publish`.
pub struct MessageBroadcaster {
    descriptor: Arc<MessageDescriptor>,
    inner: RawBroadcaster,
}

impl MessageBroadcaster {
    pub fn new(descriptor: Arc<MessageDescriptor>, topic: impl Into<String>) -> MessageBroadcaster {
        let inner = RawBroadcaster::new(descriptor.connection.clone(), topic);
        MessageBroadcaster { descriptor, inner }
    }

    pub fn open(&self) -> Result<()> {
        self.inner.open()
    }
    pub fn close(&self) -> bool {
        self.inner.close()
    }
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    pub fn publish(&self, message: &Message) -> Result<()> {
        if message.name() != self.descriptor.name {
            return Err(Error::Schema(format!(
                "MessageBroadcaster for '{}' cannot publish a '{}' instance",
                self.descriptor.name,
                message.name()
            )));
        }
        let bytes = crate::codec::encode(message.fields())?;
        self.inner.publish(&bytes)
    }
}

/// Event emitted by [`MessageListener`]: a decoded, schema-validated instance.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub topic: String,
    pub payload: Message,
}

/// Schema-validated overlay over [`RawListener`]: decodes each raw payload
/// into a descriptor-bound [`Message`] and re-emits it. Decode failures are
/// logged and dropped (spec §7), never surfaced to subscribers.
pub struct MessageListener {
    descriptor: Arc<MessageDescriptor>,
    inner: RawListener,
    publisher: Arc<Publisher<MessageEvent>>,
}

impl MessageListener {
    pub fn new(descriptor: Arc<MessageDescriptor>, topics: Option<Topics>) -> MessageListener {
        let mut connection = descriptor.connection.clone();
        if let Some(topics) = topics {
            connection.topics = topics;
        }
        let inner = RawListener::new(connection);

        let publisher = Arc::new(Publisher::new());
        let publisher_for_cb = publisher.clone();
        let descriptor_for_cb = descriptor.clone();
        let relay: Callback<RawEvent> = Arc::new(move |event: RawEvent| {
            match Message::from_bytes(&descriptor_for_cb, &event.payload) {
                Ok(payload) => publisher_for_cb.trigger(MessageEvent {
                    topic: event.topic.clone(),
                    payload,
                }),
                Err(e) => warn!(error = %e, "MessageListener: dropping undecodable payload"),
            }
        });
        inner.subscribe(relay);

        MessageListener {
            descriptor,
            inner,
            publisher,
        }
    }

    pub fn open(&self) -> Result<()> {
        self.inner.open()
    }
    pub fn close(&self) -> bool {
        self.inner.close()
    }
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    pub fn subscribe(&self, cb: Callback<MessageEvent>) -> bool {
        self.publisher.subscribe(cb)
    }
    pub fn unsubscribe(&self, cb: &Callback<MessageEvent>) -> bool {
        self.publisher.unsubscribe(cb)
    }
    pub fn is_subscribed(&self, cb: &Callback<MessageEvent>) -> bool {
        self.publisher.is_subscribed(cb)
    }
}
