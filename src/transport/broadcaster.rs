//! RawBroadcaster: fragmenting UDP multicast sender (spec §4.C).
//!
//! Socket setup style grounded on `hdds/src/transport/multicast.rs`
//! (hop-limit / reuse-address knobs via `socket2`); exact fragmentation
//! arithmetic and frame contents grounded on `mcl/network/udp.py::Connection.publish`
//! (original_source).

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use socket2::{Domain, Socket, Type};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::connection::Connection;
use crate::transport::frame::Frame;

/// Default payload chunk size: datagrams stay under IP-layer fragmentation
/// thresholds at this size (spec §6, §4.C).
pub const DEFAULT_MTU: usize = 60_000;
/// Default IPv6 multicast hop limit (spec §6).
pub const DEFAULT_HOP_LIMIT: u32 = 3;

struct OpenState {
    socket: UdpSocket,
    destination: SocketAddr,
}

/// Sends byte payloads to a multicast group, fragmenting at `mtu` and
/// tagging every fragment with a topic.
pub struct RawBroadcaster {
    connection: Connection,
    topic: String,
    mtu: usize,
    hop_limit: u32,
    state: Mutex<Option<OpenState>>,
    counter: AtomicU64,
}

impl RawBroadcaster {
    pub fn new(connection: Connection, topic: impl Into<String>) -> RawBroadcaster {
        RawBroadcaster {
            connection,
            topic: topic.into(),
            mtu: DEFAULT_MTU,
            hop_limit: DEFAULT_HOP_LIMIT,
            state: Mutex::new(None),
            counter: AtomicU64::new(0),
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(1);
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u32) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Create the socket, resolve and cache the destination, set the hop
    /// limit. Fails (does not silently no-op) if already open: a
    /// broadcaster is not reopenable once open.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.state.lock();
        if guard.is_some() {
            return Err(Error::State("broadcaster is not reopenable once open".into()));
        }

        let group: Ipv6Addr = self.connection.group.parse().map_err(|e| {
            Error::Config(format!(
                "invalid IPv6 multicast group '{}': {e}",
                self.connection.group
            ))
        })?;

        let socket = Socket::new(Domain::IPV6, Type::DGRAM, None)?;
        socket.set_multicast_hops_v6(self.hop_limit)?;
        let destination = SocketAddr::V6(SocketAddrV6::new(group, self.connection.port, 0, 0));

        debug!(group = %group, port = self.connection.port, topic = %self.topic, "RawBroadcaster opened");
        *guard = Some(OpenState {
            socket: socket.into(),
            destination,
        });
        Ok(())
    }

    /// Fragment `payload` at `mtu` and send one datagram per fragment.
    pub fn publish(&self, payload: &[u8]) -> Result<()> {
        let guard = self.state.lock();
        let state = guard
            .as_ref()
            .ok_or_else(|| Error::State("publish on a closed broadcaster".into()))?;

        let total = if payload.is_empty() {
            1
        } else {
            payload.len().div_ceil(self.mtu)
        };

        for i in 0..total {
            let start = i * self.mtu;
            let end = (start + self.mtu).min(payload.len());
            let frame = Frame {
                topic: self.topic.clone(),
                packet_index: (i + 1) as u32,
                packet_total: total as u32,
                chunk: payload[start..end].to_vec(),
            };
            state.socket.send_to(&frame.encode(), state.destination)?;
        }
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Release the socket. Returns whether a socket was actually closed.
    pub fn close(&self) -> bool {
        self.state.lock().take().is_some()
    }
}

impl Drop for RawBroadcaster {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new("ff15::beef".into(), Some(29001), None, None).unwrap()
    }

    #[test]
    fn reopen_fails() {
        let b = RawBroadcaster::new(conn(), "t");
        b.open().unwrap();
        let err = b.open().unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn publish_before_open_fails() {
        let b = RawBroadcaster::new(conn(), "t");
        let err = b.publish(b"x").unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let b = RawBroadcaster::new(conn(), "t");
        b.open().unwrap();
        assert!(b.close());
        assert!(!b.close());
    }

    #[test]
    fn fragment_count_matches_mtu_math() {
        let b = RawBroadcaster::new(conn(), "t").with_mtu(10);
        b.open().unwrap();
        // 25 bytes at mtu=10 -> 3 fragments; just exercises the send path
        // without asserting on wire receipt (covered by transport integration tests).
        b.publish(&vec![0u8; 25]).unwrap();
        assert_eq!(b.counter(), 1);
    }
}
