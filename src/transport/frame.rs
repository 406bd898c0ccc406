//! Wire frame encoding: the per-datagram `(topic, packet_index, packet_total,
//! chunk)` 4-tuple (spec §4.C, §6).
//!
//! This is deliberately a small fixed binary layout rather than a reuse of
//! `crate::codec` — a JSON encoding of a 60000-byte chunk would bloat well
//! past the MTU it is meant to fit inside. `byteorder` (already part of the
//! teacher's `hdds-recording` dependency set, used the same way in
//! `format/hdds.rs` for its binary record layout) gives us a compact,
//! allocation-light framing with no external codec dependency.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::{Error, Result};

/// One fragment of a (possibly multi-fragment) published payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub packet_index: u32,
    pub packet_total: u32,
    pub chunk: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let topic_bytes = self.topic.as_bytes();
        let mut out = Vec::with_capacity(2 + topic_bytes.len() + 4 + 4 + 4 + self.chunk.len());
        out.write_u16::<BigEndian>(topic_bytes.len() as u16)
            .expect("writing to a Vec never fails");
        out.write_all(topic_bytes).expect("writing to a Vec never fails");
        out.write_u32::<BigEndian>(self.packet_index)
            .expect("writing to a Vec never fails");
        out.write_u32::<BigEndian>(self.packet_total)
            .expect("writing to a Vec never fails");
        out.write_u32::<BigEndian>(self.chunk.len() as u32)
            .expect("writing to a Vec never fails");
        out.write_all(&self.chunk).expect("writing to a Vec never fails");
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        let mut cur = Cursor::new(bytes);
        let topic_len = cur
            .read_u16::<BigEndian>()
            .map_err(|e| Error::Format(format!("frame: truncated topic length: {e}")))? as usize;
        let mut topic_buf = vec![0u8; topic_len];
        cur.read_exact(&mut topic_buf)
            .map_err(|e| Error::Format(format!("frame: truncated topic: {e}")))?;
        let topic = String::from_utf8(topic_buf)
            .map_err(|e| Error::Format(format!("frame: topic is not valid UTF-8: {e}")))?;
        let packet_index = cur
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Format(format!("frame: truncated packet_index: {e}")))?;
        let packet_total = cur
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Format(format!("frame: truncated packet_total: {e}")))?;
        let chunk_len = cur
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Format(format!("frame: truncated chunk length: {e}")))? as usize;
        let mut chunk = vec![0u8; chunk_len];
        cur.read_exact(&mut chunk)
            .map_err(|e| Error::Format(format!("frame: truncated chunk: {e}")))?;
        Ok(Frame {
            topic,
            packet_index,
            packet_total,
            chunk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let f = Frame {
            topic: "bulk".to_string(),
            packet_index: 2,
            packet_total: 5,
            chunk: vec![1, 2, 3, 4],
        };
        let bytes = f.encode();
        let back = Frame::decode(&bytes).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        assert!(Frame::decode(&[0, 4, b'b', b'u']).is_err());
    }

    #[test]
    fn empty_chunk_round_trips() {
        let f = Frame {
            topic: String::new(),
            packet_index: 1,
            packet_total: 1,
            chunk: vec![],
        };
        let bytes = f.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), f);
    }
}
