//! The serialization codec: an external collaborator per spec §1, implemented
//! here as a thin `serde_json`-based encoder so the rest of the stack (typed
//! transport overlays, log writer/reader) has something concrete to call.
//!
//! This intentionally does not attempt a schema-aware binary codec — the
//! registry's job (validating field sets against a descriptor) stays in
//! `crate::message`, not here. The codec only turns a `serde::Serialize`
//! value into bytes and back.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encode any serializable value to a byte array.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a byte array previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Render bytes as a lowercase hex string, the form used by the log file
/// record line format (spec §4.G/§6).
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Parse a lowercase (or uppercase) hex string back to bytes.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(crate::error::Error::Format(format!(
            "hex payload has odd length: {}",
            s.len()
        )));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char)
            .to_digit(16)
            .ok_or_else(|| crate::error::Error::Format(format!("invalid hex digit in '{s}'")))?;
        let lo = (chunk[1] as char)
            .to_digit(16)
            .ok_or_else(|| crate::error::Error::Format(format!("invalid hex digit in '{s}'")))?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn round_trips_a_map() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), serde_json::json!(1));
        let bytes = encode(&map).unwrap();
        let back: BTreeMap<String, serde_json::Value> = decode(&bytes).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn hex_round_trips() {
        let bytes = vec![0u8, 1, 255, 16];
        let hex = to_hex(&bytes);
        assert_eq!(hex, "0001ff10");
        assert_eq!(from_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn from_hex_rejects_odd_length() {
        assert!(from_hex("abc").is_err());
    }
}
