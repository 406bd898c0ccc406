//! Message instances: tagged maps with two reserved, auto-managed keys.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::descriptor::MessageDescriptor;

/// A single codec-serializable field value.
///
/// `meshcast`'s codec is JSON-based (see `crate::codec`), so `FieldValue` is
/// simply `serde_json::Value` under another name: it already covers null,
/// bool, number, string, array and object, which is everything the message
/// schema ever needs to carry.
pub type FieldValue = serde_json::Value;

pub const RESERVED_NAME: &str = "name";
pub const RESERVED_TIMESTAMP: &str = "timestamp";

fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// A message instance: a map from string keys to [`FieldValue`]s, tagged with
/// the descriptor it was constructed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    descriptor: Option<Arc<MessageDescriptor>>,
    fields: BTreeMap<String, FieldValue>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Message {
    /// An instance with every mandatory key present and set to `null`.
    pub fn empty(descriptor: &Arc<MessageDescriptor>) -> Message {
        let mut fields = BTreeMap::new();
        for key in &descriptor.mandatory {
            fields.insert(key.clone(), FieldValue::Null);
        }
        let mut msg = Message {
            descriptor: Some(descriptor.clone()),
            fields,
        };
        msg.apply(BTreeMap::new(), descriptor, false)
            .expect("empty construction never fails mandatory check");
        msg
    }

    /// Construct from a field map; the map must be a superset of the
    /// descriptor's mandatory tuple or construction fails with `Error::Schema`.
    ///
    /// A `name` entry in `map` (e.g. one carried over from a decoded wire
    /// payload, which embeds the full field set including `name`) is dropped
    /// rather than rejected: construction always re-derives `name` from
    /// `descriptor` below, so an incoming value is redundant, not a mutation
    /// attempt.
    pub fn from_map(descriptor: &Arc<MessageDescriptor>, map: BTreeMap<String, FieldValue>) -> Result<Message> {
        let mut msg = Message {
            descriptor: Some(descriptor.clone()),
            fields: BTreeMap::new(),
        };
        msg.apply(map, descriptor, false)?;
        Ok(msg)
    }

    /// Construct from key/value pairs, equivalent to [`Message::from_map`].
    pub fn from_pairs(descriptor: &Arc<MessageDescriptor>, pairs: Vec<(String, FieldValue)>) -> Result<Message> {
        Message::from_map(descriptor, pairs.into_iter().collect())
    }

    /// Construct by decoding an encoded byte array via the codec, then
    /// validating the decoded map against `descriptor`.
    pub fn from_bytes(descriptor: &Arc<MessageDescriptor>, bytes: &[u8]) -> Result<Message> {
        let map: BTreeMap<String, FieldValue> = crate::codec::decode(bytes)?;
        Message::from_map(descriptor, map)
    }

    /// Apply `update` on top of the current field map, honouring the
    /// `name`/`timestamp` reserved-key rules (see module docs on
    /// [`Message`]). Used by both construction and later mutation;
    /// `reject_reserved_name` distinguishes the two — a caller mutating a
    /// live instance may never set `name`, but reconstructing one from a
    /// decoded wire map (which already embeds it) should just drop it, the
    /// same way the original pops `name` before rebuilding an instance.
    fn apply(
        &mut self,
        mut update: BTreeMap<String, FieldValue>,
        descriptor: &Arc<MessageDescriptor>,
        reject_reserved_name: bool,
    ) -> Result<()> {
        if reject_reserved_name && update.contains_key(RESERVED_NAME) {
            return Err(Error::Schema(format!(
                "'{RESERVED_NAME}' is read-only and cannot be supplied by the caller"
            )));
        }
        update.remove(RESERVED_NAME);
        let caller_set_timestamp = update.contains_key(RESERVED_TIMESTAMP);

        for (k, v) in update.drain() {
            self.fields.insert(k, v);
        }
        self.fields
            .insert(RESERVED_NAME.to_string(), FieldValue::String(descriptor.name.clone()));
        if !caller_set_timestamp {
            self.fields.insert(
                RESERVED_TIMESTAMP.to_string(),
                FieldValue::from(now_unix_seconds()),
            );
        }

        for mandatory in &descriptor.mandatory {
            if !self.fields.contains_key(mandatory) {
                return Err(Error::Schema(format!(
                    "message '{}' missing mandatory field '{mandatory}'",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    /// Mutate the instance in place, re-running the reserved-key rules.
    pub fn update(&mut self, fields: BTreeMap<String, FieldValue>) -> Result<()> {
        let descriptor = self
            .descriptor
            .clone()
            .ok_or_else(|| Error::Schema("message has no bound descriptor".into()))?;
        self.apply(fields, &descriptor, true)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn name(&self) -> &str {
        self.fields
            .get(RESERVED_NAME)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> f64 {
        self.fields.get(RESERVED_TIMESTAMP).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn descriptor(&self) -> Option<&Arc<MessageDescriptor>> {
        self.descriptor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::descriptor::Registry;
    use crate::transport::connection::Connection;

    fn test_descriptor(registry: &Registry, name: &str, mandatory: &[&str]) -> Arc<MessageDescriptor> {
        let conn = Connection::new(format!("ff15::{name}"), None, None, None).unwrap();
        registry
            .register(name, mandatory.iter().map(|s| s.to_string()).collect(), conn)
            .unwrap()
    }

    #[test]
    fn empty_has_null_mandatory_fields() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "Empty", &["a", "b"]);
        let m = Message::empty(&d);
        assert_eq!(m.get("a"), Some(&FieldValue::Null));
        assert_eq!(m.get("b"), Some(&FieldValue::Null));
        assert_eq!(m.name(), "Empty");
    }

    #[test]
    fn from_map_rejects_missing_mandatory() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "AB", &["A", "B"]);
        let mut fields = BTreeMap::new();
        fields.insert("A".to_string(), FieldValue::from(1));
        let err = Message::from_map(&d, fields).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn from_map_sets_timestamp_unless_supplied() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "AB2", &["A", "B"]);
        let mut fields = BTreeMap::new();
        fields.insert("A".to_string(), FieldValue::from(1));
        fields.insert("B".to_string(), FieldValue::from(2));
        let m = Message::from_map(&d, fields).unwrap();
        assert!(m.timestamp() > 0.0);

        let mut fields2 = BTreeMap::new();
        fields2.insert("A".to_string(), FieldValue::from(1));
        fields2.insert("B".to_string(), FieldValue::from(2));
        fields2.insert("timestamp".to_string(), FieldValue::from(0.0));
        let m2 = Message::from_map(&d, fields2).unwrap();
        assert_eq!(m2.timestamp(), 0.0);
    }

    #[test]
    fn decode_of_encode_round_trips() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "RoundTrip", &["a"]);
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldValue::from(1));
        let original = Message::from_map(&d, fields).unwrap();

        let bytes = crate::codec::encode(original.fields()).unwrap();
        let decoded = Message::from_bytes(&d, &bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn from_map_with_an_embedded_name_does_not_error() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "Embedded", &[]);
        let mut fields = BTreeMap::new();
        fields.insert(RESERVED_NAME.to_string(), FieldValue::from("Embedded"));
        let m = Message::from_map(&d, fields).unwrap();
        assert_eq!(m.name(), "Embedded");
    }

    #[test]
    fn name_is_read_only() {
        let registry = Registry::new();
        let d = test_descriptor(&registry, "RO", &[]);
        let mut m = Message::empty(&d);
        let mut update = BTreeMap::new();
        update.insert("name".to_string(), FieldValue::from("other"));
        let err = m.update(update).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
