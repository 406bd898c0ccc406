//! Connection descriptor: an immutable bundle of transport parameters bound
//! to an optional message type (spec §3, §4.B).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::descriptor::{MessageDescriptor, Registry};

pub const DEFAULT_PORT: u16 = 26000;
pub const TOPIC_DELIMITER: char = ',';
const PORT_MIN: u16 = 1024;

/// Topics associated with a connection: unset, one topic, or several.
/// Grounded on `mcl/network/abstract.py::Connection.topics`, which collapses
/// a one-element list back down to a bare string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topics {
    None,
    Single(String),
    List(Vec<String>),
}

impl Topics {
    fn validate(strings: &[String]) -> Result<()> {
        for topic in strings {
            if topic.contains(TOPIC_DELIMITER) {
                return Err(Error::Config(format!(
                    "topic '{topic}' cannot contain the '{TOPIC_DELIMITER}' delimiter"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, topic: &str) -> bool {
        match self {
            Topics::None => true,
            Topics::Single(t) => t == topic,
            Topics::List(list) => list.iter().any(|t| t == topic),
        }
    }

    pub(crate) fn to_csv(&self) -> String {
        match self {
            Topics::None => String::new(),
            Topics::Single(t) => t.clone(),
            Topics::List(list) => list.join(&TOPIC_DELIMITER.to_string()),
        }
    }

    pub(crate) fn from_csv(s: &str) -> Topics {
        if s.is_empty() {
            return Topics::None;
        }
        let parts: Vec<String> = s.split(TOPIC_DELIMITER).map(|p| p.to_string()).collect();
        if parts.len() == 1 {
            Topics::Single(parts.into_iter().next().unwrap())
        } else {
            Topics::List(parts)
        }
    }
}

/// Immutable bundle of transport parameters: multicast group, port, topic
/// filter, and the message type this connection is bound to (if any).
#[derive(Debug, Clone)]
pub struct Connection {
    pub group: String,
    pub port: u16,
    pub topics: Topics,
    pub message: Option<Arc<MessageDescriptor>>,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.to_map() == other.to_map()
    }
}
impl Eq for Connection {}

impl Connection {
    pub fn new(
        group: String,
        port: Option<u16>,
        topics: Option<Topics>,
        message: Option<Arc<MessageDescriptor>>,
    ) -> Result<Connection> {
        if group.is_empty() {
            return Err(Error::Config("connection group cannot be empty".into()));
        }
        let port = port.unwrap_or(DEFAULT_PORT);
        if port < PORT_MIN {
            return Err(Error::Config(format!(
                "port {port} out of range [{PORT_MIN}, 65535]"
            )));
        }
        let topics = topics.unwrap_or(Topics::None);
        match &topics {
            Topics::Single(t) => Topics::validate(std::slice::from_ref(t))?,
            Topics::List(list) => Topics::validate(list)?,
            Topics::None => {}
        }
        Ok(Connection {
            group,
            port,
            topics,
            message,
        })
    }

    /// Serialize to a flat string map for configuration-file round trips.
    /// Equality between connections is defined in terms of this map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("group".to_string(), self.group.clone());
        map.insert("port".to_string(), self.port.to_string());
        map.insert("topics".to_string(), self.topics.to_csv());
        map.insert(
            "message".to_string(),
            self.message.as_ref().map(|m| m.name.clone()).unwrap_or_default(),
        );
        map
    }

    /// Reconstruct a `Connection` from a map produced by [`Connection::to_map`].
    /// A non-empty `message` entry is looked up in the global registry; an
    /// unregistered name is a config error.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Connection> {
        let group = map
            .get("group")
            .cloned()
            .ok_or_else(|| Error::Config("connection map missing 'group'".into()))?;
        let port = map
            .get("port")
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|e| Error::Config(format!("invalid port: {e}")))?;
        let topics = map.get("topics").map(|s| Topics::from_csv(s));
        let message = match map.get("message").map(|s| s.as_str()) {
            Some("") | None => None,
            Some(name) => Some(Registry::global().get(name).ok_or_else(|| {
                Error::Config(format!("message type '{name}' is not registered"))
            })?),
        };
        Connection::new(group, port, topics, message)
    }

    /// `group:port:topics:message`, the network-configuration-file line
    /// format for a single descriptor (spec §6). `topics` is a
    /// comma-joined list; `message` is a registered descriptor name or empty.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.group,
            self.port,
            self.topics.to_csv(),
            self.message.as_ref().map(|m| m.name.clone()).unwrap_or_default()
        )
    }

    pub fn from_string_repr(s: &str) -> Result<Connection> {
        // Split from the right: only port/topics/message are colon-free, so
        // this is the only split direction that survives an IPv6 group
        // address like "ff15::1" with its own embedded colons.
        let mut parts: Vec<&str> = s.rsplitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(Error::Config(format!(
                "expected 'group:port:topics:message', got '{s}'"
            )));
        }
        parts.reverse();
        let mut map = BTreeMap::new();
        map.insert("group".to_string(), parts[0].to_string());
        map.insert("port".to_string(), parts[1].to_string());
        map.insert("topics".to_string(), parts[2].to_string());
        map.insert("message".to_string(), parts[3].to_string());
        Connection::from_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_26000() {
        let c = Connection::new("ff15::1".into(), None, None, None).unwrap();
        assert_eq!(c.port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_port_below_1024() {
        assert!(Connection::new("ff15::1".into(), Some(80), None, None).is_err());
    }

    #[test]
    fn rejects_topic_with_delimiter() {
        let err = Connection::new(
            "ff15::1".into(),
            None,
            Some(Topics::Single("a,b".into())),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn equality_is_by_to_map() {
        let a = Connection::new("ff15::1".into(), Some(26000), None, None).unwrap();
        let b = Connection::new("ff15::1".into(), Some(26000), None, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn string_round_trip() {
        let c = Connection::new(
            "ff15::1".into(),
            Some(27000),
            Some(Topics::List(vec!["a".into(), "b".into()])),
            None,
        )
        .unwrap();
        let s = c.to_string_repr();
        let back = Connection::from_string_repr(&s).unwrap();
        assert_eq!(c, back);
    }
}
