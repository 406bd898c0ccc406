//! Message type descriptors and the process-wide registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::transport::connection::Connection;

/// Keys no message field may use: two are reserved on [`crate::message::instance::Message`]
/// itself (`name`, `timestamp`), two name attributes of the descriptor
/// (`mandatory`, `connection`) that a naive map-based implementation could
/// otherwise collide with.
const RESERVED_FIELD_NAMES: &[&str] = &["mandatory", "connection", "name", "timestamp"];

/// A unique name, an ordered tuple of mandatory field names, and the
/// [`Connection`] this message type is bound to. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    pub name: String,
    pub mandatory: Vec<String>,
    pub connection: Connection,
}

/// Process-wide table of declared message types.
///
/// Consulted on every encode/decode (see `crate::codec`) and by
/// `Connection::message` lookups. Lazily populated by explicit
/// [`Registry::register`] calls; never mutated after startup except by an
/// explicit [`Registry::remove`].
#[derive(Default)]
pub struct Registry {
    by_name: RwLock<HashMap<String, Arc<MessageDescriptor>>>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new() -> Registry {
        Registry {
            by_name: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry, lazily created on first access.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Register a new message type. Fails if `name` is already registered,
    /// if any mandatory field name is reserved or duplicated, or if another
    /// descriptor is already bound to an equal `connection`.
    pub fn register(
        &self,
        name: impl Into<String>,
        mandatory: Vec<String>,
        connection: Connection,
    ) -> Result<Arc<MessageDescriptor>> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("message type name cannot be empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for field in &mandatory {
            if RESERVED_FIELD_NAMES.contains(&field.as_str()) {
                return Err(Error::Config(format!(
                    "mandatory field '{field}' collides with a reserved name"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(Error::Config(format!("mandatory field '{field}' declared twice")));
            }
        }

        let mut guard = self.by_name.write();
        if guard.contains_key(&name) {
            return Err(Error::Config(format!("message type '{name}' already registered")));
        }
        for existing in guard.values() {
            if existing.connection == connection {
                return Err(Error::Config(format!(
                    "connection already bound to message type '{}'",
                    existing.name
                )));
            }
        }

        let descriptor = Arc::new(MessageDescriptor {
            name: name.clone(),
            mandatory,
            connection,
        });
        guard.insert(name, descriptor.clone());
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<MessageDescriptor>> {
        self.by_name.read().get(name).cloned()
    }

    /// Remove a descriptor, freeing its name and connection for reuse.
    /// Returns whether an entry was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.by_name.write().remove(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(group: &str) -> Connection {
        Connection::new(group.to_string(), None, None, None).unwrap()
    }

    #[test]
    fn duplicate_name_rejected() {
        let reg = Registry::new();
        reg.register("Foo", vec![], conn("ff15::1")).unwrap();
        let err = reg.register("Foo", vec![], conn("ff15::2")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn duplicate_connection_rejected() {
        let reg = Registry::new();
        reg.register("Foo", vec![], conn("ff15::1")).unwrap();
        let err = reg.register("Bar", vec![], conn("ff15::1")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn reserved_mandatory_field_rejected() {
        let reg = Registry::new();
        let err = reg
            .register("Foo", vec!["timestamp".to_string()], conn("ff15::3"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn remove_frees_name_and_connection() {
        let reg = Registry::new();
        reg.register("Foo", vec![], conn("ff15::4")).unwrap();
        assert!(reg.remove("Foo"));
        reg.register("Foo", vec![], conn("ff15::4")).unwrap();
    }
}
