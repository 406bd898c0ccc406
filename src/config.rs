//! Network and simulation configuration file parsing (spec §6).
//!
//! Both formats are line-oriented, `#`-comment, `name = value` text — the
//! teacher's own `hdds/src/config.rs` hand-rolls its parsing rather than
//! pulling in an external config crate for a small bespoke format; we follow
//! that precedent here.

use std::path::Path;

use crate::error::{Error, Result};
use crate::transport::connection::Connection;

/// A parsed network configuration file: the declared interface kind plus
/// one [`Connection`] per descriptor line.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub interface: String,
    pub connections: Vec<Connection>,
}

/// A parsed simulation configuration file: one `(rate_hz, size_bytes)` entry
/// per declared message type name.
#[derive(Debug, Clone)]
pub struct SimulationEntry {
    pub message_name: String,
    pub rate_hz: f64,
    pub size_bytes: usize,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Split a `name = value` line; returns `None` for blank/comment-only lines.
fn split_assignment(line: &str) -> Result<Option<(&str, &str)>> {
    let content = strip_comment(line).trim();
    if content.is_empty() {
        return Ok(None);
    }
    let (key, value) = content
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("expected 'name = value', got '{content}'")))?;
    Ok(Some((key.trim(), value.trim())))
}

/// Parse a network configuration file: an `Interface = udp` line followed by
/// one `group:port:topics:message` descriptor per line, each parsed via
/// [`Connection::from_string_repr`]. Only the `Interface` line uses `name =
/// value`; descriptor lines have no `=` and are passed through as-is.
pub fn parse_network_config(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut interface: Option<String> = None;
    let mut connections = Vec::new();

    for line in text.lines() {
        let content = strip_comment(line).trim();
        if content.is_empty() {
            continue;
        }
        if let Some((key, value)) = content.split_once('=') {
            if key.trim().eq_ignore_ascii_case("interface") {
                if interface.is_some() {
                    return Err(Error::Config("network config: 'Interface' declared twice".into()));
                }
                interface = Some(value.trim().to_string());
                continue;
            }
        }
        connections.push(Connection::from_string_repr(content)?);
    }

    let interface = interface.ok_or_else(|| Error::Config("network config: missing 'Interface' line".into()))?;
    Ok(NetworkConfig { interface, connections })
}

/// Parse a simulation configuration file: `<MessageName> = <rate_hz>, <size_bytes>` pairs.
pub fn parse_simulation_config(path: impl AsRef<Path>) -> Result<Vec<SimulationEntry>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in text.lines() {
        let Some((name, value)) = split_assignment(line)? else {
            continue;
        };
        let (rate_str, size_str) = value
            .split_once(',')
            .ok_or_else(|| Error::Config(format!("simulation config: expected 'rate, size', got '{value}'")))?;
        let rate_hz: f64 = rate_str
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("simulation config: invalid rate '{rate_str}': {e}")))?;
        let size_bytes: usize = size_str
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("simulation config: invalid size '{size_str}': {e}")))?;
        entries.push(SimulationEntry {
            message_name: name.to_string(),
            rate_hz,
            size_bytes,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        use std::io::Write;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_network_config() {
        let f = write_temp(
            "# a comment\nInterface = udp\nff15::1:26000::\nff15::2:27000:bulk:\n",
        );
        let config = parse_network_config(f.path()).unwrap();
        assert_eq!(config.interface, "udp");
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[1].port, 27000);
    }

    #[test]
    fn rejects_missing_interface() {
        let f = write_temp("ff15::1:26000::\n");
        assert!(parse_network_config(f.path()).is_err());
    }

    #[test]
    fn parses_simulation_config() {
        let f = write_temp("# rates\nTelemetry = 10, 128\nHeartbeat = 1.5, 16\n");
        let entries = parse_simulation_config(f.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message_name, "Telemetry");
        assert_eq!(entries[0].rate_hz, 10.0);
        assert_eq!(entries[0].size_bytes, 128);
        assert_eq!(entries[1].rate_hz, 1.5);
    }

    #[test]
    fn rejects_malformed_simulation_line() {
        let f = write_temp("Telemetry = 10\n");
        assert!(parse_simulation_config(f.path()).is_err());
    }
}
