//! Ambient structured logging, shared by the `bin/` front-ends.
//!
//! Mirrors `hdds-recording`'s bins (`src/bin/record.rs`, `replay.rs`): a
//! `tracing_subscriber::fmt` layer with a level parsed from a CLI flag,
//! falling back to `RUST_LOG` via `EnvFilter` when set.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. `default_level` is used when
/// `RUST_LOG` is unset; a malformed `default_level` falls back to `info`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
