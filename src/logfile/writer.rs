//! LogWriter: rotating, self-describing log files (spec §4.G).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;

use tracing::{debug, error};

use crate::codec;
use crate::error::{LogError, Result};
use crate::logfile::header;

struct OpenFile {
    file: File,
    tmp_path: PathBuf,
    log_path: PathBuf,
    entries_in_file: u32,
    file_start_time: f64,
}

struct WriterState {
    open_file: Option<OpenFile>,
    file_index: u32,
    time_origin: Option<f64>,
    closed: bool,
}

/// Appends time-prefixed, topic-tagged, hex-encoded records to rotating
/// files under a filesystem prefix.
pub struct LogWriter {
    prefix: PathBuf,
    revision: Option<String>,
    declared_type: Option<String>,
    max_entries: Option<u32>,
    max_time: Option<f64>,
    indexed: bool,
    state: Mutex<WriterState>,
}

fn candidate_path(prefix: &Path, indexed: bool, index: u32, ext: &str) -> PathBuf {
    if indexed {
        let mut s = prefix.as_os_str().to_owned();
        s.push(format!("_{index:03}.{ext}"));
        PathBuf::from(s)
    } else {
        let mut s = prefix.as_os_str().to_owned();
        s.push(format!(".{ext}"));
        PathBuf::from(s)
    }
}

impl LogWriter {
    /// `prefix` must not already carry a `.tmp`/`.log` extension, its parent
    /// directory must exist, and the first candidate file must not already
    /// exist. No file is created until the first [`LogWriter::write`].
    pub fn new(
        prefix: impl Into<PathBuf>,
        declared_type: Option<String>,
        revision: Option<String>,
        time_origin: Option<f64>,
        max_entries: Option<u32>,
        max_time: Option<f64>,
    ) -> Result<LogWriter> {
        let prefix = prefix.into();
        if let Some(ext) = prefix.extension().and_then(|e| e.to_str()) {
            if ext == "tmp" || ext == "log" {
                return Err(LogError::Config(format!(
                    "prefix '{}' must not already carry a .tmp/.log extension",
                    prefix.display()
                ))
                .into());
            }
        }
        if let Some(parent) = prefix.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(LogError::Config(format!(
                    "parent directory '{}' does not exist",
                    parent.display()
                ))
                .into());
            }
        }
        if let Some(me) = max_entries {
            if me == 0 {
                return Err(LogError::Config("max_entries must be >= 1".into()).into());
            }
        }
        if let Some(mt) = max_time {
            if mt <= 0.0 {
                return Err(LogError::Config("max_time must be > 0".into()).into());
            }
        }

        let indexed = max_entries.is_some() || max_time.is_some();
        let first_tmp = candidate_path(&prefix, indexed, 0, "tmp");
        let first_log = candidate_path(&prefix, indexed, 0, "log");
        if first_tmp.exists() {
            return Err(LogError::AlreadyExists(first_tmp).into());
        }
        if first_log.exists() {
            return Err(LogError::AlreadyExists(first_log).into());
        }

        Ok(LogWriter {
            prefix,
            revision,
            declared_type,
            max_entries,
            max_time,
            indexed,
            state: Mutex::new(WriterState {
                open_file: None,
                file_index: 0,
                time_origin,
                closed: false,
            }),
        })
    }

    fn open_new_file(&self, state: &mut WriterState, time_received: f64) -> Result<()> {
        let tmp_path = candidate_path(&self.prefix, self.indexed, state.file_index, "tmp");
        let log_path = candidate_path(&self.prefix, self.indexed, state.file_index, "log");
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
        // Only the first split carries the header block; later splits are
        // headerless continuations (spec §4.H), matching the original's
        // `__header` flag which is set once and never reset.
        if state.file_index == 0 {
            header::write_header(
                &mut file,
                &self.revision,
                &state.time_origin,
                &self.declared_type,
            )?;
        }
        debug!(path = %tmp_path.display(), "LogWriter: opened new file");
        state.open_file = Some(OpenFile {
            file,
            tmp_path,
            log_path,
            entries_in_file: 0,
            file_start_time: time_received,
        });
        Ok(())
    }

    /// Close the current file, renaming `.tmp` to `.log`. Rename is
    /// attempted twice; a second failure is logged and the file remains as
    /// `.tmp` (data preserved, extension not promoted) — spec §7.
    fn close_current_file(&self, state: &mut WriterState) {
        let Some(open) = state.open_file.take() else {
            return;
        };
        if let Err(e) = open.file.sync_all() {
            error!(error = %e, "LogWriter: failed to flush before rename");
        }
        drop(open.file);

        if fs::rename(&open.tmp_path, &open.log_path).is_ok() {
            debug!(path = %open.log_path.display(), "LogWriter: rotated file");
            return;
        }
        // Retry once before downgrading.
        if fs::rename(&open.tmp_path, &open.log_path).is_ok() {
            debug!(path = %open.log_path.display(), "LogWriter: rotated file on retry");
            return;
        }
        error!(
            path = %open.tmp_path.display(),
            "LogWriter: rename to .log failed twice; data preserved, extension not promoted"
        );
    }

    /// Append one record. Creates the current file lazily on the first call.
    pub fn write(&self, topic: &str, payload: &[u8], time_received: Option<f64>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(crate::error::Error::State("write on a closed LogWriter".into()));
        }
        let time_received = time_received.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64()
        });
        if state.time_origin.is_none() {
            state.time_origin = Some(time_received);
        }

        if state.open_file.is_none() {
            self.open_new_file(&mut state, time_received)?;
        } else {
            let mut rotate = false;
            if let Some(max_entries) = self.max_entries {
                let entries = state.open_file.as_ref().unwrap().entries_in_file;
                if entries + 1 > max_entries {
                    rotate = true;
                }
            }
            if let Some(max_time) = self.max_time {
                let start = state.open_file.as_ref().unwrap().file_start_time;
                if (time_received - start) >= max_time {
                    rotate = true;
                }
            }
            if rotate {
                self.close_current_file(&mut state);
                state.file_index += 1;
                self.open_new_file(&mut state, time_received)?;
            }
        }

        let elapsed = time_received - state.time_origin.expect("time origin set above");
        let hex = codec::to_hex(payload);
        let line = format!("{elapsed:12.5}    '{topic:<8}'    {hex}\n");

        let open = state.open_file.as_mut().expect("file opened above");
        open.file.write_all(line.as_bytes())?;
        open.entries_in_file += 1;
        Ok(())
    }

    /// Idempotent: closing an already-closed writer (or one that never
    /// wrote) is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        self.close_current_file(&mut state);
        state.closed = true;
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn single_file_mode_when_no_limits() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        let writer = LogWriter::new(prefix.clone(), Some("Foo".to_string()), None, Some(0.0), None, None).unwrap();
        writer.write("t", b"\x01\x02", Some(0.1)).unwrap();
        writer.close();
        assert!(dir.path().join("session.log").exists());
        assert!(!dir.path().join("session.tmp").exists());
    }

    #[test]
    fn rotates_by_entries() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        let writer = LogWriter::new(prefix.clone(), None, None, Some(0.0), Some(2), None).unwrap();
        for i in 0..3 {
            writer.write("t", b"x", Some(i as f64 * 0.1)).unwrap();
        }
        writer.close();
        assert!(dir.path().join("session_000.log").exists());
        assert!(dir.path().join("session_001.log").exists());
        assert!(!dir.path().join("session_002.log").exists());
    }

    #[test]
    fn only_the_first_split_carries_a_header() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        let writer = LogWriter::new(prefix.clone(), None, None, Some(0.0), Some(2), None).unwrap();
        for i in 0..3 {
            writer.write("t", b"x", Some(i as f64 * 0.1)).unwrap();
        }
        writer.close();

        let first = fs::read_to_string(dir.path().join("session_000.log")).unwrap();
        assert!(first.starts_with('#'));
        let second = fs::read_to_string(dir.path().join("session_001.log")).unwrap();
        assert!(!second.starts_with('#'));
    }

    #[test]
    fn rejects_preexisting_candidate_file() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        fs::write(dir.path().join("session.log"), "x").unwrap();
        assert!(LogWriter::new(prefix, None, None, None, None, None).is_err());
    }

    #[test]
    fn close_before_any_write_is_a_noop() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        let writer = LogWriter::new(prefix, None, None, None, None, None).unwrap();
        writer.close();
        writer.close();
    }
}
