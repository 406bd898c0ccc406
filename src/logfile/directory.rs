//! DirectoryReader: K-way time-ordered merge across per-type logs sharing a
//! session (spec §4.I).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logfile::reader::{DecodeMode, LogReader, LogRecord};

struct Source {
    reader: LogReader,
    candidate: Option<LogRecord>,
}

/// Scans a directory for `.log` files, groups them by split prefix, and
/// merges their record streams in non-decreasing `elapsed_time` order.
pub struct DirectoryReader {
    sources: Vec<Source>,
    created: Option<String>,
}

/// Strip a trailing `_NNN` split suffix (if present) from a log file's stem.
fn split_prefix(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let base = match stem.rfind('_') {
        Some(idx) if stem.len() - idx == 4 && stem[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &stem[..idx],
        _ => stem,
    };
    Some(path.with_file_name(base))
}

impl DirectoryReader {
    /// `ignore_raw`: files whose header declares no type are skipped when
    /// `true` (the default per spec), fatal otherwise.
    pub fn open(dir: impl AsRef<Path>, ignore_raw: bool) -> Result<DirectoryReader> {
        let dir = dir.as_ref();
        let mut prefixes: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            if let Some(prefix) = split_prefix(&path) {
                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }
        prefixes.sort();

        let mut sources = Vec::new();
        let mut created: Option<String> = None;

        for prefix in prefixes {
            let single_path = prefix.with_extension("log");
            let reader = if single_path.exists() {
                LogReader::open_file(single_path, None, None, DecodeMode::Header)?
            } else {
                LogReader::open_prefix(prefix, None, None, DecodeMode::Header)?
            };

            if reader.header().declared_type.is_none() {
                if ignore_raw {
                    continue;
                }
                return Err(Error::Format(format!(
                    "DirectoryReader: '{}' declares no type and ignore_raw=false",
                    prefix.display()
                )));
            }

            match (&created, &reader.header().created) {
                (None, c) => created = c.clone(),
                (Some(expected), c) if c.as_ref() == Some(expected) => {}
                (Some(expected), c) => {
                    return Err(Error::Format(format!(
                        "DirectoryReader: header 'created' mismatch: expected '{expected}', got '{c:?}'"
                    )));
                }
            }

            sources.push(Source { reader, candidate: None });
        }

        let mut directory_reader = DirectoryReader { sources, created };
        directory_reader.refill_all()?;
        Ok(directory_reader)
    }

    fn refill_all(&mut self) -> Result<()> {
        for source in &mut self.sources {
            if source.candidate.is_none() {
                source.candidate = source.reader.read()?;
            }
        }
        Ok(())
    }

    /// Pick the candidate with minimum `elapsed_time`; ties broken by
    /// stable source index. Returns `None` when all candidates are
    /// exhausted.
    pub fn read(&mut self) -> Result<Option<LogRecord>> {
        let mut best: Option<usize> = None;
        for (i, source) in self.sources.iter().enumerate() {
            if let Some(candidate) = &source.candidate {
                let replace = match best {
                    None => true,
                    Some(b) => candidate.elapsed_time < self.sources[b].candidate.as_ref().unwrap().elapsed_time,
                };
                if replace {
                    best = Some(i);
                }
            }
        }
        let Some(best) = best else {
            return Ok(None);
        };
        let record = self.sources[best].candidate.take();
        self.sources[best].candidate = self.sources[best].reader.read()?;
        Ok(record)
    }

    /// Reset each source and refill all candidates.
    pub fn reset(&mut self) -> Result<()> {
        for source in &mut self.sources {
            source.reader.reset()?;
            source.candidate = None;
        }
        self.refill_all()
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    /// Drain a fresh merge of `dir` and return a per-topic record count.
    /// Supplements the spec (grounded on `mcl/logging/tools.py`) without
    /// adding a new merge concept.
    pub fn topic_summary(dir: impl AsRef<Path>, ignore_raw: bool) -> Result<BTreeMap<String, usize>> {
        let mut reader = DirectoryReader::open(dir, ignore_raw)?;
        let mut counts = BTreeMap::new();
        while let Some(record) = reader.read()? {
            *counts.entry(record.topic).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::writer::LogWriter;
    use tempfile::tempdir;

    #[test]
    fn merges_two_types_in_time_order() {
        let dir = tempdir().unwrap();

        let wa = LogWriter::new(dir.path().join("A"), Some("A".into()), None, Some(0.0), None, None).unwrap();
        for i in 1..=9 {
            wa.write("", b"\x00", Some(i as f64 * 0.01)).unwrap();
        }
        wa.close();

        let wb = LogWriter::new(dir.path().join("B"), Some("B".into()), None, Some(0.0), None, None).unwrap();
        for i in 1..=9 {
            wb.write("", b"\x00", Some(i as f64 * 0.1)).unwrap();
        }
        wb.close();

        let mut reader = DirectoryReader::open(dir.path(), true).unwrap();
        let mut times = Vec::new();
        while let Some(r) = reader.read().unwrap() {
            times.push(r.elapsed_time);
        }
        assert_eq!(times.len(), 18);
        for pair in times.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn raw_files_ignored_by_default() {
        let dir = tempdir().unwrap();
        let w = LogWriter::new(dir.path().join("Raw"), None, None, Some(0.0), None, None).unwrap();
        w.write("", b"\x00", Some(0.01)).unwrap();
        w.close();

        let mut reader = DirectoryReader::open(dir.path(), true).unwrap();
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn raw_files_are_fatal_when_not_ignored() {
        let dir = tempdir().unwrap();
        let w = LogWriter::new(dir.path().join("Raw"), None, None, Some(0.0), None, None).unwrap();
        w.write("", b"\x00", Some(0.01)).unwrap();
        w.close();

        assert!(DirectoryReader::open(dir.path(), false).is_err());
    }
}
