//! LogReader: parse the header, iterate records, honour time filters, span
//! split files (spec §4.H).

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec;
use crate::error::{Error, Result};
use crate::logfile::header::{self, HeaderInfo};
use crate::message::descriptor::{MessageDescriptor, Registry};
use crate::message::instance::Message;

/// Where a record's payload bytes should be decoded to.
#[derive(Clone)]
pub enum DecodeMode {
    /// Leave the payload as raw bytes.
    Raw,
    /// Decode using the type the header declares (looked up in the global
    /// registry); raw if the header declares none.
    Header,
    /// Always decode as this descriptor, ignoring the header's declaration.
    Forced(Arc<MessageDescriptor>),
}

#[derive(Debug, Clone)]
pub enum Payload {
    Raw(Vec<u8>),
    Message(Message),
}

/// One parsed record: elapsed time, topic, and decoded payload.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub elapsed_time: f64,
    pub topic: String,
    pub payload: Payload,
}

enum Source {
    File(PathBuf),
    Prefix(PathBuf),
}

struct OpenFile {
    reader: BufReader<File>,
}

pub struct LogReader {
    source: Source,
    split_index: u32,
    min_time: Option<f64>,
    max_time: Option<f64>,
    decode: DecodeMode,
    current: OpenFile,
    header: HeaderInfo,
    lookahead: Option<LogRecord>,
    exhausted: bool,
}

fn path_for(source: &Source, split_index: u32) -> PathBuf {
    match source {
        Source::File(p) => p.clone(),
        Source::Prefix(prefix) => {
            let mut s = prefix.as_os_str().to_owned();
            s.push(format!("_{split_index:03}.log"));
            PathBuf::from(s)
        }
    }
}

fn parse_record_line(line: &str) -> Result<(f64, String, Vec<u8>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(Error::Format("log record: empty line".into()));
    }
    let first_quote = trimmed
        .find('\'')
        .ok_or_else(|| Error::Format(format!("log record: missing quoted topic in '{trimmed}'")))?;
    let time_field = trimmed[..first_quote].trim();
    let elapsed: f64 = time_field
        .parse()
        .map_err(|e| Error::Format(format!("log record: invalid elapsed time '{time_field}': {e}")))?;

    let rest = &trimmed[first_quote + 1..];
    let second_quote = rest
        .find('\'')
        .ok_or_else(|| Error::Format(format!("log record: unterminated quoted topic in '{trimmed}'")))?;
    let topic = rest[..second_quote].to_string();
    let hex = rest[second_quote + 1..].trim();
    let payload = codec::from_hex(hex)?;
    Ok((elapsed, topic, payload))
}

impl LogReader {
    pub fn open_file(
        path: impl Into<PathBuf>,
        min_time: Option<f64>,
        max_time: Option<f64>,
        decode: DecodeMode,
    ) -> Result<LogReader> {
        Self::open(Source::File(path.into()), min_time, max_time, decode)
    }

    /// Split mode: `<prefix>_000.log` must exist.
    pub fn open_prefix(
        prefix: impl Into<PathBuf>,
        min_time: Option<f64>,
        max_time: Option<f64>,
        decode: DecodeMode,
    ) -> Result<LogReader> {
        Self::open(Source::Prefix(prefix.into()), min_time, max_time, decode)
    }

    fn open(source: Source, min_time: Option<f64>, max_time: Option<f64>, decode: DecodeMode) -> Result<LogReader> {
        if let (Some(min), Some(max)) = (min_time, max_time) {
            if min > max {
                return Err(Error::Config(format!("min_time {min} > max_time {max}")));
            }
        }
        let path = path_for(&source, 0);
        let file = File::open(&path).map_err(|e| Error::Config(format!("cannot open '{}': {e}", path.display())))?;
        let mut reader = BufReader::new(file);
        let header = header::parse_header(&mut reader)?;

        let mut log_reader = LogReader {
            source,
            split_index: 0,
            min_time,
            max_time,
            decode,
            current: OpenFile { reader },
            header,
            lookahead: None,
            exhausted: false,
        };
        log_reader.fill_lookahead()?;
        Ok(log_reader)
    }

    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    fn decode_payload(&self, raw: Vec<u8>) -> Result<Payload> {
        let descriptor: Option<Arc<MessageDescriptor>> = match &self.decode {
            DecodeMode::Raw => None,
            DecodeMode::Forced(d) => Some(d.clone()),
            DecodeMode::Header => self
                .header
                .declared_type
                .as_ref()
                .and_then(|name| Registry::global().get(name)),
        };
        match descriptor {
            Some(d) => Ok(Payload::Message(Message::from_bytes(&d, &raw)?)),
            None => Ok(Payload::Raw(raw)),
        }
    }

    /// Advance through the current (and subsequent split) files until a
    /// record within `[min_time, max_time]` is found, EOF is permanently
    /// reached, or a parse error occurs (surfaced once, per spec §7).
    fn fill_lookahead(&mut self) -> Result<()> {
        loop {
            let mut line = String::new();
            let n = self.current.reader.read_line(&mut line)?;
            if n == 0 {
                if let Source::Prefix(prefix) = &self.source {
                    let next_index = self.split_index + 1;
                    let next_path = path_for(&Source::Prefix(prefix.clone()), next_index);
                    if let Ok(file) = File::open(&next_path) {
                        self.split_index = next_index;
                        self.current = OpenFile {
                            reader: BufReader::new(file),
                        };
                        continue;
                    }
                }
                self.lookahead = None;
                self.exhausted = true;
                return Ok(());
            }

            let (elapsed, topic, raw) = parse_record_line(&line)?;
            if let Some(min) = self.min_time {
                if elapsed < min {
                    continue;
                }
            }
            if let Some(max) = self.max_time {
                if elapsed > max {
                    self.lookahead = None;
                    self.exhausted = true;
                    return Ok(());
                }
            }
            let payload = self.decode_payload(raw)?;
            self.lookahead = Some(LogRecord {
                elapsed_time: elapsed,
                topic,
                payload,
            });
            return Ok(());
        }
    }

    pub fn is_data_pending(&self) -> bool {
        self.lookahead.is_some()
    }

    /// Return the held-ahead record and advance. Never blocks on filesystem
    /// work beyond what [`LogReader::is_data_pending`] already guarantees.
    pub fn read(&mut self) -> Result<Option<LogRecord>> {
        if self.lookahead.is_none() {
            return Ok(None);
        }
        let record = self.lookahead.take();
        self.fill_lookahead()?;
        Ok(record)
    }

    /// Seek back to the start of data in split file 000 and re-parse the
    /// look-ahead.
    pub fn reset(&mut self) -> Result<()> {
        let path = path_for(&self.source, 0);
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.header.start_of_data))?;
        self.current = OpenFile { reader };
        self.split_index = 0;
        self.exhausted = false;
        self.fill_lookahead()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::writer::LogWriter;
    use tempfile::tempdir;

    #[test]
    fn reads_records_in_order() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("s");
        let writer = LogWriter::new(prefix.clone(), None, None, Some(0.0), None, None).unwrap();
        writer.write("a", b"\x01", Some(0.1)).unwrap();
        writer.write("b", b"\x02", Some(0.2)).unwrap();
        writer.close();

        let mut reader = LogReader::open_file(dir.path().join("s.log"), None, None, DecodeMode::Raw).unwrap();
        assert!(reader.is_data_pending());
        let r1 = reader.read().unwrap().unwrap();
        assert_eq!(r1.topic, "a");
        let r2 = reader.read().unwrap().unwrap();
        assert_eq!(r2.topic, "b");
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn time_filter_skips_and_terminates() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("s");
        let writer = LogWriter::new(prefix.clone(), None, None, Some(0.0), None, None).unwrap();
        for i in 0..5 {
            writer.write("t", b"\x00", Some(i as f64 * 0.1)).unwrap();
        }
        writer.close();

        let mut reader =
            LogReader::open_file(dir.path().join("s.log"), Some(0.15), Some(0.25), DecodeMode::Raw).unwrap();
        let mut seen = Vec::new();
        while let Some(r) = reader.read().unwrap() {
            seen.push(r.elapsed_time);
        }
        assert_eq!(seen.len(), 1);
        assert!((seen[0] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn spans_split_files() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("s");
        let writer = LogWriter::new(prefix.clone(), None, None, Some(0.0), Some(2), None).unwrap();
        for i in 0..3 {
            writer.write("t", b"\x00", Some(i as f64 * 0.1)).unwrap();
        }
        writer.close();

        let mut reader = LogReader::open_prefix(prefix, None, None, DecodeMode::Raw).unwrap();
        let mut count = 0;
        while reader.read().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
