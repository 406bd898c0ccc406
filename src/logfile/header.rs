//! Shared header block format used by both [`crate::logfile::writer::LogWriter`]
//! and [`crate::logfile::reader::LogReader`] (spec §4.G).
//!
//! Exact field names/markers (`MCL_LOG`, `-- version`, `>>>`) are grounded on
//! `mcl/logging/file.py` (original_source).

use std::io::{BufRead, Write};

use crate::error::{Error, Result};

pub const VERSION: &str = "1.0";
const RULER: &str = "#----------------------------------------------------------------------";

/// Parsed header fields plus the byte offset at which record data begins.
#[derive(Debug, Clone, Default)]
pub struct HeaderInfo {
    pub start_of_data: u64,
    pub revision: Option<String>,
    pub created: Option<String>,
    pub declared_type: Option<String>,
}

/// Write the full header block for a freshly created log file.
pub fn write_header<W: Write>(out: &mut W, revision: &Option<String>, created: &Option<f64>, declared_type: &Option<String>) -> Result<()> {
    let revision_field = revision.clone().unwrap_or_default();
    let created_field = created.map(|t| format!("{t:.5}")).unwrap_or_else(|| "None".to_string());
    let type_field = declared_type.clone().unwrap_or_else(|| "None".to_string());

    writeln!(out, "{RULER}")?;
    writeln!(out, "# MCL_LOG")?;
    writeln!(out, "#     -- version     {VERSION}")?;
    writeln!(out, "#     -- revision    {revision_field}")?;
    writeln!(out, "#     -- created     {created_field}")?;
    writeln!(out, "#")?;
    writeln!(out, "# Each line of this file records a packet transmitted on the network.")?;
    writeln!(out, "#")?;
    writeln!(out, "# The following data type was recorded in this file:")?;
    writeln!(out, "#")?;
    writeln!(out, "#      >>> {type_field}")?;
    writeln!(out, "#")?;
    writeln!(out, "#    <Time>     <Topic>     <Payload>")?;
    writeln!(out, "{RULER}")?;
    Ok(())
}

/// Parse the header block from the start of `reader`. If the first byte is
/// not `#`, the header is absent (valid for a partial split file): returns a
/// default `HeaderInfo` with `start_of_data: 0` and nothing consumed.
pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<HeaderInfo> {
    let starts_with_hash = matches!(reader.fill_buf()?.first(), Some(b'#'));
    if !starts_with_hash {
        return Ok(HeaderInfo::default());
    }

    let mut pos: u64 = 0;
    let mut read_line = |reader: &mut R| -> Result<String> {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(Error::Format("log header: unexpected end of file".into()));
        }
        pos += n as u64;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    };

    let expect_ruler = |line: &str| -> Result<()> {
        if line != RULER {
            return Err(Error::Format(format!("log header: expected ruler, got '{line}'")));
        }
        Ok(())
    };
    let expect_prefix = |line: &str, prefix: &str| -> Result<String> {
        line.strip_prefix(prefix)
            .map(|rest| rest.trim().to_string())
            .ok_or_else(|| Error::Format(format!("log header: expected line starting with '{prefix}', got '{line}'")))
    };

    expect_ruler(&read_line(reader)?)?;
    let marker = read_line(reader)?;
    if marker != "# MCL_LOG" {
        return Err(Error::Format(format!("log header: expected '# MCL_LOG', got '{marker}'")));
    }
    expect_prefix(&read_line(reader)?, "#     -- version")?;
    let revision = expect_prefix(&read_line(reader)?, "#     -- revision")?;
    let created = expect_prefix(&read_line(reader)?, "#     -- created")?;
    expect_prefix(&read_line(reader)?, "#")?;
    expect_prefix(&read_line(reader)?, "# Each line")?;
    expect_prefix(&read_line(reader)?, "#")?;
    expect_prefix(&read_line(reader)?, "# The following")?;
    expect_prefix(&read_line(reader)?, "#")?;
    let declared_type = expect_prefix(&read_line(reader)?, "#      >>>")?;
    expect_prefix(&read_line(reader)?, "#")?;
    expect_prefix(&read_line(reader)?, "#    <Time>")?;
    expect_ruler(&read_line(reader)?)?;

    Ok(HeaderInfo {
        start_of_data: pos,
        revision: if revision.is_empty() { None } else { Some(revision) },
        created: if created == "None" { None } else { Some(created) },
        declared_type: if declared_type == "None" { None } else { Some(declared_type) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_header_fields() {
        let mut buf = Vec::new();
        write_header(&mut buf, &Some("r1".to_string()), &Some(100.5), &Some("Foo".to_string())).unwrap();
        let mut cur = Cursor::new(buf);
        let info = parse_header(&mut cur).unwrap();
        assert_eq!(info.revision.as_deref(), Some("r1"));
        assert_eq!(info.created.as_deref(), Some("100.50000"));
        assert_eq!(info.declared_type.as_deref(), Some("Foo"));
        assert!(info.start_of_data > 0);
    }

    #[test]
    fn absent_fields_render_as_none_or_empty() {
        let mut buf = Vec::new();
        write_header(&mut buf, &None, &None, &None).unwrap();
        let mut cur = Cursor::new(buf);
        let info = parse_header(&mut cur).unwrap();
        assert!(info.revision.is_none());
        assert!(info.created.is_none());
        assert!(info.declared_type.is_none());
    }

    #[test]
    fn missing_header_is_valid() {
        let mut cur = Cursor::new(b"   0.1    'x'    0a\n".to_vec());
        let info = parse_header(&mut cur).unwrap();
        assert_eq!(info.start_of_data, 0);
    }
}
