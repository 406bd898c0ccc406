//! Text-framed, self-describing log file format: rotating writer,
//! split-file-aware reader, and directory-wide K-way merge (spec §4.G–§4.I).

mod header;
pub mod directory;
pub mod reader;
pub mod writer;

pub use directory::DirectoryReader;
pub use reader::{DecodeMode, LogReader, LogRecord, Payload};
pub use writer::LogWriter;
