//! network_dump - Record one multicast connection's traffic to a log session
//! directory.
//!
//! Usage:
//!   network_dump --group ff15::1 --port 26000 --output-root ./recordings
//!   network_dump --group ff15::1 --topics telemetry,status --max-entries 5000
//!   network_dump --group ff15::1 --type Telemetry   # decodable by network_replay

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use meshcast::logfile::LogWriter;
use meshcast::message::Registry;
use meshcast::transport::{Connection, RawListener, Topics};

#[derive(Parser, Debug)]
#[command(name = "network_dump")]
#[command(about = "Record one multicast connection's traffic to a log session directory")]
#[command(version)]
struct Args {
    /// IPv6 multicast group address
    #[arg(short, long)]
    group: String,

    /// UDP port (default 26000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Comma-separated topic allowlist; omit to accept every topic
    #[arg(short, long)]
    topics: Option<String>,

    /// Registered message type name this connection carries; declared in the
    /// session's header so `network_replay` can decode it back. Omit to
    /// record raw, undecodable traffic.
    #[arg(short = 'm', long = "type")]
    message_type: Option<String>,

    /// Directory under which a timestamped session directory is created
    #[arg(short, long, default_value = ".")]
    output_root: PathBuf,

    /// Rotate after this many records
    #[arg(long)]
    max_entries: Option<u32>,

    /// Rotate after this many seconds of session time
    #[arg(long)]
    max_time: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn session_dir_name() -> String {
    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
    format!("{stamp}_{host}")
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    if meshcast::transport::run_worker_if_requested(&argv)? {
        return Ok(());
    }

    let args = Args::parse();
    meshcast::logging::init_tracing(&args.log_level);

    let topics = match &args.topics {
        Some(csv) => Topics::List(csv.split(',').map(|s| s.trim().to_string()).collect()),
        None => Topics::None,
    };
    let connection = Connection::new(args.group.clone(), args.port, Some(topics), None)?;

    let declared_type = match &args.message_type {
        Some(name) => {
            if Registry::global().get(name).is_none() {
                anyhow::bail!("message type '{name}' is not registered");
            }
            Some(name.clone())
        }
        None => None,
    };

    let session_dir = args.output_root.join(session_dir_name());
    std::fs::create_dir_all(&session_dir)?;
    info!(dir = %session_dir.display(), "network_dump: session directory created");

    let listener = RawListener::new(connection.clone());
    let writer = Arc::new(LogWriter::new(
        session_dir.join("raw"),
        declared_type,
        None,
        None,
        args.max_entries,
        args.max_time,
    )?);

    let writer_for_cb = writer.clone();
    listener.subscribe(Arc::new(move |event: meshcast::transport::RawEvent| {
        if let Err(e) = writer_for_cb.write(&event.topic, &event.payload, None) {
            tracing::error!(error = %e, "network_dump: failed to write record");
        }
    }));

    listener.open()?;
    info!(group = %args.group, port = connection.port, "network_dump: listening, press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    listener.close();
    writer.close();
    info!("network_dump: stopped");
    Ok(())
}
