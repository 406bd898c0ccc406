//! network_replay - Replay a recorded log session at a chosen speed.
//!
//! Usage:
//!   network_replay --session ./recordings/20260101T120000_host --type Telemetry
//!   network_replay --session ./recordings/20260101T120000_host --type Telemetry --speed 2.0

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use meshcast::logfile::DirectoryReader;
use meshcast::message::Registry;
use meshcast::replay::Replay;

#[derive(Parser, Debug)]
#[command(name = "network_replay")]
#[command(about = "Replay a recorded log session at a chosen speed")]
#[command(version)]
struct Args {
    /// Session directory to replay (as written by network_dump)
    #[arg(short, long)]
    session: PathBuf,

    /// Registered message type name the session's records decode as
    #[arg(short = 't', long = "type")]
    message_type: String,

    /// Playback speed multiplier (1.0 = realtime)
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Treat headerless (raw) log files as fatal instead of skipping them
    #[arg(long)]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    if meshcast::transport::run_worker_if_requested(&argv)? {
        return Ok(());
    }

    let args = Args::parse();
    meshcast::logging::init_tracing(&args.log_level);

    // DirectoryReader decodes each source by its own header's declared type
    // (looked up in this same process-wide registry), so the expected type
    // only needs confirming here, not threading through as a decode mode.
    if Registry::global().get(&args.message_type).is_none() {
        anyhow::bail!("message type '{}' is not registered", args.message_type);
    }

    let ignore_raw = !args.strict;
    let reader = DirectoryReader::open(&args.session, ignore_raw)?;
    info!(session = %args.session.display(), speed = args.speed, "network_replay: starting");

    let replay = Replay::new(Box::new(reader), args.speed)?;
    replay.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) && replay.is_running() {
        std::thread::sleep(Duration::from_millis(200));
    }

    replay.stop()?;
    info!("network_replay: finished");
    Ok(())
}
