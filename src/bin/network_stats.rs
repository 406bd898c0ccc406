//! network_stats - Print a per-topic record count for a recorded log session.
//!
//! Usage:
//!   network_stats --session ./recordings/20260101T120000_host

use std::path::PathBuf;

use clap::Parser;

use meshcast::logfile::DirectoryReader;

#[derive(Parser, Debug)]
#[command(name = "network_stats")]
#[command(about = "Print a per-topic record count for a recorded log session")]
#[command(version)]
struct Args {
    /// Session directory to summarize
    #[arg(short, long)]
    session: PathBuf,

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

    let counts = DirectoryReader::topic_summary(&args.session, !args.strict)?;
    if counts.is_empty() {
        println!("no records found in {}", args.session.display());
        return Ok(());
    }

    let total: usize = counts.values().sum();
    for (topic, count) in &counts {
        println!("{count:>10}  {topic}");
    }
    println!("{total:>10}  (total)");
    Ok(())
}
