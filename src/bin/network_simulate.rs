//! network_simulate - Generate synthetic multicast traffic from a network
//! config (connections) paired position-by-position with a simulation config
//! (rate/size per declared name). A thin traffic generator for exercising
//! listeners; out of scope as a full product (spec §1).
//!
//! Usage:
//!   network_simulate --network net.cfg --simulation sim.cfg

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use meshcast::config::{parse_network_config, parse_simulation_config};
use meshcast::transport::RawBroadcaster;

#[derive(Parser, Debug)]
#[command(name = "network_simulate")]
#[command(about = "Generate synthetic multicast traffic for exercising listeners")]
#[command(version)]
struct Args {
    /// Network configuration file (connections, §6)
    #[arg(short, long)]
    network: PathBuf,

    /// Simulation configuration file (rate/size pairs, §6)
    #[arg(short = 'c', long)]
    simulation: PathBuf,

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

    let net = parse_network_config(&args.network)?;
    let sim = parse_simulation_config(&args.simulation)?;
    if net.connections.len() != sim.len() {
        anyhow::bail!(
            "network config declares {} connections but simulation config declares {} entries; \
             network_simulate pairs them positionally and requires equal counts",
            net.connections.len(),
            sim.len()
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let mut handles = Vec::new();
    for (connection, entry) in net.connections.into_iter().zip(sim.into_iter()) {
        let topic = match &connection.topics {
            meshcast::transport::Topics::Single(t) => t.clone(),
            meshcast::transport::Topics::List(list) => list.first().cloned().unwrap_or_default(),
            meshcast::transport::Topics::None => String::new(),
        };
        let broadcaster = RawBroadcaster::new(connection, topic.clone());
        broadcaster.open()?;
        info!(message = %entry.message_name, topic, rate_hz = entry.rate_hz, size = entry.size_bytes, "network_simulate: generator started");

        let running = running.clone();
        let period = Duration::from_secs_f64(1.0 / entry.rate_hz.max(f64::MIN_POSITIVE));
        let payload = vec![0u8; entry.size_bytes];
        handles.push(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let tick = Instant::now();
                if let Err(e) = broadcaster.publish(&payload) {
                    warn!(error = %e, "network_simulate: publish failed");
                }
                let elapsed = tick.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                }
            }
        }));
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }
    for handle in handles {
        let _ = handle.join();
    }
    info!("network_simulate: stopped");
    Ok(())
}
