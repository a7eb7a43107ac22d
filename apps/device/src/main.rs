//! Simulated device entry point.
//!
//! Runs either a command-channel device that acknowledges hub commands or
//! a telemetry device that streams sequenced readings.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smarthub_device_sim::{CommandDevice, TelemetryDevice};
use smarthub_protocol::constants::{
    DEFAULT_COMMAND_PORT, DEFAULT_TELEMETRY_PORT, PACKETS_PER_CYCLE,
};

/// Smart hub device simulator
#[derive(Parser, Debug)]
#[command(name = "smarthub-device")]
#[command(version)]
#[command(about = "Simulate a smart home device talking to the hub")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Device name
    #[arg(short, long, default_value = "Sensor01", global = true)]
    name: String,

    /// Hub host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    host: std::net::IpAddr,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Register on the command channel and acknowledge commands
    Command {
        /// Device type announced at registration
        #[arg(short, long, default_value = "temperature")]
        kind: String,

        /// Hub command port
        #[arg(short, long, default_value_t = DEFAULT_COMMAND_PORT)]
        port: u16,
    },

    /// Stream telemetry cycles
    Telemetry {
        /// Sensor type reported in each reading
        #[arg(short, long, default_value = "temperature")]
        sensor: String,

        /// Hub telemetry port
        #[arg(short, long, default_value_t = DEFAULT_TELEMETRY_PORT)]
        port: u16,

        /// Readings per cycle
        #[arg(long, default_value_t = PACKETS_PER_CYCLE as u32)]
        packets: u32,

        /// Seconds between readings
        #[arg(short, long, default_value = "2")]
        interval: u64,

        /// Stop after this many cycles (default: run forever)
        #[arg(short, long)]
        cycles: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let work = async {
        match args.mode {
            Mode::Command { kind, port } => {
                let hub = SocketAddr::new(args.host, port);
                let report = CommandDevice::new(&args.name, kind).run(hub).await?;
                tracing::info!(
                    device = %args.name,
                    commands = report.executed.len(),
                    "closing connection"
                );
            }
            Mode::Telemetry {
                sensor,
                port,
                packets,
                interval,
                cycles,
            } => {
                let hub = SocketAddr::new(args.host, port);
                let device = TelemetryDevice::new(&args.name, sensor)
                    .with_packets_per_cycle(packets)
                    .with_interval(Duration::from_secs(interval));
                let replies = device.run(hub, cycles).await?;
                let answered = replies.iter().filter(|r| r.is_some()).count();
                tracing::info!(
                    device = %args.name,
                    cycles = replies.len(),
                    answered,
                    "telemetry finished"
                );
            }
        }
        anyhow::Ok(())
    };

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(device = %args.name, "stopped by user");
            Ok(())
        }
    }
}
