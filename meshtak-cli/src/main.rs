//! meshtak-cli - Terminal interface for LoRa mesh TAK radios.
//!
//! One subcommand per device operation, plus `monitor` for watching
//! unsolicited events.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use meshtak_client::{ConnectionConfig, MeshClient};
use meshtak_protocol::{EmergencyType, MessagePriority, DEFAULT_BAUD_RATE};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshtak-cli")]
#[command(about = "Terminal interface for LoRa mesh TAK radios")]
#[command(version)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long, env = "MESHTAK_PORT", default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Command timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get device information
    Info,

    /// Get the current GPS fix
    Gps,

    /// List direct neighbors
    Neighbors,

    /// Show the routing table
    Routes,

    /// Show the team roster
    Roster,

    /// Show device statistics
    Stats,

    /// Send a text message to the mesh
    Send {
        /// Message text
        text: String,

        /// Split messages over 180 chars into labeled parts
        #[arg(long)]
        auto_split: bool,

        /// Message priority
        #[arg(long, value_enum)]
        priority: Option<PriorityArg>,
    },

    /// Set the GPS position manually
    SetGps {
        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lon: f64,

        #[arg(long, default_value_t = 0.0)]
        alt: f64,

        /// Persist the position across device reboots
        #[arg(long = "static")]
        use_static: bool,
    },

    /// Set the node ID (device may need a restart)
    SetNodeId {
        node_id: String,
    },

    /// Broadcast the current GPS position
    SendGps,

    /// Send an emergency alert
    Emergency {
        /// Alert category
        #[arg(long, value_enum, default_value = "other")]
        kind: EmergencyArg,

        /// Optional description
        #[arg(default_value = "")]
        description: String,
    },

    /// Ping a destination node
    Ping {
        destination: String,
    },

    /// Trigger network discovery
    Discover,

    /// Join the mesh network
    Join,

    /// Print incoming events until interrupted
    Monitor,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Critical,
}

impl From<PriorityArg> for MessagePriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => MessagePriority::Low,
            PriorityArg::Normal => MessagePriority::Normal,
            PriorityArg::High => MessagePriority::High,
            PriorityArg::Critical => MessagePriority::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EmergencyArg {
    Medical,
    Fire,
    Security,
    Evacuation,
    Other,
}

impl From<EmergencyArg> for EmergencyType {
    fn from(arg: EmergencyArg) -> Self {
        match arg {
            EmergencyArg::Medical => EmergencyType::Medical,
            EmergencyArg::Fire => EmergencyType::Fire,
            EmergencyArg::Security => EmergencyType::Security,
            EmergencyArg::Evacuation => EmergencyType::Evacuation,
            EmergencyArg::Other => EmergencyType::Other,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConnectionConfig::new(&cli.port)
        .with_baud_rate(cli.baud)
        .with_command_timeout(Duration::from_secs(cli.timeout));
    let client = MeshClient::new(config);
    client.connect().await?;

    let result = commands::run(&client, cli.command).await;
    client.disconnect().await;
    result
}
