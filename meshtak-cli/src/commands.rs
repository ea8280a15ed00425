//! Command execution and output formatting.

use std::error::Error;

use colored::Colorize;
use meshtak_client::MeshClient;
use meshtak_protocol::{GpsCoordinate, NodeInfo};

use crate::Commands;

pub async fn run(client: &MeshClient, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Info => {
            let info = client.get_info(None).await?;
            println!("{}", info.node_info.node_id.cyan().bold());
            println!("  firmware:  {}", info.firmware_version);
            println!("  protocol:  {}", info.protocol_version);
            println!("  mesh:      v{}", info.mesh_version);
            println!("  neighbors: {}", info.neighbor_count);
            println!("  routes:    {}", info.route_count);
            println!("  uptime:    {}s", info.uptime_ms / 1000);
        }

        Commands::Gps => {
            let gps = client.get_gps(None).await?;
            let fix = if gps.has_fix {
                "fix".green()
            } else {
                "no fix".yellow()
            };
            println!(
                "{} ({} sats, hdop {:.1})",
                fix, gps.satellites, gps.hdop
            );
            println!("  {}", format_position(&gps.position));
        }

        Commands::Neighbors => {
            let neighbors = client.get_neighbors(None).await?;
            if neighbors.is_empty() {
                println!("{}", "no neighbors".yellow());
            }
            for node in neighbors {
                print_node(&node);
            }
        }

        Commands::Routes => {
            let routes = client.get_routes(None).await?;
            if routes.is_empty() {
                println!("{}", "no routes".yellow());
            }
            for route in routes {
                println!(
                    "{} via {} ({} hops, {} dBm)",
                    route.destination.cyan(),
                    route.next_hop,
                    route.hop_count,
                    route.rssi
                );
            }
        }

        Commands::Roster => {
            let roster = client.get_roster(None).await?;
            for entry in roster {
                let marker = if entry.is_self { " (self)" } else { "" };
                let status = if entry.is_active {
                    "active".green()
                } else {
                    "inactive".yellow()
                };
                println!("{}{} [{}]", entry.node.node_id.cyan(), marker, status);
            }
        }

        Commands::Stats => {
            let stats = client.get_stats(None).await?;
            println!("sent:        {}", stats.messages_sent);
            println!("received:    {}", stats.messages_received);
            println!("forwarded:   {}", stats.messages_forwarded);
            println!("dropped:     {}", stats.messages_dropped);
            println!("discoveries: {}", stats.route_discoveries);
            println!("route errors: {}", stats.route_errors);
            println!("uptime:      {}s", stats.uptime().as_secs());
        }

        Commands::Send {
            text,
            auto_split,
            priority,
        } => {
            client
                .send_message(&text, priority.map(Into::into), auto_split, None)
                .await?;
            println!("{}", "sent".green());
        }

        Commands::SetGps {
            lat,
            lon,
            alt,
            use_static,
        } => {
            print_outcome(client.set_gps(lat, lon, alt, use_static, None).await?);
        }

        Commands::SetNodeId { node_id } => {
            print_outcome(client.set_node_id(&node_id, None).await?);
        }

        Commands::SendGps => {
            print_outcome(client.send_gps(None).await?);
        }

        Commands::Emergency { kind, description } => {
            print_outcome(client.send_emergency(kind.into(), &description, None).await?);
        }

        Commands::Ping { destination } => {
            print_outcome(client.ping(&destination, None).await?);
        }

        Commands::Discover => {
            print_outcome(client.discover(None).await?);
        }

        Commands::Join => {
            print_outcome(client.join(None).await?);
        }

        Commands::Monitor => {
            monitor(client).await?;
        }
    }
    Ok(())
}

/// Registers every event handler and prints events until ctrl-c.
async fn monitor(client: &MeshClient) -> Result<(), Box<dyn Error>> {
    client.on_message(|msg| {
        println!("{} {}: {}", "msg".blue().bold(), msg.source.cyan(), msg.text);
    });
    client.on_gps(|gps| {
        println!(
            "{} {}: {}",
            "gps".blue().bold(),
            gps.source.cyan(),
            format_position(&gps.position)
        );
    });
    client.on_neighbor(|change| {
        println!(
            "{} {} {:?}",
            "nbr".blue().bold(),
            change.node.node_id.cyan(),
            change.change
        );
    });
    client.on_emergency(|alert| {
        println!(
            "{} {} {:?}: {}",
            "SOS".red().bold(),
            alert.source.cyan(),
            alert.emergency_type,
            alert.description
        );
    });
    client.on_log(|log| {
        println!("{} [{:?}] {}", "log".dimmed(), log.level, log.message);
    });

    println!("{}", "monitoring events, ctrl-c to stop".dimmed());
    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn print_node(node: &NodeInfo) {
    let position = node
        .position
        .as_ref()
        .map(format_position)
        .unwrap_or_else(|| "no position".to_string());
    println!(
        "{} ({} dBm, batt {}%) {}",
        node.node_id.cyan(),
        node.rssi,
        node.battery_level,
        position
    );
}

fn format_position(pos: &GpsCoordinate) -> String {
    format!("{:.6}, {:.6} @ {:.0}m", pos.latitude, pos.longitude, pos.altitude)
}

fn print_outcome(success: bool) {
    if success {
        println!("{}", "ok".green());
    } else {
        println!("{}", "refused by device".red());
    }
}
