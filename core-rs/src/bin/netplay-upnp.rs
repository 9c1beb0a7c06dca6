//! netplay-upnp - router port-forwarding CLI
//!
//! Inspect and manage the UPnP mappings of a netplay host

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use netplay_upnp::{
    IgdClient, IgdNextClient, InMemoryGateway, PortForwarder, PortManager, PortMappingEntry,
    Protocol, UpnpConfig,
};

#[derive(Parser)]
#[command(name = "netplay-upnp")]
#[command(version)]
#[command(about = "UPnP port forwarding for netplay sessions", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Discovery timeout in milliseconds
    #[arg(long, global = true)]
    timeout: Option<u32>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Use a simulated gateway instead of the network
    #[arg(long, global = true)]
    simulate: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the gateway, our mappings and everyone else's
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open a port mapping to this machine
    Add {
        /// TCP or UDP
        protocol: String,
        /// External port
        port: u16,
        /// LAN port (defaults to the external port)
        #[arg(long, default_value_t = 0)]
        internal_port: u16,
        /// Mapping description (defaults to "<marker>-Netplay")
        #[arg(long)]
        description: Option<String>,
    },
    /// Close a port mapping
    Remove {
        /// TCP or UDP
        protocol: String,
        /// External port
        port: u16,
    },
    /// Delete every mapping this application owns on this LAN address
    Clear,
    /// Open mappings, wait for Ctrl+C, then restore the router
    Hold {
        /// Mappings as PROTOCOL:PORT[:INTERNAL_PORT], e.g. UDP:45000
        #[arg(required = true)]
        mappings: Vec<String>,
        /// Mapping description (defaults to "<marker>-Netplay")
        #[arg(long)]
        description: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => UpnpConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => UpnpConfig::default(),
    };
    let timeout_ms = cli
        .timeout
        .unwrap_or_else(|| u32::try_from(config.discovery.timeout_ms).unwrap_or(u32::MAX));

    if cli.simulate {
        run(simulated_gateway(), cli.command, &config, timeout_ms)
    } else {
        run(IgdNextClient::new(), cli.command, &config, timeout_ms)
    }
}

/// A router with one console already forwarding its own port
fn simulated_gateway() -> InMemoryGateway {
    let gateway = InMemoryGateway::new();
    gateway.set_description_prefix(Some("UPnP:"));
    gateway.insert_entry(PortMappingEntry {
        external_port: 3074,
        protocol: Protocol::Udp,
        internal_port: 3074,
        internal_client: "192.168.1.50".to_string(),
        description: "UPnP:Console".to_string(),
        remote_host: String::new(),
        lease_duration: 0,
        enabled: true,
    });
    gateway
}

fn run<C: IgdClient>(
    client: C,
    command: Commands,
    config: &UpnpConfig,
    timeout_ms: u32,
) -> anyhow::Result<()> {
    let timeout = Duration::from_millis(u64::from(timeout_ms));
    let default_description = format!("{}-Netplay", config.mapping.marker);

    match command {
        Commands::Status { json } => {
            let mut manager = PortManager::new(client, config);
            manager.initialize(timeout)?;
            print_status(&manager, json)?;
            manager.terminate();
        }

        Commands::Add {
            protocol,
            port,
            internal_port,
            description,
        } => {
            let protocol: Protocol = protocol.parse()?;
            let description = description.unwrap_or(default_description);

            let mut manager = PortManager::new(client, config);
            manager.initialize(timeout)?;
            config.retry_policy().run("Add", || {
                manager.add(protocol, &description, port, internal_port)
            })?;
            println!("{} {} {} → {}", "✓".green(), protocol, port, manager.lan_ip().unwrap_or("?"));
            manager.terminate();
        }

        Commands::Remove { protocol, port } => {
            let protocol: Protocol = protocol.parse()?;

            let mut manager = PortManager::new(client, config);
            manager.initialize(timeout)?;
            config
                .retry_policy()
                .run("Remove", || manager.remove(protocol, port))?;
            println!("{} {} {} removed", "✓".green(), protocol, port);
            manager.terminate();
        }

        Commands::Clear => {
            let mut manager = PortManager::new(client, config);
            manager.initialize(timeout)?;
            let before = manager.owned_mappings().len();
            manager.clear()?;
            println!("{} Cleared {} mapping(s)", "✓".green(), before);
            manager.terminate();
        }

        Commands::Hold {
            mappings,
            description,
        } => {
            let requested = mappings
                .iter()
                .map(|m| parse_mapping(m))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let description = description.unwrap_or(default_description);

            let mut forwarder = PortForwarder::new(client, config);
            if !forwarder.init(timeout_ms) {
                bail!("No UPnP gateway available");
            }

            for (protocol, port, internal_port) in &requested {
                let label = protocol.as_str();
                if forwarder.add_mapping(label, &description, *port, *internal_port) {
                    println!("{} {} {}", "✓".green(), label, port);
                } else {
                    println!("{} {} {}", "✗".red(), label, port);
                }
            }

            let shutdown = Arc::new(AtomicBool::new(false));
            let shutdown_clone = shutdown.clone();
            ctrlc::set_handler(move || {
                eprintln!("[Hold] Received SIGTERM/SIGINT, restoring router...");
                shutdown_clone.store(true, Ordering::SeqCst);
            })?;

            println!("Holding {} mapping(s), press Ctrl+C to release", requested.len());
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(200));
            }

            forwarder.shutdown();
            println!("{} Router restored", "✓".green());
        }
    }

    Ok(())
}

/// Parse PROTOCOL:PORT[:INTERNAL_PORT]
fn parse_mapping(arg: &str) -> anyhow::Result<(Protocol, u16, u16)> {
    let mut parts = arg.split(':');
    let protocol: Protocol = parts
        .next()
        .ok_or_else(|| anyhow!("Empty mapping"))?
        .parse()?;
    let port: u16 = parts
        .next()
        .ok_or_else(|| anyhow!("Missing port in '{}'", arg))?
        .parse()
        .with_context(|| format!("Invalid port in '{}'", arg))?;
    let internal_port: u16 = match parts.next() {
        Some(p) => p
            .parse()
            .with_context(|| format!("Invalid internal port in '{}'", arg))?,
        None => 0,
    };
    if parts.next().is_some() {
        bail!("Too many fields in '{}'", arg);
    }
    Ok((protocol, port, internal_port))
}

fn print_status<C: IgdClient>(manager: &PortManager<C>, json: bool) -> anyhow::Result<()> {
    if json {
        let status = serde_json::json!({
            "state": manager.init_state(),
            "lanIp": manager.lan_ip(),
            "gatewayStatus": manager.gateway_status(),
            "leaseDuration": manager.lease_duration().as_secs(),
            "owned": manager.owned_mappings(),
            "foreign": manager.foreign_mappings(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "UPnP Gateway".bold());
    println!("  LAN IP:   {}", manager.lan_ip().unwrap_or("-").cyan());
    if let Some(status) = manager.gateway_status() {
        println!("  Status:   {:?}", status);
    }
    println!("  Lease:    {}s", manager.lease_duration());
    println!("  Marker:   {}", manager.marker());
    println!();

    println!("{} ({})", "Owned mappings".bold(), manager.owned_mappings().len());
    for owned in manager.owned_mappings() {
        println!("  {:<5} {}", owned.protocol.to_string(), owned.external_port);
    }
    println!();

    println!("{} ({})", "Foreign mappings".bold(), manager.foreign_mappings().len());
    for foreign in manager.foreign_mappings() {
        let entry = &foreign.entry;
        println!(
            "  {:<5} {:<6} → {}:{:<6} {} {}",
            entry.protocol.to_string(),
            entry.external_port,
            entry.internal_client,
            entry.internal_port,
            entry.description.dimmed(),
            if entry.enabled { "" } else { "(disabled)" }
        );
    }

    Ok(())
}
