//! Pathwarden CLI - adversary simulation over path-aware transport.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use pathwarden::adversary::{build_adversary, AdversaryConfig};
use pathwarden::cli::*;
use pathwarden::config::{init_logging, Config};
use pathwarden::endpoint::Endpoint;
use pathwarden::error::{Error, Result};
use pathwarden::multipath::PeerPaths;
use pathwarden::path::{Path, PathFingerprint};
use pathwarden::probe::PathStatus;
use pathwarden::transport::sim::SimNetwork;
use pathwarden::transport::{Binding, BindingConfig};
use pathwarden::types::IsdAsn;
use pathwarden::VERSION;

/// How long the receiver waits for stragglers once sending is done.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config if specified
    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    // Initialize logging; command-line flags override the config file
    let log_config = config
        .logging
        .clone()
        .with_overrides(cli.log_level.clone(), cli.no_color);
    init_logging(&log_config)?;

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Dispatch command
    match cli.command {
        Commands::Simulate(args) => run_simulate(args, config).await,
        Commands::Fingerprint(args) => run_fingerprint(&args),
        Commands::Config(args) => run_config(&args),
    }
}

/// Run a fan-out between two simulated peers with the chosen adversary in
/// front of the initiator.
async fn run_simulate(args: SimulateArgs, config: Config) -> Result<()> {
    if args.paths == 0 {
        return Err(Error::InvalidConfig("need at least one path".into()));
    }
    if args.dead > args.paths {
        return Err(Error::InvalidConfig(format!(
            "{} dead paths requested but only {} exist",
            args.dead, args.paths
        )));
    }

    let adversary_config = AdversaryConfig {
        kind: args.adversary.unwrap_or(config.adversary.kind),
        ..config.adversary.clone()
    };
    adversary_config.validate()?;
    let kind = adversary_config.kind;

    println!(
        "{} {} {}",
        "pathwarden".bright_cyan().bold(),
        VERSION.dimmed(),
        format!("simulate --adversary {kind}").bright_white()
    );

    let ia_local = IsdAsn::new(1, 0xff00_0000_0110);
    let ia_remote = IsdAsn::new(1, 0xff00_0000_0111);

    let net = SimNetwork::new();
    let paths = net.connect(ia_local, ia_remote, args.paths);
    for path in &paths[..args.dead] {
        net.set_status(path, PathStatus::Unreachable);
        net.set_link_down(path, true);
    }

    let local = net.host(ia_local, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    let remote = net.host(ia_remote, IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)));

    let (initiator, _) = Binding::bind(Arc::new(local.clone()), &config.binding).await?;
    let responder_config = BindingConfig {
        port: 0,
        ..config.binding.clone()
    };
    let (responder, _) = Binding::bind(Arc::new(remote), &responder_config).await?;

    let adversary = build_adversary(&adversary_config, &config.probe, Arc::new(local));
    let peer = PeerPaths::new(Arc::new(Endpoint::new(responder.local_addr())));

    println!(
        "  {} {} -> {} over {} paths ({} dead)",
        "▸".cyan(),
        initiator.local_addr(),
        responder.local_addr(),
        paths.len(),
        args.dead
    );
    if kind.probes() {
        println!("  {} probing deadline {:?}", "▸".cyan(), config.probe.deadline);
    }

    if let Err(e) = peer.refresh(&initiator, adversary.as_ref()).await {
        println!("  {} {} (all datagrams will be dropped)", "!".yellow(), e);
    }

    let datagram = vec![0u8; args.size];
    for _ in 0..args.rounds {
        peer.send_all(&initiator, adversary.as_ref(), &datagram).await?;
    }

    let received = drain(&responder).await?;
    print_summary(&paths, args.dead, &received);

    let stats = initiator.stats();
    println!();
    println!(
        "  sent {}  dropped by adversary {}  lost on dead links {}  delivered {}",
        stats.datagrams_sent.to_string().bright_white(),
        stats.datagrams_dropped.to_string().yellow(),
        net.lost().to_string().red(),
        net.delivered().to_string().green()
    );

    initiator.close().await?;
    responder.close().await?;
    Ok(())
}

/// Receive until the network goes quiet. Counts datagrams per forward path.
async fn drain(responder: &Binding) -> Result<HashMap<PathFingerprint, usize>> {
    let mut received = HashMap::new();
    let mut buf = responder.recv_buffer();

    while let Ok(result) =
        tokio::time::timeout(DRAIN_TIMEOUT, responder.receive(&mut buf)).await
    {
        let (_, from) = result?;
        if let Some(reply_path) = from.current_path() {
            *received
                .entry(reply_path.reversed().fingerprint())
                .or_insert(0) += 1;
        }
    }

    Ok(received)
}

fn print_summary(paths: &[Path], dead: usize, received: &HashMap<PathFingerprint, usize>) {
    println!();
    println!("  {:<10} {:<8} {}", "PATH".bold(), "LINK".bold(), "RECEIVED".bold());
    for (i, path) in paths.iter().enumerate() {
        let fp = path.fingerprint();
        let link = if i < dead { "dead".red() } else { "up".green() };
        let count = received.get(&fp).copied().unwrap_or(0);
        let count = if count > 0 {
            count.to_string().green()
        } else {
            count.to_string().dimmed()
        };
        println!("  {:<10} {:<8} {}", fp.short(), link, count);
    }
}

/// Print the fingerprint of a hex-encoded raw path.
fn run_fingerprint(args: &FingerprintArgs) -> Result<()> {
    let raw = hex::decode(args.hex.trim())
        .map_err(|e| anyhow::anyhow!("invalid hex path {:?}: {e}", args.hex))?;
    let path = Path::from_raw(raw);
    println!("{}", path.fingerprint());
    Ok(())
}

/// Generate example configuration.
fn run_config(args: &ConfigArgs) -> Result<()> {
    let output = toml::to_string_pretty(&Config::example())
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        println!(
            "{} Configuration written to {}",
            "✓".green(),
            path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
