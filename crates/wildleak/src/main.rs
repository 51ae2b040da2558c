// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! wildleak CLI
//!
//! Runs the wildcard subscription retention harness until interrupted or
//! until the configured number of bursts has been published.
//!
//! # Usage
//!
//! ```bash
//! # Default: three-node mesh, MQTT shared-subscription consumer
//! wildleak
//!
//! # Core temporary-queue consumer for comparison
//! wildleak --core-consumer
//!
//! # Single node, fresh data directory, JSON lines output
//! wildleak --no-cluster --cleanup --snapshot-out snapshots.jsonl
//!
//! # Using configuration file
//! wildleak --config wildleak.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wildleak::{
    clean_data_directory, ClusterTopology, Harness, HarnessConfig, JsonLinesSink, SnapshotSink,
};
use wildleak_broker::Fabric;

/// Wildcard subscription retention harness
#[derive(Parser, Debug)]
#[command(name = "wildleak")]
#[command(about = "Reproduces broker address/queue retention under wildcard subscription load")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the primary node
    #[arg(long)]
    broker_name: Option<String>,

    /// Messages (and distinct addresses) per burst
    #[arg(short = 'k', long)]
    address_count: Option<usize>,

    /// Use the core temporary-queue consumer instead of MQTT
    #[arg(long)]
    core_consumer: bool,

    /// Delay between bursts (milliseconds)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Delay before the first burst (milliseconds)
    #[arg(long)]
    initial_delay_ms: Option<u64>,

    /// Stop after this many bursts
    #[arg(short = 'n', long)]
    max_bursts: Option<u64>,

    /// Root data directory for all nodes
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single node without cluster bridges
    #[arg(long)]
    no_cluster: bool,

    /// Delete the data directory before starting
    #[arg(long)]
    cleanup: bool,

    /// Append every snapshot as a JSON line to this file
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "wildleak.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = build_config(&args);
    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());

    // Initialize logging
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = config?;
    config.validate()?;
    let topology = ClusterTopology::from_config(&config)?;

    println!("wildleak v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    for node in topology.nodes() {
        println!(
            "Node: {:<16} core {}  mqtt {}  ({:?})",
            node.name, node.core, node.mqtt, node.role
        );
    }
    println!(
        "Consumer: {}",
        if config.repro.core_consumer_enabled {
            "core temporary queue"
        } else {
            "MQTT shared subscription"
        }
    );
    println!("Burst size: {} addresses", config.repro.address_count);
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    if args.cleanup {
        clean_data_directory(&config.amq.data_directory)?;
    }

    let mut sinks: Vec<Box<dyn SnapshotSink>> = Vec::new();
    if let Some(path) = &args.snapshot_out {
        let sink = JsonLinesSink::create(path)
            .with_context(|| format!("opening snapshot file {}", path.display()))?;
        sinks.push(Box::new(sink));
    }

    let mut harness = tokio::task::block_in_place(|| {
        Harness::start_with_sinks(config, Fabric::new(), sinks)
    })
    .context("harness startup failed")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        println!("\nShutting down...");
    };
    let result = harness.run(shutdown).await;

    let verdict = tokio::task::block_in_place(|| harness.shutdown());
    println!();
    println!("Trend over {} snapshot(s):", verdict.samples);
    for metric in &verdict.metrics {
        println!(
            "  {:<22} {:>6} -> {:<6} {}",
            metric.metric,
            metric.first,
            metric.last,
            if metric.monotonic_growth { "GROWING" } else { "" }
        );
    }

    result.context("harness run failed")?;
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(name) = &args.broker_name {
        config.amq.broker_name = name.clone();
    }
    if let Some(count) = args.address_count {
        config.repro.address_count = count;
    }
    if args.core_consumer {
        config.repro.core_consumer_enabled = true;
    }
    if let Some(period) = args.period_ms {
        config.schedule.period_ms = period;
    }
    if let Some(delay) = args.initial_delay_ms {
        config.schedule.initial_delay_ms = delay;
    }
    if args.max_bursts.is_some() {
        config.schedule.max_bursts = args.max_bursts;
    }
    if let Some(dir) = &args.data_dir {
        config.amq.data_directory = dir.clone();
    }
    if args.no_cluster {
        config.amq.cluster_enabled = false;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> anyhow::Result<()> {
    let mut config = HarnessConfig::default();
    config.schedule.max_bursts = Some(30);

    let toml_str = config.to_toml()?;

    // Add comments
    let content = format!(
        r#"# wildleak configuration
# Generated by wildleak gen-config
#
# Remove schedule.max_bursts to run until interrupted.
# Set broker.reap_through_implicit_links = true to compare against the
# reaping policy that ignores broker-created subscription links.

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    let loaded = HarnessConfig::from_file(&config_path)
        .and_then(|c| ClusterTopology::from_config(&c).map(|t| (c, t)));
    match loaded {
        Ok((config, topology)) => {
            println!("Configuration valid!");
            println!();
            println!("Primary: {}", config.amq.broker_name);
            println!(
                "Nodes: {}{}",
                topology.len(),
                if topology.is_clustered() { " (full mesh)" } else { "" }
            );
            for (i, node) in topology.nodes().iter().enumerate() {
                println!("  [{}] {} core {} mqtt {}", i, node.name, node.core, node.mqtt);
            }
            println!(
                "Burst: {} addresses every {} ms",
                config.repro.address_count, config.schedule.period_ms
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
