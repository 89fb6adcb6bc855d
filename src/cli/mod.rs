//! CLI argument parsing using clap.
//!
//! This module defines the command-line interface for OrderPulse,
//! including all subcommands and their arguments.

mod config;

pub use config::{parse_restaurant, WatchCliConfig, WatchConfigError};

use clap::{Parser, Subcommand};

/// OrderPulse - Real-time order status synchronization
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub verbose: String,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Follow a user's orders until Ctrl-C, printing each status change
    Watch {
        /// User whose orders to follow
        #[arg(short, long)]
        user: String,
        /// Event-stream base URL (overrides ORDERPULSE_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,
        /// Order API base URL (overrides ORDERPULSE_API_URL)
        #[arg(long)]
        api: Option<String>,
        /// Bearer token for the order API
        #[arg(long)]
        token: Option<String>,
        /// Seconds between polls while orders are active
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Seconds between outbound heartbeats
        #[arg(long)]
        heartbeat_interval: Option<u64>,
        /// Extra seconds of silence tolerated before the stream is declared dead
        #[arg(long)]
        heartbeat_timeout: Option<u64>,
        /// Reconnect attempts before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Serve /health and /metrics on this port
        #[arg(long)]
        health_port: Option<u16>,
        /// Known restaurant name, as ID=NAME (repeatable)
        #[arg(long = "restaurant", value_parser = parse_restaurant)]
        restaurants: Vec<(String, String)>,
    },
}
