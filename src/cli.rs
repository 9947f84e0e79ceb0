//! CLI argument parsing with clap.
//!
//! cfsync is a single-pass tool: one invocation runs one reconciliation
//! pass, so there are no subcommands.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cfsync")]
#[command(author, version, about = "Sync firewalld allow rules with Cloudflare's IP ranges")]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "/etc/cfsync/config.yaml")]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long)]
    pub verbose: bool,

    /// Fetch and compare but do not touch the firewall or the cache
    #[arg(long)]
    pub dry_run: bool,
}
