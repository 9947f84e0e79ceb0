//! # cfsync - Cloudflare allow-list synchronization for firewalld
//!
//! Keeps a host firewall's allow rules in step with Cloudflare's published
//! IPv4/IPv6 ranges. Each invocation runs exactly one reconciliation pass:
//! fetch the current ranges, compare their etag against the locally cached
//! snapshot, and only on a change replace the firewalld rich rules
//! wholesale, reload, and persist the new snapshot. Meant to be driven by
//! cron or a systemd timer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        cfsync                          │
//! ├────────────────────────────────────────────────────────┤
//! │  CLI (clap) + Config (serde_yaml)                      │
//! ├────────────────────────────────────────────────────────┤
//! │  Reconciler                                            │
//! │    ├── RangeSource (reqwest, Cloudflare /ips)          │
//! │    ├── StateStore (atomic JSON cache)                  │
//! │    └── RuleBackend (firewalld rich rules)              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cfsync::config::Config;
//! use cfsync::backend::FirewalldBackend;
//! use cfsync::reconciler::Reconciler;
//! use cfsync::source::CloudflareSource;
//! use cfsync::store::FileStore;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/cfsync/config.yaml")?;
//!
//!     let source = CloudflareSource::new(
//!         &config.endpoint,
//!         Duration::from_secs(config.timeout_secs),
//!     )?;
//!     let store = FileStore::new(&config.cache_path);
//!     let backend = FirewalldBackend::new(&config.zone, config.permanent);
//!
//!     let reconciler = Reconciler::new(&source, &store, &backend, config.allowed_ports);
//!     let outcome = reconciler.run().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod lock;
pub mod reconciler;
pub mod rules;
pub mod source;
pub mod store;

pub use cli::Cli;
pub use config::Config;
pub use error::SyncError;
pub use reconciler::{Outcome, Plan, Reconciler};
