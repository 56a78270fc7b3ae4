//! fstatd - file statistics Prometheus exporter library.
//!
//! This library provides the functionality behind the `fstatd` binary:
//! - `config` - YAML document schema and CLI/config merging
//! - `template` - time-based pattern templating
//! - `collector` - the per-scrape collection engine
//! - `metrics` - Prometheus descriptor set and collector adapter
//! - `server` - HTTP exposition endpoint

pub mod collector;
pub mod config;
pub mod metrics;
pub mod server;
pub mod template;

/// Crate version, exposed for CLI `--version` and startup logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
