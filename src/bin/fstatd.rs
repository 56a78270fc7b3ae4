//! fstatd - file statistics Prometheus exporter.
//!
//! Collects size, modification time and optional content metrics for files
//! matching configured glob patterns, and exposes them over HTTP in the
//! Prometheus text format.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use prometheus::Registry;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use fstatd::collector::FilesCollector;
use fstatd::config::{CliDefaults, ConfigDocument, Toggle, merge};
use fstatd::metrics::{FilesExporter, MetricDescriptors};
use fstatd::server;

/// File statistics Prometheus exporter.
#[derive(Parser)]
#[command(name = "fstatd", about = "File statistics Prometheus exporter", version = fstatd::VERSION)]
struct Args {
    /// Glob patterns to collect, relative to the working directory.
    #[arg(value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Path to the YAML configuration file. Use "none" to skip file loading.
    #[arg(short, long, default_value = "filestat.yaml")]
    config: String,

    /// Collect CRC32 hashes of file content (patterns given on the command line).
    #[arg(long)]
    metric_crc32: bool,

    /// Collect line counts of file content (patterns given on the command line).
    #[arg(long)]
    metric_lines: bool,

    /// Working directory to collect from.
    #[arg(long, default_value = ".")]
    cwd: String,

    /// Address to listen on. A bare ":port" binds every interface.
    #[arg(long, default_value = ":9943")]
    listen_address: String,

    /// HTTP path exposing the metrics.
    #[arg(long, default_value = "/metrics")]
    metrics_path: String,

    /// Prometheus namespace (metric name prefix).
    #[arg(long, default_value = "file")]
    namespace: String,

    /// Default tree label value for patterns outside any configured tree.
    #[arg(long)]
    tree_name: Option<String>,

    /// Default tree root for patterns outside any configured tree.
    #[arg(long, default_value = "")]
    tree_root: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("fstatd={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves one server setting between its CLI flag and the config file.
///
/// An explicitly set flag wins; otherwise a non-empty config value replaces
/// the flag's default.
fn pick_setting(name: &str, cli: String, cli_default: &str, config: Option<String>) -> String {
    match config {
        Some(value) if !value.is_empty() && cli == cli_default => {
            info!(setting = name, value = %value, "using value from config file");
            value
        }
        _ => cli,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("fstatd {} starting", fstatd::VERSION);

    let document = if args.config == "none" {
        ConfigDocument::default()
    } else {
        match ConfigDocument::load(Path::new(&args.config)) {
            Ok(document) => document,
            Err(e) => {
                error!(reason = %e, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        }
    };

    let working_directory = pick_setting(
        "working_directory",
        args.cwd.clone(),
        ".",
        document.exporter.working_directory.clone(),
    );
    let listen_address = pick_setting(
        "listen_address",
        args.listen_address.clone(),
        ":9943",
        document.exporter.listen_address.clone(),
    );
    let metrics_path = pick_setting(
        "metrics_path",
        args.metrics_path.clone(),
        "/metrics",
        document.exporter.metrics_path.clone(),
    );
    let namespace = pick_setting(
        "metric_namespace",
        args.namespace.clone(),
        "file",
        document.exporter.metric_namespace.clone(),
    );

    let defaults = CliDefaults {
        patterns: args.patterns.clone(),
        enable_crc32_metric: Toggle::from(args.metric_crc32),
        enable_nb_line_metric: Toggle::from(args.metric_lines),
        tree_name: args.tree_name.clone(),
        tree_root: (!args.tree_root.is_empty()).then(|| args.tree_root.clone()),
    };

    let resolved = match merge(document, &defaults) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(reason = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Patterns are relative to the working directory; change it before the
    // first scrape so every gather resolves against the same base.
    if let Err(e) = std::env::set_current_dir(&working_directory) {
        error!(cwd = %working_directory, reason = %e, "cannot change working directory");
        return ExitCode::FAILURE;
    }
    info!(cwd = %working_directory, "collecting from working directory");

    let descriptors = MetricDescriptors {
        namespace,
        has_tree_label: resolved.has_tree_label,
        enable_crc32: resolved.any_crc32,
        enable_lines: resolved.any_lines,
    };
    let engine = FilesCollector::new(resolved.collectors);
    info!(trees = engine.tree_count(), "collection configured");

    let exporter = match FilesExporter::new(engine, descriptors) {
        Ok(exporter) => exporter,
        Err(e) => {
            error!(reason = %e, "invalid metric namespace");
            return ExitCode::FAILURE;
        }
    };

    let registry = Registry::new();
    if let Err(e) = registry.register(Box::new(exporter)) {
        error!(reason = %e, "failed to register collector");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(reason = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::serve(&listen_address, &metrics_path, Arc::new(registry))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(listen = %listen_address, reason = %e, "server error");
            ExitCode::FAILURE
        }
    }
}
