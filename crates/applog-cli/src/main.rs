//! applog CLI
//!
//! Thin wrapper around applog-core for inspecting and driving the
//! transports recorded in a metadata sidecar.
//!
//! ## Usage
//!
//! ```bash
//! # Create the sidecar (seeded with the default transports) and report
//! applog init
//!
//! # Show every transport and its tracked files
//! applog status
//!
//! # Emit one record
//! applog log warn "disk almost full" --module storage --function check
//!
//! # Emit one record at every level
//! applog test
//!
//! # Manage transports
//! applog add directory app_debug /var/log/app --cycle-size 65536 --file-limit 8
//! applog add file audit /var/log/audit.log --level note
//! applog add stream stdout --colour
//! applog disable 1
//! applog enable 1
//! applog remove 2
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use applog_core::{
    init, Delivery, DirectoryTransport, LogError, Logger, Severity, StreamTarget, Transport,
    TransportSnapshot, METADATA_FILE_NAME,
};
use clap::{Parser, Subcommand};

/// applog - leveled logging with rotating transports
#[derive(Parser)]
#[command(name = "applog")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and drive applog transports")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Metadata sidecar (default: <state dir>/applog/.log_information.json)
    #[arg(short, long, global = true)]
    metadata: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or load the sidecar and bring every transport up
    Init,

    /// Show every transport and its tracked files
    Status,

    /// Emit one record
    Log {
        /// Severity: emerg, alert, crit, error, warn, note, info or debug
        level: String,
        message: String,
        #[arg(long, default_value = "applog")]
        module: String,
        #[arg(long, default_value = "main")]
        function: String,
    },

    /// Emit one record at every level
    Test,

    /// Add a transport
    Add {
        #[command(subcommand)]
        transport: AddTransport,
    },

    /// Remove the transport at INDEX (its files are kept)
    Remove { index: usize },

    /// Enable the transport at INDEX
    Enable { index: usize },

    /// Disable the transport at INDEX
    Disable { index: usize },
}

#[derive(Subcommand)]
enum AddTransport {
    /// Rotating log directory
    Directory {
        /// Base file name (files are <name><index>.log)
        name: String,
        directory: PathBuf,
        #[arg(long, default_value = "debug", value_parser = parse_severity)]
        level: Severity,
        /// Size in bytes at which a new file is started
        #[arg(long)]
        cycle_size: Option<u64>,
        /// Number of files kept
        #[arg(long)]
        file_limit: Option<usize>,
        /// Do not write a header into new files
        #[arg(long)]
        no_header: bool,
    },
    /// Single file
    File {
        name: String,
        path: PathBuf,
        #[arg(long, default_value = "debug", value_parser = parse_severity)]
        level: Severity,
    },
    /// stdout or stderr
    Stream {
        #[arg(value_parser = parse_stream)]
        target: StreamTarget,
        #[arg(long, default_value = "info", value_parser = parse_severity)]
        level: Severity,
        #[arg(long)]
        colour: bool,
    },
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse().map_err(|e: LogError| e.to_string())
}

fn parse_stream(s: &str) -> Result<StreamTarget, String> {
    s.parse().map_err(|e: LogError| e.to_string())
}

/// Set up tracing for the CLI's own diagnostics (always stderr)
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default sidecar path (<state dir>/applog/.log_information.json)
fn default_metadata_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("applog")
        .join(METADATA_FILE_NAME)
}

fn print_transport(snapshot: &TransportSnapshot) {
    let transport = match &snapshot.config {
        Ok(t) => t,
        Err(issue) => {
            println!(
                "  [{}] {} (unusable: {})",
                snapshot.index,
                snapshot.name,
                issue.to_error()
            );
            return;
        }
    };

    let state = if transport.enabled { "enabled" } else { "disabled" };
    println!(
        "  [{}] {} ({}, {}, {})",
        snapshot.index,
        transport.name,
        transport.kind_name(),
        transport.level,
        state
    );

    if let Some(dir) = transport.as_directory() {
        println!("      Directory: {}", dir.directory.display());
        println!(
            "      Cycle size: {} bytes, file limit: {}, header: {}",
            dir.cycle_size, dir.file_limit, dir.header
        );
        for file in dir.tracked_files.iter() {
            println!(
                "      {} ({} bytes, last write {})",
                file.filename,
                file.size,
                file.last_write.format("%Y-%m-%d %H:%M:%S")
            );
        }
    } else if let applog_core::TransportKind::File(f) = &transport.kind {
        println!("      File: {}", f.file.display());
    }

    if snapshot.pending > 0 || snapshot.dropped > 0 {
        println!(
            "      Pending: {} lines ({} dropped)",
            snapshot.pending, snapshot.dropped
        );
    }
}

fn print_status(logger: &Logger) {
    let snapshots = logger.transports();
    if snapshots.is_empty() {
        println!("No transports configured.");
        return;
    }
    println!("Transports ({}):", snapshots.len());
    for snapshot in &snapshots {
        print_transport(snapshot);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let metadata_path = cli.metadata.unwrap_or_else(default_metadata_path);
    let (logger, report) = init(&metadata_path)?;

    match cli.command {
        Commands::Init => {
            println!("Metadata: {}", report.metadata_path.display());
            if report.created_sidecar {
                println!("  Created metadata file");
            }
            if report.seeded_defaults {
                println!("  Seeded default transports");
            }
            println!("Transports: {}", report.transports);
            for index in &report.prepared {
                println!("  Prepared transport {}", index);
            }
            for failure in &report.failures {
                println!(
                    "  Transport {} ({}) unusable: {}",
                    failure.index, failure.name, failure.error
                );
            }
        }

        Commands::Status => {
            println!("Metadata: {}", metadata_path.display());
            print_status(&logger);
        }

        Commands::Log {
            level,
            message,
            module,
            function,
        } => {
            let outcomes = logger.emit_named(&level, &module, &function, message);
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.delivery {
                    // Handlers only exist inside the process that registers them
                    Delivery::Failed(LogError::Unbound(_)) => {
                        eprintln!("  {}: skipped, callback has no handler here", outcome.name);
                    }
                    Delivery::Failed(e) => {
                        eprintln!("  {}: {}", outcome.name, e);
                        failed += 1;
                    }
                    _ => {}
                }
            }
            if failed > 0 {
                bail!("{} of {} transports failed", failed, outcomes.len());
            }
        }

        Commands::Test => {
            for (level, outcomes) in logger.self_test() {
                let delivered = outcomes.iter().filter(|o| o.delivery.is_delivered()).count();
                println!(
                    "{:>5}: delivered to {} of {}",
                    level.as_str(),
                    delivered,
                    outcomes.len()
                );
            }
        }

        Commands::Add { transport } => {
            let transport = match transport {
                AddTransport::Directory {
                    name,
                    directory,
                    level,
                    cycle_size,
                    file_limit,
                    no_header,
                } => {
                    let mut dir = DirectoryTransport::new(directory).with_header(!no_header);
                    if let Some(size) = cycle_size {
                        dir = dir.with_cycle_size(size);
                    }
                    if let Some(limit) = file_limit {
                        dir = dir.with_file_limit(limit);
                    }
                    Transport::new(name, level, dir)
                }
                AddTransport::File { name, path, level } => {
                    Transport::file(name, path).with_level(level)
                }
                AddTransport::Stream {
                    target,
                    level,
                    colour,
                } => Transport::stream(target, colour).with_level(level),
            };
            let name = transport.name.clone();
            let index = logger.add_transport(transport)?;
            println!("Added transport {} at index {}", name, index);
        }

        Commands::Remove { index } => {
            let name = logger.remove_transport(index)?;
            println!("Removed transport {} ({})", index, name);
        }

        Commands::Enable { index } => {
            logger.set_enabled(index, true)?;
            println!("Enabled transport {}", index);
        }

        Commands::Disable { index } => {
            logger.set_enabled(index, false)?;
            println!("Disabled transport {}", index);
        }
    }

    logger.flush_metadata()?;
    Ok(())
}
