//! applog Core Library
//!
//! Leveled, in-process logging routed to configurable transports, with
//! size-based rotation that survives restarts.
//!
//! ## Overview
//!
//! A [`Logger`] holds an ordered list of transports. Every record is offered
//! to each of them and delivered when its severity is at least as severe as
//! the transport's threshold:
//!
//! - **directory**: rotating files `<name><index>.log`, bounded in size and count
//! - **file**: one fixed file, appended to forever
//! - **stream**: stdout or stderr, optionally coloured
//! - **callback**: a user handler
//!
//! Directory transports keep a ledger of the files they own. The ledger is
//! persisted in a metadata sidecar (`.log_information.json`) so a restarted
//! process continues the same rotation instead of starting over.
//!
//! ## Quick Start
//!
//! ```ignore
//! use applog_core::{init, Severity};
//!
//! fn main() -> Result<(), applog_core::LogError> {
//!     let (logger, report) = init("/var/lib/app/.log_information.json")?;
//!     for failure in &report.failures {
//!         eprintln!("transport {} unusable: {}", failure.name, failure.error);
//!     }
//!
//!     logger.log(Severity::Info, "server", "main", "listening on :8080");
//!     Ok(())
//! }
//! ```
//!
//! ### Forwarding `tracing` events
//!
//! ```ignore
//! use std::sync::Arc;
//! use applog_core::{init, TransportLayer};
//! use tracing_subscriber::prelude::*;
//!
//! let (logger, _) = init(path)?;
//! tracing_subscriber::registry()
//!     .with(TransportLayer::new(Arc::new(logger)))
//!     .init();
//! ```

pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod layer;
pub mod ledger;
pub mod level;
pub mod metadata;
pub mod record;
pub mod rotation;
pub mod transport;

// Re-exports
pub use bootstrap::{init, InitReport, LoggerBuilder};
pub use dispatch::{
    Delivery, Logger, TransportFailure, TransportOutcome, TransportSnapshot, PENDING_LIMIT,
};
pub use error::{ErrorClass, LogError, LogResult};
pub use layer::TransportLayer;
pub use ledger::{append_new, AppendOutcome, Ledger, TrackedFile};
pub use level::{admits, rank, Severity};
pub use metadata::{MetadataDocument, MetadataStore, METADATA_FILE_NAME};
pub use record::LogRecord;
pub use rotation::{cycle, CycleOutcome, RotationState, Transition};
pub use transport::{
    parse_transport, CallbackHandler, CallbackTransport, ConfigIssue, DirectoryTransport,
    FileTransport, StreamTarget, StreamTransport, Transport, TransportKind, DEFAULT_CYCLE_SIZE,
    DEFAULT_FILE_LIMIT,
};
