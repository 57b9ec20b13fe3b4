//! Transport dispatcher.
//!
//! A [`Logger`] owns an ordered list of transports and the metadata store
//! they persist through. Each transport sits in its own slot behind a
//! mutex that is held for the whole refresh, rotate, persist and append
//! sequence, so two records for the same directory never race while
//! different transports proceed independently.
//!
//! Lock order is slot list → slot → store. The store never takes a slot
//! lock, and the slot list lock is only held long enough to clone handles.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::warn;

use crate::error::{LogError, LogResult};
use crate::format;
use crate::ledger;
use crate::level::Severity;
use crate::metadata::{MetadataStore, SlotId};
use crate::record::LogRecord;
use crate::rotation::{self, CycleOutcome, Transition};
use crate::transport::{
    parse_transport, CallbackHandler, ConfigIssue, StreamTarget, Transport, TransportKind,
};

/// Lines kept per transport while its target cannot be written.
pub const PENDING_LIMIT: usize = 64;

/// What happened to one record on one transport.
#[derive(Debug)]
pub enum Delivery {
    /// Written. `target` is the file appended to, if any.
    Delivered { target: Option<PathBuf> },
    /// Rotation was due but failed; the line went to the still-current file
    Fallback { target: PathBuf, error: LogError },
    /// Level below the transport's threshold
    Filtered,
    Disabled,
    Failed(LogError),
}

impl Delivery {
    /// True if the line reached its transport, fallback included.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. } | Delivery::Fallback { .. })
    }

    pub fn error(&self) -> Option<&LogError> {
        match self {
            Delivery::Fallback { error, .. } => Some(error),
            Delivery::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TransportOutcome {
    /// Position in the logger's transport list
    pub index: usize,
    pub name: String,
    pub delivery: Delivery,
}

/// Point-in-time view of one transport.
#[derive(Debug, Clone)]
pub struct TransportSnapshot {
    pub index: usize,
    pub name: String,
    /// The parsed transport, or why its persisted entry is unusable
    pub config: Result<Transport, ConfigIssue>,
    /// Serialized form as persisted
    pub raw: Value,
    /// Lines waiting for a retry
    pub pending: usize,
    /// Lines discarded because the retry queue was full
    pub dropped: u64,
}

/// A transport that could not be brought up.
#[derive(Debug)]
pub struct TransportFailure {
    pub index: usize,
    pub name: String,
    pub error: LogError,
}

#[derive(Debug, Default)]
struct RetryQueue {
    lines: VecDeque<String>,
    dropped: u64,
}

impl RetryQueue {
    fn push(&mut self, line: String) {
        if self.lines.len() >= PENDING_LIMIT {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    /// Append queued lines and then `line` to `path` in one write.
    /// On failure `line` joins the queue.
    fn append(&mut self, path: &Path, line: String) -> LogResult<()> {
        let mut text = String::new();
        for queued in &self.lines {
            text.push_str(queued);
        }
        text.push_str(&line);

        match append_to(path, &text) {
            Ok(()) => {
                self.lines.clear();
                Ok(())
            }
            Err(e) => {
                self.push(line);
                Err(e)
            }
        }
    }
}

fn append_to(path: &Path, text: &str) -> LogResult<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

fn write_stream(target: StreamTarget, line: &str) -> io::Result<()> {
    match target {
        StreamTarget::Stdout => writeln!(io::stdout().lock(), "{}", line),
        StreamTarget::Stderr => writeln!(io::stderr().lock(), "{}", line),
    }
}

enum SlotConfig {
    Ready(Transport),
    /// Kept verbatim so it is written back unchanged
    Invalid { raw: Value, issue: ConfigIssue },
}

impl SlotConfig {
    fn parse(raw: Value) -> Self {
        match parse_transport(&raw) {
            Ok(transport) => SlotConfig::Ready(transport),
            Err(issue) => {
                warn!(entry = %raw, issue = ?issue, "unusable transport entry in log metadata");
                SlotConfig::Invalid { raw, issue }
            }
        }
    }

    fn name(&self) -> String {
        match self {
            SlotConfig::Ready(t) => t.name.clone(),
            SlotConfig::Invalid { raw, .. } => raw
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
        }
    }

    fn enabled(&self) -> bool {
        match self {
            SlotConfig::Ready(t) => t.enabled,
            SlotConfig::Invalid { raw, .. } => {
                raw.get("enabled").and_then(Value::as_bool).unwrap_or(true)
            }
        }
    }

    fn to_value(&self) -> LogResult<Value> {
        match self {
            SlotConfig::Ready(t) => Ok(serde_json::to_value(t)?),
            SlotConfig::Invalid { raw, .. } => Ok(raw.clone()),
        }
    }
}

struct TransportSlot {
    id: SlotId,
    inner: Mutex<SlotInner>,
}

struct SlotInner {
    config: SlotConfig,
    queue: RetryQueue,
    /// Set once the slot left the transport list; in-flight emits must not
    /// write to it or put it back in the sidecar
    removed: bool,
}

impl TransportSlot {
    fn new(id: SlotId, config: SlotConfig) -> Self {
        Self {
            id,
            inner: Mutex::new(SlotInner {
                config,
                queue: RetryQueue::default(),
                removed: false,
            }),
        }
    }
}

/// Where a record goes once filtering passed.
enum Route {
    Directory,
    File(PathBuf),
    Stream {
        target: LogResult<StreamTarget>,
        colour: bool,
    },
    Callback(Option<CallbackHandler>),
}

/// An explicit logging state object: transports, their metadata and the
/// callback registry.
///
/// Independent loggers are independent instances; nothing is global.
pub struct Logger {
    process: String,
    slots: RwLock<Vec<Arc<TransportSlot>>>,
    store: Option<MetadataStore>,
    callbacks: RwLock<HashMap<String, CallbackHandler>>,
    next_id: AtomicU64,
}

impl Logger {
    /// In-memory logger with no transports and no metadata file.
    pub fn new(process: impl Into<String>) -> Self {
        Self::assemble(process.into(), None, Vec::new())
    }

    /// Logger persisting to the sidecar at `path`, starting from its raw entries.
    pub(crate) fn with_metadata(process: String, path: PathBuf, entries: Vec<Value>) -> Self {
        Self::assemble(process, Some(path), entries)
    }

    fn assemble(process: String, path: Option<PathBuf>, entries: Vec<Value>) -> Self {
        let mut slots = Vec::with_capacity(entries.len());
        let mut table = Vec::with_capacity(entries.len());
        for (id, raw) in entries.into_iter().enumerate() {
            let id = id as SlotId;
            table.push((id, raw.clone()));
            slots.push(Arc::new(TransportSlot::new(id, SlotConfig::parse(raw))));
        }
        let next_id = slots.len() as u64;

        Self {
            process,
            slots: RwLock::new(slots),
            store: path.map(|p| MetadataStore::new(p, table)),
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(next_id),
        }
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn metadata_path(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.path())
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Deliver `record` to every transport, in order.
    ///
    /// An empty `process` is filled with the logger's process name. Failures
    /// on one transport never affect the others.
    pub fn emit(&self, mut record: LogRecord) -> Vec<TransportOutcome> {
        if record.process.is_empty() {
            record.process = self.process.clone();
        }
        let slots = self.slots.read().clone();
        slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let (name, delivery) = self.deliver(slot, &record);
                outcome(index, name, delivery)
            })
            .collect()
    }

    pub fn log(
        &self,
        level: Severity,
        module: &str,
        function: &str,
        message: impl Into<String>,
    ) -> Vec<TransportOutcome> {
        self.emit(
            LogRecord::new(level, message)
                .with_module(module)
                .with_function(function),
        )
    }

    /// Like [`Logger::log`] with the level given by name.
    ///
    /// An unknown name fails every enabled transport with
    /// [`LogError::UnknownLevel`]; nothing is written.
    pub fn emit_named(
        &self,
        level: &str,
        module: &str,
        function: &str,
        message: impl Into<String>,
    ) -> Vec<TransportOutcome> {
        if let Ok(severity) = level.parse::<Severity>() {
            return self.log(severity, module, function, message);
        }
        let slots = self.slots.read().clone();
        slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let inner = slot.inner.lock();
                let delivery = if inner.config.enabled() {
                    Delivery::Failed(LogError::UnknownLevel(level.to_string()))
                } else {
                    Delivery::Disabled
                };
                outcome(index, inner.config.name(), delivery)
            })
            .collect()
    }

    /// Emit one record at every level, most severe first.
    pub fn self_test(&self) -> Vec<(Severity, Vec<TransportOutcome>)> {
        Severity::ALL
            .into_iter()
            .map(|level| {
                let outcomes = self.log(
                    level,
                    "applog",
                    "self_test",
                    format!("self test message at level {}", level),
                );
                (level, outcomes)
            })
            .collect()
    }

    /// Run the rotation engine on the directory transport at `index` without writing.
    pub fn cycle(&self, index: usize) -> LogResult<CycleOutcome> {
        let slot = self.slot(index)?;
        let mut inner = slot.inner.lock();
        if inner.removed {
            return Err(LogError::TransportNotFound(index));
        }
        match &mut inner.config {
            SlotConfig::Ready(transport) => {
                let outcome = rotation::cycle(transport)?;
                self.persist(slot.id, transport, outcome.transition != Transition::Continued);
                Ok(outcome)
            }
            SlotConfig::Invalid { issue, .. } => Err(issue.to_error()),
        }
    }

    /// Validate and append a transport. Returns its index.
    ///
    /// An enabled directory transport gets its first file right away.
    pub fn add_transport(&self, mut transport: Transport) -> LogResult<usize> {
        transport.validate()?;
        let needs_file = transport.enabled
            && transport
                .as_directory()
                .is_some_and(|d| d.tracked_files.is_empty());
        if needs_file {
            ledger::append_new(&mut transport)?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let value = serde_json::to_value(&transport)?;
        let slot = Arc::new(TransportSlot::new(id, SlotConfig::Ready(transport)));
        let index = {
            let mut slots = self.slots.write();
            slots.push(slot);
            slots.len() - 1
        };
        if let Some(store) = &self.store {
            store.record(id, value);
        }
        Ok(index)
    }

    /// Remove the transport at `index`. Its files stay on disk. Returns its name.
    pub fn remove_transport(&self, index: usize) -> LogResult<String> {
        let slot = {
            let mut slots = self.slots.write();
            if index >= slots.len() {
                return Err(LogError::TransportNotFound(index));
            }
            slots.remove(index)
        };
        let mut inner = slot.inner.lock();
        inner.removed = true;
        if let Some(store) = &self.store {
            store.forget(slot.id);
        }
        Ok(inner.config.name())
    }

    pub fn set_enabled(&self, index: usize, enabled: bool) -> LogResult<()> {
        let slot = self.slot(index)?;
        let mut inner = slot.inner.lock();
        if inner.removed {
            return Err(LogError::TransportNotFound(index));
        }
        match &mut inner.config {
            SlotConfig::Ready(transport) => transport.enabled = enabled,
            SlotConfig::Invalid { raw, .. } => {
                if let Some(entry) = raw.as_object_mut() {
                    entry.insert("enabled".to_string(), Value::Bool(enabled));
                }
            }
        }
        let value = inner.config.to_value()?;
        if let Some(store) = &self.store {
            store.record(slot.id, value);
        }
        Ok(())
    }

    /// Bind `handler` to every callback transport called `name`.
    ///
    /// A handler set directly on a transport takes precedence.
    pub fn register_callback<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&LogRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        self.callbacks.write().insert(name.into(), Arc::new(handler));
    }

    pub fn transports(&self) -> Vec<TransportSnapshot> {
        let slots = self.slots.read().clone();
        slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let inner = slot.inner.lock();
                TransportSnapshot {
                    index,
                    name: inner.config.name(),
                    config: match &inner.config {
                        SlotConfig::Ready(t) => Ok(t.clone()),
                        SlotConfig::Invalid { issue, .. } => Err(issue.clone()),
                    },
                    raw: inner.config.to_value().unwrap_or(Value::Null),
                    pending: inner.queue.lines.len(),
                    dropped: inner.queue.dropped,
                }
            })
            .collect()
    }

    /// Write the metadata sidecar now, if there is one.
    pub fn flush_metadata(&self) -> LogResult<()> {
        match &self.store {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    /// Create the first file of every enabled directory transport with an
    /// empty ledger. Returns the indices prepared and the failures.
    pub(crate) fn prepare_directories(&self) -> (Vec<usize>, Vec<TransportFailure>) {
        let mut prepared = Vec::new();
        let mut failures = Vec::new();
        let slots = self.slots.read().clone();

        for (index, slot) in slots.iter().enumerate() {
            let mut inner = slot.inner.lock();
            if inner.removed {
                continue;
            }
            let name = inner.config.name();
            let transport = match &mut inner.config {
                SlotConfig::Ready(t) => t,
                SlotConfig::Invalid { issue, .. } => {
                    failures.push(TransportFailure {
                        index,
                        name,
                        error: issue.to_error(),
                    });
                    continue;
                }
            };
            let needs_file = transport.enabled
                && transport
                    .as_directory()
                    .is_some_and(|d| d.tracked_files.is_empty());
            if !needs_file {
                continue;
            }
            match ledger::append_new(transport) {
                Ok(_) => {
                    self.persist(slot.id, transport, true);
                    prepared.push(index);
                }
                Err(error) => {
                    warn!(transport = %name, error = %error, "could not create first log file");
                    failures.push(TransportFailure { index, name, error });
                }
            }
        }
        (prepared, failures)
    }

    fn slot(&self, index: usize) -> LogResult<Arc<TransportSlot>> {
        self.slots
            .read()
            .get(index)
            .cloned()
            .ok_or(LogError::TransportNotFound(index))
    }

    fn deliver(&self, slot: &TransportSlot, record: &LogRecord) -> (String, Delivery) {
        let mut inner = slot.inner.lock();
        let name = inner.config.name();
        if inner.removed {
            return (name, Delivery::Disabled);
        }
        let SlotInner { config, queue, .. } = &mut *inner;

        let enabled = config.enabled();
        let transport = match config {
            SlotConfig::Ready(t) => t,
            SlotConfig::Invalid { issue, .. } => {
                let delivery = if enabled {
                    Delivery::Failed(issue.to_error())
                } else {
                    Delivery::Disabled
                };
                return (name, delivery);
            }
        };
        if !transport.enabled {
            return (name, Delivery::Disabled);
        }
        if !record.level.admits(transport.level) {
            return (name, Delivery::Filtered);
        }

        let route = match &transport.kind {
            TransportKind::Directory(_) => Route::Directory,
            TransportKind::File(f) => Route::File(f.file.clone()),
            TransportKind::Stream(s) => Route::Stream {
                target: transport.name.parse(),
                colour: s.colour,
            },
            TransportKind::Callback(c) => Route::Callback(
                c.handler
                    .clone()
                    .or_else(|| self.callbacks.read().get(&transport.name).cloned()),
            ),
        };

        let delivery = match route {
            Route::Directory => self.deliver_directory(slot.id, transport, queue, record),
            Route::File(path) => match queue.append(&path, format::file_line(record)) {
                Ok(()) => Delivery::Delivered { target: Some(path) },
                Err(e) => Delivery::Failed(e),
            },
            Route::Stream { target, colour } => {
                let line = format::stream_line(record, colour);
                match target.and_then(|t| write_stream(t, &line).map_err(LogError::from)) {
                    Ok(()) => Delivery::Delivered { target: None },
                    Err(e) => Delivery::Failed(e),
                }
            }
            Route::Callback(handler) => {
                // Handlers run unlocked so they may log through this logger
                drop(inner);
                invoke(&name, handler, record)
            }
        };
        (name, delivery)
    }

    fn deliver_directory(
        &self,
        id: SlotId,
        transport: &mut Transport,
        queue: &mut RetryQueue,
        record: &LogRecord,
    ) -> Delivery {
        let line = format::file_line(record);
        match rotation::cycle(transport) {
            Ok(cycled) => {
                self.persist(id, transport, cycled.transition != Transition::Continued);
                match queue.append(&cycled.target, line) {
                    Ok(()) => Delivery::Delivered {
                        target: Some(cycled.target),
                    },
                    Err(e) => Delivery::Failed(e),
                }
            }
            Err(LogError::RotationFailed { fallback, source }) => {
                match queue.append(&fallback, line) {
                    Ok(()) => Delivery::Fallback {
                        target: fallback,
                        error: *source,
                    },
                    Err(e) => Delivery::Failed(e),
                }
            }
            Err(e) => Delivery::Failed(e),
        }
    }

    /// Record `transport` in the store when its ledger changed, or when an
    /// earlier write failed and the sidecar is stale.
    fn persist(&self, id: SlotId, transport: &Transport, changed: bool) {
        let Some(store) = &self.store else {
            return;
        };
        if !changed && !store.is_dirty() {
            return;
        }
        match serde_json::to_value(transport) {
            Ok(value) => {
                store.record(id, value);
            }
            Err(e) => warn!(transport = %transport.name, error = %e, "could not serialize transport"),
        }
    }
}

fn outcome(index: usize, name: String, delivery: Delivery) -> TransportOutcome {
    if let Some(e) = delivery.error() {
        warn!(transport = %name, error = %e, "log delivery degraded");
    }
    TransportOutcome {
        index,
        name,
        delivery,
    }
}

fn invoke(name: &str, handler: Option<CallbackHandler>, record: &LogRecord) -> Delivery {
    let Some(handler) = handler else {
        return Delivery::Failed(LogError::Unbound(name.to_string()));
    };
    match panic::catch_unwind(AssertUnwindSafe(|| handler(record))) {
        Ok(Ok(())) => Delivery::Delivered { target: None },
        Ok(Err(msg)) => Delivery::Failed(LogError::Callback(msg)),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Delivery::Failed(LogError::Callback(format!("handler panicked: {}", msg)))
        }
    }
}
