//! Per-project batching of row data.
//!
//! Every project gets its own [`Batcher`]. A batcher owns a background task that buffers incoming
//! rows and hands them to a [`BatchHandler`] once the batch is full, once the oldest buffered row
//! has waited for the configured timeout, or when a flush is requested. The handler runs on the
//! batcher's task, so a slow upload only holds up the project it belongs to.

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};

use crate::{internal_events::BatchFlushed, view::RowData};

pub const DEFAULT_MAX_EVENTS: usize = 10;
pub const DEFAULT_MAX_BYTES: usize = 1_000_000;
pub const DEFAULT_BUFFER_MAX_BYTES: usize = 1_000_000_000;
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

#[derive(Debug, Snafu, PartialEq)]
pub enum BatchError {
    #[snafu(display("`max_events` must be greater than zero"))]
    ZeroMaxEvents,
    #[snafu(display("`max_bytes` must be greater than zero"))]
    ZeroMaxBytes,
    #[snafu(display("`timeout_secs` must be positive and finite, got {timeout_secs}"))]
    InvalidTimeout { timeout_secs: f64 },
    #[snafu(display(
        "`item_max_bytes` ({item_max_bytes}) exceeds `buffer_max_bytes` ({buffer_max_bytes})"
    ))]
    ItemLargerThanBuffer {
        item_max_bytes: usize,
        buffer_max_bytes: usize,
    },
}

/// Batching configuration shared by all projects.
///
/// Each project is batched separately, so the limits apply per project.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// The maximum number of rows in a batch before it is flushed.
    pub max_events: Option<usize>,

    /// The estimated size in bytes a batch may reach before it is flushed.
    pub max_bytes: Option<usize>,

    /// Rows whose estimated size exceeds this limit bypass batching and are uploaded on their own.
    ///
    /// There is no limit by default.
    pub item_max_bytes: Option<usize>,

    /// The maximum number of bytes buffered for a project. Rows that would exceed it are rejected.
    pub buffer_max_bytes: Option<usize>,

    /// The maximum age, in seconds, of a buffered row before its batch is flushed.
    pub timeout_secs: Option<f64>,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<BatchSettings, BatchError> {
        let max_events = self.max_events.unwrap_or(DEFAULT_MAX_EVENTS);
        if max_events == 0 {
            return Err(BatchError::ZeroMaxEvents);
        }
        let max_bytes = self.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);
        if max_bytes == 0 {
            return Err(BatchError::ZeroMaxBytes);
        }
        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(BatchError::InvalidTimeout { timeout_secs });
        }
        let buffer_max_bytes = self.buffer_max_bytes.unwrap_or(DEFAULT_BUFFER_MAX_BYTES);
        if let Some(item_max_bytes) = self.item_max_bytes.filter(|max| *max > buffer_max_bytes) {
            return Err(BatchError::ItemLargerThanBuffer {
                item_max_bytes,
                buffer_max_bytes,
            });
        }

        Ok(BatchSettings {
            max_events,
            max_bytes,
            item_max_bytes: self.item_max_bytes,
            buffer_max_bytes,
            timeout: Duration::from_secs_f64(timeout_secs),
        })
    }
}

/// Validated batching limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_events: usize,
    pub max_bytes: usize,
    pub item_max_bytes: Option<usize>,
    pub buffer_max_bytes: usize,
    pub timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_bytes: DEFAULT_MAX_BYTES,
            item_max_bytes: None,
            buffer_max_bytes: DEFAULT_BUFFER_MAX_BYTES,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum BundleError {
    #[snafu(display("item of {size} bytes exceeds the bundle item limit of {limit} bytes"))]
    Oversized { size: usize, limit: usize },

    #[snafu(display("buffered data would exceed the limit of {limit} bytes"))]
    Overflow { limit: usize },

    #[snafu(display("bundler is closed"))]
    Closed,
}

/// Accumulates rows and hands them off in batches.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Queues a row. Never waits.
    ///
    /// [`BundleError::Oversized`] means the row was not queued because it is too large for any
    /// batch; the caller is expected to upload it some other way.
    fn add(&self, row: &RowData) -> Result<(), BundleError>;

    /// Hands every queued row to the handler and waits until the handler is done with them.
    async fn flush(&self);

    /// Flushes and stops accepting rows.
    async fn close(&self);
}

/// Receives the batches formed by a [`Batcher`].
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    async fn handle(&self, rows: Vec<RowData>);
}

enum Command {
    Add { row: RowData, size: usize },
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// The [`Bundler`] used by the exporter.
///
/// Creating a batcher spawns its worker task, so it must happen inside a Tokio runtime. Dropping
/// the batcher flushes whatever is still buffered.
pub struct Batcher {
    settings: BatchSettings,
    buffered_bytes: Arc<AtomicUsize>,
    sender: mpsc::UnboundedSender<Command>,
}

impl Batcher {
    pub fn new(
        name: impl Into<String>,
        settings: BatchSettings,
        handler: Arc<dyn BatchHandler>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let buffered_bytes = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            name: name.into(),
            settings,
            handler,
            buffered_bytes: Arc::clone(&buffered_bytes),
            receiver,
            batch: Vec::new(),
            batch_bytes: 0,
            deadline: None,
        };
        tokio::spawn(worker.run());

        Self {
            settings,
            buffered_bytes,
            sender,
        }
    }

    /// Estimated bytes of rows that were added and whose handler call has not returned yet.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Acquire)
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(command(done)).is_ok() {
            // Dropped unanswered only when the worker exits.
            _ = wait.await;
        }
    }
}

#[async_trait]
impl Bundler for Batcher {
    fn add(&self, row: &RowData) -> Result<(), BundleError> {
        let size = row.estimated_size();
        if let Some(limit) = self.settings.item_max_bytes.filter(|limit| size > *limit) {
            return Err(BundleError::Oversized { size, limit });
        }

        let limit = self.settings.buffer_max_bytes;
        self.buffered_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |buffered| {
                buffered
                    .checked_add(size)
                    .filter(|buffered| *buffered <= limit)
            })
            .map_err(|_| BundleError::Overflow { limit })?;

        let row = row.clone();
        self.sender.send(Command::Add { row, size }).map_err(|_| {
            self.buffered_bytes.fetch_sub(size, Ordering::AcqRel);
            BundleError::Closed
        })
    }

    async fn flush(&self) {
        self.request(Command::Flush).await;
    }

    async fn close(&self) {
        self.request(Command::Close).await;
    }
}

struct Worker {
    name: String,
    settings: BatchSettings,
    handler: Arc<dyn BatchHandler>,
    buffered_bytes: Arc<AtomicUsize>,
    receiver: mpsc::UnboundedReceiver<Command>,
    batch: Vec<RowData>,
    batch_bytes: usize,
    deadline: Option<Instant>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let command = tokio::select! {
                command = self.receiver.recv() => command,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush().await;
                    continue;
                }
            };

            match command {
                Some(Command::Add { row, size }) => {
                    if self.batch.is_empty() {
                        self.deadline = Some(Instant::now() + self.settings.timeout);
                    }
                    self.batch.push(row);
                    self.batch_bytes += size;
                    if self.batch.len() >= self.settings.max_events
                        || self.batch_bytes >= self.settings.max_bytes
                    {
                        self.flush().await;
                    }
                }
                Some(Command::Flush(done)) => {
                    self.flush().await;
                    _ = done.send(());
                }
                Some(Command::Close(done)) => {
                    self.receiver.close();
                    // Rows added before the channel closed were accepted and must still go out.
                    let mut waiting = vec![done];
                    while let Ok(command) = self.receiver.try_recv() {
                        match command {
                            Command::Add { row, size } => {
                                self.batch.push(row);
                                self.batch_bytes += size;
                            }
                            Command::Flush(done) | Command::Close(done) => waiting.push(done),
                        }
                    }
                    self.flush().await;
                    for done in waiting {
                        _ = done.send(());
                    }
                    break;
                }
                None => {
                    self.flush().await;
                    break;
                }
            }
        }
    }

    async fn flush(&mut self) {
        self.deadline = None;
        if self.batch.is_empty() {
            return;
        }

        let rows = mem::take(&mut self.batch);
        let byte_size = mem::take(&mut self.batch_bytes);
        emit!(BatchFlushed {
            project_id: &self.name,
            count: rows.len(),
            byte_size,
        });
        self.handler.handle(rows).await;
        // Rows being uploaded still count against the buffer limit.
        self.buffered_bytes.fetch_sub(byte_size, Ordering::AcqRel);
    }
}
