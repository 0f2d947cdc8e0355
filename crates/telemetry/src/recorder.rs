//! Channel-fed usage recorder with a single appending writer task.

use crate::TelemetryError;
use folio_core::usage::{UsageRecord, UsageSink};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// File name of the partition holding records for `date` (`YYYY-MM-DD`).
pub fn partition_file_name(date: &str) -> String {
    format!("usage-{date}.log")
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Best-effort usage log.
///
/// `record` never blocks: when the queue is full the record is dropped and
/// a warning logged. Call `shutdown` to flush queued records before exit.
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageRecord>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    log_dir: PathBuf,
}

impl UsageRecorder {
    /// Create the log directory and start the writer task.
    pub async fn start(
        log_dir: impl Into<PathBuf>,
        capacity: usize,
    ) -> Result<Self, TelemetryError> {
        let log_dir = log_dir.into();
        tokio::fs::create_dir_all(&log_dir)
            .await
            .map_err(|e| TelemetryError::LogDir {
                path: log_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());

        let writer = PartitionWriter {
            dir: log_dir.clone(),
            current: None,
            counters: counters.clone(),
        };
        let handle = tokio::spawn(writer.run(rx, stop_rx));

        info!(dir = %log_dir.display(), capacity, "Usage recorder started");

        Ok(Self {
            tx,
            stop: Mutex::new(Some(stop_tx)),
            writer: Mutex::new(Some(handle)),
            counters,
            log_dir,
        })
    }

    pub async fn from_config(config: &folio_config::UsageConfig) -> Result<Self, TelemetryError> {
        Self::start(&config.log_dir, config.channel_capacity).await
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Records appended so far.
    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    /// Records discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Records that reached the writer but could not be appended.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Stop accepting records, write everything already queued, and wait
    /// for the writer to finish. Later calls return immediately.
    pub async fn shutdown(&self) {
        let stop = self.stop.lock().ok().and_then(|mut s| s.take());
        if let Some(stop) = stop {
            let _ = stop.send(());
        }

        let handle = self.writer.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Usage writer task ended abnormally");
            }
            info!(
                written = self.written(),
                dropped = self.dropped(),
                failed = self.failed(),
                "Usage recorder drained"
            );
        }
    }
}

impl UsageSink for UsageRecorder {
    fn record(&self, record: UsageRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    model = %record.model,
                    caller = %record.caller,
                    "Usage queue full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(model = %record.model, "Usage recorder stopped, dropping record");
            }
        }
    }
}

/// Owns the open partition file; runs inside the writer task.
struct PartitionWriter {
    dir: PathBuf,
    current: Option<(String, File)>,
    counters: Arc<Counters>,
}

impl PartitionWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<UsageRecord>, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                record = rx.recv() => match record {
                    Some(record) => self.append(record).await,
                    None => break,
                },
                _ = &mut stop => {
                    rx.close();
                    while let Some(record) = rx.recv().await {
                        self.append(record).await;
                    }
                    break;
                }
            }
        }

        if let Some((_, mut file)) = self.current.take() {
            if let Err(e) = file.flush().await {
                warn!(error = %e, "Failed to flush usage log");
            }
        }
    }

    async fn append(&mut self, record: UsageRecord) {
        let line = record.to_line();
        let partition = record.partition();

        // A line counts as written only once flushed.
        let result = match self.file_for(&partition).await {
            Ok(file) => match file.write_all(line.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.current = None;
                warn!(
                    partition = %partition,
                    error = %e,
                    "Failed to append usage record"
                );
            }
        }
    }

    /// The open file for `partition`, rolling over when the date changes.
    async fn file_for(&mut self, partition: &str) -> std::io::Result<&mut File> {
        let stale = self
            .current
            .as_ref()
            .is_none_or(|(open, _)| open.as_str() != partition);

        if stale {
            if let Some((previous, mut file)) = self.current.take() {
                if let Err(e) = file.flush().await {
                    warn!(partition = %previous, error = %e, "Failed to flush usage partition");
                }
            }

            let path = self.dir.join(partition_file_name(partition));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            debug!(path = %path.display(), "Opened usage partition");
            self.current = Some((partition.to_string(), file));
        }

        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(std::io::Error::other("usage partition not open")),
        }
    }
}
