// packages/engine/src/recording/writer.rs
//! Durable event log writer
//!
//! Appends are lock-free pushes into a bounded queue. A background task drains
//! the queue on a timer, when a full batch is waiting, or on request, and
//! writes each batch as compressed JSON through [`EventStorage`].
//!
//! ```text
//! append() → EventQueue → writer task → Batch → zstd → SQLite + files
//! ```

use crate::probe::{ClassId, ProbeId};
use crate::recording::compressor::{CompressionLevel, Compressor};
use crate::recording::event::{LogEntry, RecordedEvent};
use crate::recording::event_queue::{EventQueue, QueueStats};
use crate::recording::sink::Sink;
use crate::recording::storage::{EventStorage, StorageConfig};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Entries per compressed batch
    pub batch_size: usize,

    /// Flush interval (milliseconds)
    pub flush_interval_ms: u64,

    pub compression_level: CompressionLevel,

    pub storage: StorageConfig,

    /// Queue capacity; appends beyond it fail
    pub max_queue_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_interval_ms: 100,
            compression_level: CompressionLevel::Fast,
            storage: StorageConfig::default(),
            max_queue_size: 1_000_000,
        }
    }
}

impl From<&EngineConfig> for WriterConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.recording.batch_size,
            flush_interval_ms: config.recording.flush_interval_ms,
            compression_level: config.recording.compression_level,
            storage: config.storage.clone(),
            max_queue_size: config.recording.max_queue_size,
        }
    }
}

enum WriterCommand {
    Flush(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

#[derive(Debug, Default)]
struct WriterCounters {
    entries_flushed: AtomicU64,
    batches_flushed: AtomicU64,
    bytes_written: AtomicU64,
    flush_failures: AtomicU64,
    class_failures: AtomicU64,
    total_flush_time_us: AtomicU64,
}

/// Sink persisting events through [`EventStorage`]
pub struct EventLogWriter {
    config: WriterConfig,
    queue: Arc<EventQueue>,
    storage: Arc<EventStorage>,
    compressor: Arc<Compressor>,
    batch_ready: Arc<Notify>,
    control: mpsc::UnboundedSender<WriterCommand>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<WriterCommand>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<WriterCounters>,
}

impl EventLogWriter {
    /// Open storage and prepare the writer. Call [`EventLogWriter::start`]
    /// from within a tokio runtime before appending.
    pub async fn new(config: WriterConfig) -> Result<Self> {
        info!("Initializing event log writer");

        let queue = Arc::new(EventQueue::new(config.max_queue_size.max(1)));
        let storage = Arc::new(EventStorage::new(config.storage.clone()).await?);
        let compressor = Arc::new(Compressor::new(config.compression_level));
        let (control, control_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            queue,
            storage,
            compressor,
            batch_ready: Arc::new(Notify::new()),
            control,
            control_rx: Mutex::new(Some(control_rx)),
            writer_handle: Mutex::new(None),
            counters: Arc::new(WriterCounters::default()),
        })
    }

    /// Spawn the background writer task
    pub fn start(&self) -> Result<()> {
        let mut control_rx = self.control_rx.lock().take().ok_or_else(|| {
            EngineError::RecordingFailed("Event log writer already started".to_string())
        })?;

        info!("Starting background event log writer");

        let queue = Arc::clone(&self.queue);
        let storage = Arc::clone(&self.storage);
        let compressor = Arc::clone(&self.compressor);
        let batch_ready = Arc::clone(&self.batch_ready);
        let counters = Arc::clone(&self.counters);
        let batch_size = self.config.batch_size.max(1);
        let flush_interval = Duration::from_millis(self.config.flush_interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            let mut batch = Vec::with_capacity(batch_size);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = Self::drain(&queue, &mut batch, batch_size, &storage, &compressor, &counters).await {
                            error!("Failed to flush batch: {}", e);
                        }
                    }

                    _ = batch_ready.notified() => {
                        if let Err(e) = Self::drain(&queue, &mut batch, batch_size, &storage, &compressor, &counters).await {
                            error!("Failed to flush batch: {}", e);
                        }
                    }

                    command = control_rx.recv() => {
                        let result = Self::drain(&queue, &mut batch, batch_size, &storage, &compressor, &counters).await;
                        match command {
                            Some(WriterCommand::Flush(ack)) => {
                                let _ = ack.send(result);
                            }
                            Some(WriterCommand::Shutdown(ack)) => {
                                let _ = ack.send(result);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            debug!("Event log writer stopped");
        });

        *self.writer_handle.lock() = Some(handle);
        Ok(())
    }

    /// Queue one entry
    pub fn record(&self, entry: LogEntry) -> Result<()> {
        self.queue.push(entry).map_err(|_| {
            EngineError::SinkFailed("Event queue full".to_string())
        })?;

        if self.queue.len() >= self.config.batch_size {
            self.batch_ready.notify_one();
        }
        Ok(())
    }

    /// Write everything queued so far; resolves once it is stored
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.control
            .send(WriterCommand::Flush(ack))
            .map_err(|_| EngineError::RecordingFailed("Event log writer not running".to_string()))?;

        done.await
            .map_err(|_| EngineError::RecordingFailed("Event log writer stopped".to_string()))?
    }

    /// Flush and stop the background task
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down event log writer");

        let (ack, done) = oneshot::channel();
        let flushed = match self.control.send(WriterCommand::Shutdown(ack)) {
            Ok(()) => done.await.unwrap_or(Ok(())),
            Err(_) => Ok(()),
        };

        let handle = self.writer_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Event log writer task failed: {}", e);
            }
        }

        flushed
    }

    /// Move queued entries into `batch`, storing every full batch and then
    /// the remainder
    async fn drain(
        queue: &EventQueue,
        batch: &mut Vec<LogEntry>,
        batch_size: usize,
        storage: &EventStorage,
        compressor: &Compressor,
        counters: &WriterCounters,
    ) -> Result<()> {
        loop {
            let room = batch_size - batch.len();
            let moved = queue.drain_into(batch, room);

            if batch.len() >= batch_size || (moved == 0 && !batch.is_empty()) {
                Self::flush_batch(batch, storage, compressor, counters).await?;
            }
            if moved == 0 {
                return Ok(());
            }
        }
    }

    /// Write one batch. Best effort: a batch whose write fails is dropped and
    /// counted in `flush_failures`. A failed class row does not fail the
    /// flush since the entries are already stored.
    async fn flush_batch(
        batch: &mut Vec<LogEntry>,
        storage: &EventStorage,
        compressor: &Compressor,
        counters: &WriterCounters,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let entries = std::mem::take(batch);

        let result = async {
            let compressed = compressor.encode_batch(&entries)?;
            storage.write_batch(&compressed, entries.len()).await?;
            Ok::<usize, EngineError>(compressed.len())
        }
        .await;

        match result {
            Ok(bytes) => {
                for entry in &entries {
                    if let LogEntry::Weave {
                        class_id,
                        probe_ids,
                    } = entry
                    {
                        if let Err(e) = storage.record_class(*class_id, probe_ids).await {
                            counters.class_failures.fetch_add(1, Ordering::Relaxed);
                            warn!("Class {} stored without its index row: {}", class_id, e);
                        }
                    }
                }

                let elapsed = start.elapsed();
                counters
                    .entries_flushed
                    .fetch_add(entries.len() as u64, Ordering::Relaxed);
                counters.batches_flushed.fetch_add(1, Ordering::Relaxed);
                counters.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
                counters
                    .total_flush_time_us
                    .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

                debug!("Flushed {} entries in {:?}", entries.len(), elapsed);
                Ok(())
            }
            Err(e) => {
                counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dropped batch of {} entries: {}", entries.len(), e);
                Err(e)
            }
        }
    }

    pub fn storage(&self) -> &EventStorage {
        &self.storage
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    /// Events stored so far (call [`EventLogWriter::flush`] first)
    pub async fn read_events(&self) -> Result<Vec<RecordedEvent>> {
        self.storage.read_events(&self.compressor).await
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn stats(&self) -> WriterStats {
        let queue = self.queue.stats();
        WriterStats {
            entries_queued: queue.push_count,
            entries_dropped: queue.drop_count,
            entries_flushed: self.counters.entries_flushed.load(Ordering::Relaxed),
            batches_flushed: self.counters.batches_flushed.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            class_failures: self.counters.class_failures.load(Ordering::Relaxed),
            total_flush_time_us: self.counters.total_flush_time_us.load(Ordering::Relaxed),
        }
    }
}

impl Sink for EventLogWriter {
    fn append(&self, probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> Result<()> {
        self.record(LogEntry::Event(RecordedEvent::now(probe_id, value, payload)))
    }

    fn append_anchor(&self, probe_id: ProbeId, object_id: i64, correlation_id: i64) -> Result<()> {
        self.record(LogEntry::Event(RecordedEvent::anchor(
            probe_id,
            object_id,
            correlation_id,
        )))
    }

    fn register_batch(&self, class_id: ClassId, probe_ids: &[ProbeId]) -> Result<()> {
        self.record(LogEntry::Weave {
            class_id,
            probe_ids: probe_ids.to_vec(),
        })
    }
}

/// Writer statistics
#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    pub entries_queued: u64,
    pub entries_dropped: u64,
    pub entries_flushed: u64,
    pub batches_flushed: u64,
    pub bytes_written: u64,
    pub flush_failures: u64,
    /// Class registrations whose index row could not be written
    pub class_failures: u64,
    pub total_flush_time_us: u64,
}

impl WriterStats {
    pub fn avg_flush_time_us(&self) -> u64 {
        if self.batches_flushed == 0 {
            0
        } else {
            self.total_flush_time_us / self.batches_flushed
        }
    }
}
