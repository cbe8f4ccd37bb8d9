// packages/engine/src/recording/mod.rs
//! Event recording and storage
//!
//! - **Engine**: turns probe firings into events; identity, selective
//!   serialization, async correlation
//! - **Sinks**: where events go (`DiscardSink`, `MemorySink`, `EventLogWriter`)
//! - **Event Queue**: lock-free bounded queue in front of the writer
//! - **Compressor**: zstd batch compression
//! - **Storage**: SQLite + file system persistence
//! - **Exporter**: JSON / JSON Lines export and correlation join
//!
//! # Architecture
//!
//! ```text
//! probe → RecordingEngine ──→ Sink
//!              │                └─ EventLogWriter → EventQueue → writer task
//!              │                                                   ↓
//!              └─ Correlated / CorrelatedStream          Batch → zstd → SQLite + files
//!                    (completion events, later)
//! ```

pub mod async_producer;
pub mod codec;
pub mod compressor;
pub mod correlation;
pub mod engine;
pub mod event;
pub mod event_queue;
pub mod exporter;
pub mod guard;
pub mod scalar;
pub mod sink;
pub mod storage;
pub mod value;
pub mod writer;

// Re-export commonly used types
pub use async_producer::{Correlated, CorrelatedStream};
pub use codec::{Codec, JsonCodec};
pub use compressor::{CompressionLevel, Compressor};
pub use correlation::{CorrelationClock, CorrelationTable, PendingCorrelation};
pub use engine::{EngineStats, RecordingEngine, RecordingEngineBuilder};
pub use event::{LogEntry, RecordedEvent};
pub use event_queue::{EventQueue, QueueStats};
pub use exporter::{correlate, CorrelatedCall, ExportFormat, Exporter};
pub use guard::SuppressGuard;
pub use scalar::Scalar;
pub use sink::{DiscardSink, MemorySink, Sink};
pub use storage::{EventStorage, StorageConfig};
pub use value::{BoundedCompletion, Completion, ObjectRef, Observed, Recordable, Shape, TypeTag};
pub use writer::{EventLogWriter, WriterConfig, WriterStats};
