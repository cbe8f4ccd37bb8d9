// packages/engine/src/lib.rs
//! Probelog Recording Engine Library
//!
//! Records the values flowing through instrumented code into an ordered event
//! log, assigns stable surrogate ids to observed objects, serializes a
//! selected subset of them, and correlates the eventual outcome of futures and
//! streams back to the call that produced them.
//!
//! # Architecture
//!
//! - **policy**: which event categories are captured
//! - **probe**: probe descriptors and weave batches
//! - **identity**: surrogate object ids
//! - **exclusion**: type-name prefixes never deeply serialized
//! - **recording**: the engine, sinks, durable log writer and exporter
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```
//! use probelog_engine::recording::{MemorySink, RecordingEngine, Scalar};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let engine = RecordingEngine::builder().sink(sink.clone()).build().unwrap();
//!
//! let value = engine.record_scalar(1, Scalar::Int(42));
//! assert_eq!(value, Scalar::Int(42));
//! assert_eq!(sink.events()[0].value, 42);
//! ```

// Public module exports
pub mod exclusion;
pub mod identity;
pub mod observability;
pub mod policy;
pub mod probe;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use policy::{CapturePolicy, Category, DetailLevel};
pub use probe::{ClassId, EventKind, ObjectId, Probe, ProbeId, ValueDescriptor, WeaveBatch};
pub use recording::{ObjectRef, Observed, Recordable, RecordingEngine, Scalar, Sink};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
