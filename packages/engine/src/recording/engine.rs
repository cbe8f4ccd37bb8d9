// packages/engine/src/recording/engine.rs
//! Recording engine
//!
//! Turns probe firings into log events. Every reference value gets a surrogate
//! id; values at recordable probes are additionally serialized, unless their
//! type is excluded or a previous attempt failed. Futures and streams are
//! wrapped so their outcomes are written later under a correlation id.
//!
//! # Totality
//!
//! The `record_*` entry points never fail and never change the value they are
//! given. Serialization errors and panics are contained by permanently
//! excluding the probe and the object, sink errors are logged and counted.
//!
//! # Reentrancy
//!
//! All bookkeeping runs with the thread-local guard set, so instrumented code
//! reached from inside the engine (a `Serialize` impl, a sink) records nothing.

use crate::exclusion::ExclusionIndex;
use crate::identity::{IdentityStore, ObjectIdMap};
use crate::observability::{
    ASYNC_COMPLETIONS_TOTAL, EVENTS_TOTAL, PROBES_EXCLUDED_TOTAL, SERIALIZATION_FAILURES_TOTAL,
    SERIALIZED_TOTAL, SINK_FAILURES_TOTAL,
};
use crate::policy::CapturePolicy;
use crate::probe::{ClassId, ObjectId, Probe, ProbeId, WeaveBatch, NULL_OBJECT_ID};
use crate::recording::async_producer::{CompletionReporter, Correlated, CorrelatedStream};
use crate::recording::codec::{
    async_error_payload, serialization_failure_payload, Codec, JsonCodec, VALUE_UNAVAILABLE,
};
use crate::recording::correlation::{CorrelationClock, CorrelationTable, PendingCorrelation};
use crate::recording::guard::{self, SuppressGuard};
use crate::recording::scalar::Scalar;
use crate::recording::sink::{DiscardSink, Sink};
use crate::recording::value::{ObjectRef, Observed, Shape};
use crate::utils::config::{EngineConfig, RecordingMode};
use crate::utils::errors::{EngineError, Result};
use dashmap::{DashMap, DashSet};
use futures::Stream;
use metrics::counter;
use serde::Serialize;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_millis(100);

/// Counters kept alongside the `metrics` counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Events accepted by the sink
    pub events_emitted: u64,
    /// Events carrying a serialized value
    pub serialized: u64,
    /// Reference events written without a payload
    pub identity_only: u64,
    pub serialization_failures: u64,
    /// Probes removed from the recordable set by type exclusion
    pub probes_excluded: u64,
    pub sink_failures: u64,
    /// Anchor events written for futures and streams
    pub async_anchors: u64,
    pub async_completions: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    events_emitted: AtomicU64,
    serialized: AtomicU64,
    identity_only: AtomicU64,
    serialization_failures: AtomicU64,
    probes_excluded: AtomicU64,
    sink_failures: AtomicU64,
    async_anchors: AtomicU64,
    async_completions: AtomicU64,
}

impl EngineCounters {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            serialized: self.serialized.load(Ordering::Relaxed),
            identity_only: self.identity_only.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
            probes_excluded: self.probes_excluded.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            async_anchors: self.async_anchors.load(Ordering::Relaxed),
            async_completions: self.async_completions.load(Ordering::Relaxed),
        }
    }
}

struct EngineInner {
    policy: CapturePolicy,
    mode: RecordingMode,
    identity: Arc<dyn IdentityStore>,
    sink: Arc<dyn Sink>,
    codec: Arc<dyn Codec>,
    exclusion: ExclusionIndex,
    correlation: CorrelationTable,
    clock: CorrelationClock,
    /// Probes whose values are still serialized
    recordable: DashSet<ProbeId>,
    /// Objects that failed to serialize once
    skipped: DashSet<ObjectId>,
    probes: DashMap<ProbeId, Probe>,
    registered_classes: DashSet<ClassId>,
    completion_timeout: Duration,
    counters: EngineCounters,
}

/// Handle to a recording engine; clones share state
#[derive(Clone)]
pub struct RecordingEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`RecordingEngine`]
pub struct RecordingEngineBuilder {
    policy: Option<CapturePolicy>,
    mode: RecordingMode,
    identity: Option<Arc<dyn IdentityStore>>,
    sink: Option<Arc<dyn Sink>>,
    codec: Arc<dyn Codec>,
    default_exclusions: bool,
    extra_exclusions: Vec<String>,
    completion_timeout: Duration,
}

impl Default for RecordingEngineBuilder {
    fn default() -> Self {
        Self {
            policy: None,
            mode: RecordingMode::Detailed,
            identity: None,
            sink: None,
            codec: Arc::new(JsonCodec),
            default_exclusions: true,
            extra_exclusions: Vec::new(),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }
}

impl RecordingEngineBuilder {
    pub fn policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn mode(mut self, mode: RecordingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityStore>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Skip the built-in exclusion prefixes
    pub fn without_default_exclusions(mut self) -> Self {
        self.default_exclusions = false;
        self
    }

    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.extra_exclusions.push(prefix.into());
        self
    }

    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Build the engine. Fails if the capture policy is invalid.
    pub fn build(self) -> Result<RecordingEngine> {
        let policy = match self.policy {
            Some(policy) => policy,
            None => CapturePolicy::derive("")?,
        };
        if !policy.is_valid() {
            return Err(EngineError::InvalidPolicy(format!(
                "{} enables no event category",
                policy
            )));
        }

        let sink: Arc<dyn Sink> = match (self.mode, self.sink) {
            (RecordingMode::Discard, _) | (_, None) => Arc::new(DiscardSink),
            (_, Some(sink)) => sink,
        };

        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(ObjectIdMap::default()));

        let exclusion = if self.default_exclusions {
            ExclusionIndex::with_defaults()
        } else {
            ExclusionIndex::new()
        };
        exclusion.extend(&self.extra_exclusions);

        info!(
            "Recording engine ready (mode: {:?}, policy: {}, codec: {}, {} exclusion prefixes)",
            self.mode,
            policy,
            self.codec.name(),
            exclusion.len()
        );

        Ok(RecordingEngine {
            inner: Arc::new(EngineInner {
                policy,
                mode: self.mode,
                identity,
                sink,
                codec: self.codec,
                exclusion,
                correlation: CorrelationTable::new(),
                clock: CorrelationClock::new(),
                recordable: DashSet::new(),
                skipped: DashSet::new(),
                probes: DashMap::new(),
                registered_classes: DashSet::new(),
                completion_timeout: self.completion_timeout,
                counters: EngineCounters::default(),
            }),
        })
    }
}

impl RecordingEngine {
    pub fn builder() -> RecordingEngineBuilder {
        RecordingEngineBuilder::default()
    }

    /// Engine configured from `config`, writing into `sink`
    pub fn from_config(config: &EngineConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        let policy = config.capture_policy()?;
        let identity = Arc::new(ObjectIdMap::new(
            config.identity.capacity,
            config.identity.type_cache_capacity,
        ));

        let mut builder = Self::builder()
            .policy(policy)
            .mode(config.recording.mode)
            .identity(identity)
            .sink(sink)
            .completion_timeout(config.completion_timeout());
        for prefix in &config.exclusion.extra_prefixes {
            builder = builder.exclude(prefix.clone());
        }
        builder.build()
    }

    /// Record a value of either kind and hand it back
    pub fn record(&self, probe_id: ProbeId, observed: Observed) -> Observed {
        match observed {
            Observed::Scalar(scalar) => Observed::Scalar(self.record_scalar(probe_id, scalar)),
            Observed::Reference(value) => Observed::Reference(self.record_value(probe_id, value)),
        }
    }

    /// Record a reference value; returns the same `Arc`
    pub fn record_value(&self, probe_id: ProbeId, value: Option<ObjectRef>) -> Option<ObjectRef> {
        if guard::is_active() {
            return value;
        }
        let _guard = guard::enter();
        self.inner.observe_reference(probe_id, value.as_ref());
        value
    }

    /// Record a primitive; returns it unchanged
    pub fn record_scalar(&self, probe_id: ProbeId, scalar: Scalar) -> Scalar {
        if guard::is_active() {
            return scalar;
        }
        let _guard = guard::enter();
        self.inner.emit(probe_id, scalar.encode(), None);
        scalar
    }

    /// Record a single-value asynchronous producer
    ///
    /// When the probe is recordable an anchor event carrying a fresh
    /// correlation id is written before this returns, and the future's outcome
    /// is written under that id when it resolves.
    pub fn record_future<F, T, E>(&self, probe_id: ProbeId, future: F) -> Correlated<F>
    where
        F: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        let reporter = self.begin_async(probe_id, std::any::type_name::<F>());
        Correlated::new(future, reporter)
    }

    /// Record a multi-value asynchronous producer; every item is reported
    pub fn record_stream<S, T, E>(&self, probe_id: ProbeId, stream: S) -> CorrelatedStream<S>
    where
        S: Stream<Item = std::result::Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        let reporter = self.begin_async(probe_id, std::any::type_name::<S>());
        CorrelatedStream::new(stream, reporter)
    }

    fn begin_async(&self, probe_id: ProbeId, type_name: &str) -> Option<CompletionReporter> {
        if guard::is_active() {
            return None;
        }
        let _guard = guard::enter();
        self.inner
            .open_correlation(probe_id, type_name)
            .map(|pending| CompletionReporter::new(self.clone(), pending))
    }

    /// Write one completion event for `pending`
    pub(crate) fn write_completion<T: Serialize, E: Display>(
        &self,
        pending: &PendingCorrelation,
        outcome: &std::result::Result<T, E>,
    ) {
        let _guard = guard::enter();
        let inner = &self.inner;

        let payload = match outcome {
            Ok(value) => {
                match contain(|| Ok(serde_json::to_value(value)?))
                    .and_then(|structure| inner.codec.encode(&structure))
                {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        inner
                            .counters
                            .serialization_failures
                            .fetch_add(1, Ordering::Relaxed);
                        counter!(SERIALIZATION_FAILURES_TOTAL).increment(1);
                        serialization_failure_payload(&e.to_string())
                    }
                }
            }
            Err(error) => {
                let message = contain(|| Ok(error.to_string()))
                    .unwrap_or_else(|e| e.to_string());
                async_error_payload(std::any::type_name::<E>(), &message)
            }
        };

        trace!(
            "Completion for correlation {} under anchor {}",
            pending.correlation_id,
            pending.anchor_probe_id
        );

        if inner.emit(pending.anchor_probe_id, pending.correlation_id, Some(&payload)) {
            inner.counters.async_completions.fetch_add(1, Ordering::Relaxed);
            counter!(ASYNC_COMPLETIONS_TOTAL).increment(1);
        }
    }

    /// Register the probes of one instrumented class
    ///
    /// Stores the probe descriptors, maps every probe to the batch anchor,
    /// makes reference-valued probes recordable and forwards the registration
    /// to the sink. A class already registered is ignored.
    pub fn register_batch(&self, batch: &WeaveBatch) -> Result<()> {
        let _guard = guard::enter();
        let inner = &self.inner;

        let Some(anchor) = batch.anchor() else {
            debug!("Ignoring empty batch for class {}", batch.class_name);
            return Ok(());
        };

        if !inner.registered_classes.insert(batch.class_id) {
            debug!("Class {} ({}) already registered", batch.class_id, batch.class_name);
            return Ok(());
        }

        let probe_ids = batch.probe_ids();
        for probe in &batch.probes {
            if probe.value_kind.is_reference() {
                inner.recordable.insert(probe.id);
            }
            inner.probes.insert(probe.id, probe.clone());
        }
        inner.correlation.register_batch(anchor, &probe_ids);

        if let Err(e) = inner.sink.register_batch(batch.class_id, &probe_ids) {
            inner.registered_classes.remove(&batch.class_id);
            return Err(EngineError::SinkFailed(format!(
                "Failed to register class {}: {}",
                batch.class_name, e
            )));
        }

        debug!(
            "Registered class {} ({}) with {} probes, anchor {}",
            batch.class_id,
            batch.class_name,
            probe_ids.len(),
            anchor
        );
        Ok(())
    }

    /// Make probes recordable without a weave batch
    pub fn mark_recordable(&self, probe_ids: impl IntoIterator<Item = ProbeId>) {
        for probe_id in probe_ids {
            self.inner.recordable.insert(probe_id);
        }
    }

    /// Suppress recording on the calling thread while the guard lives
    pub fn suppress(&self) -> SuppressGuard {
        guard::enter()
    }

    pub fn most_recent_instance_of_type(&self, type_name: &str) -> Option<ObjectRef> {
        let _guard = guard::enter();
        self.inner.identity.most_recent_instance_of_type(type_name)
    }

    pub fn probe(&self, probe_id: ProbeId) -> Option<Probe> {
        self.inner.probes.get(&probe_id).map(|p| p.value().clone())
    }

    pub fn is_recordable(&self, probe_id: ProbeId) -> bool {
        self.inner.recordable.contains(&probe_id)
    }

    pub fn is_skipped(&self, object_id: ObjectId) -> bool {
        self.inner.skipped.contains(&object_id)
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.inner.correlation
    }

    pub fn policy(&self) -> CapturePolicy {
        self.inner.policy
    }

    pub fn mode(&self) -> RecordingMode {
        self.inner.mode
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.counters.snapshot()
    }
}

impl EngineInner {
    fn is_eligible(&self, probe_id: ProbeId, object_id: ObjectId) -> bool {
        self.mode.serializes_values()
            && self.policy.records_object()
            && self.recordable.contains(&probe_id)
            && !self.skipped.contains(&object_id)
    }

    fn observe_reference(&self, probe_id: ProbeId, value: Option<&ObjectRef>) {
        let object_id = value.map_or(NULL_OBJECT_ID, |v| self.identity.id_for(v));

        if !self.is_eligible(probe_id, object_id) {
            self.emit_identity_only(probe_id, object_id);
            return;
        }

        let Some(object) = value else {
            match self.codec.encode(&serde_json::Value::Null) {
                Ok(bytes) => self.emit_serialized(probe_id, object_id, &bytes),
                Err(e) => self.fail(probe_id, object_id, &e),
            }
            return;
        };

        let shape = object.shape();
        if matches!(shape, Shape::TypeLiteral | Shape::LazySequence)
            || self.exclusion.is_excluded(object.type_name())
        {
            self.exclude_probe(probe_id, object.type_name());
            self.emit_identity_only(probe_id, object_id);
            return;
        }

        let encoded = match shape {
            Shape::Bytes(bytes) => {
                self.emit_serialized(probe_id, object_id, bytes);
                return;
            }
            Shape::Completion(completion) => {
                match contain(|| Ok(completion.wait_structure(self.completion_timeout))) {
                    Ok(Some(outcome)) => outcome.and_then(|s| self.codec.encode(&s)),
                    Ok(None) => {
                        trace!("Completion at probe {} unavailable after timeout", probe_id);
                        self.emit_serialized(probe_id, object_id, VALUE_UNAVAILABLE);
                        return;
                    }
                    Err(e) => Err(e),
                }
            }
            Shape::Plain | Shape::TypeLiteral | Shape::LazySequence => {
                contain(|| object.to_structure()).and_then(|s| self.codec.encode(&s))
            }
        };

        match encoded {
            Ok(bytes) => self.emit_serialized(probe_id, object_id, &bytes),
            Err(e) => self.fail(probe_id, object_id, &e),
        }
    }

    /// Anchor event for an asynchronous producer, or `None` when it is only
    /// identified
    fn open_correlation(&self, probe_id: ProbeId, type_name: &str) -> Option<PendingCorrelation> {
        let object_id = self.identity.issue_id();

        if !self.is_eligible(probe_id, object_id) {
            self.emit_identity_only(probe_id, object_id);
            return None;
        }
        if self.exclusion.is_excluded(type_name) {
            self.exclude_probe(probe_id, type_name);
            self.emit_identity_only(probe_id, object_id);
            return None;
        }

        let pending = PendingCorrelation {
            correlation_id: self.clock.next_id(),
            anchor_probe_id: self.correlation.anchor_of(probe_id),
        };

        let appended = self
            .sink
            .append_anchor(probe_id, object_id, pending.correlation_id);
        if self.accepted(probe_id, appended) {
            self.counters.async_anchors.fetch_add(1, Ordering::Relaxed);
        }

        trace!(
            "Probe {} opened correlation {} (anchor {})",
            probe_id,
            pending.correlation_id,
            pending.anchor_probe_id
        );
        Some(pending)
    }

    fn exclude_probe(&self, probe_id: ProbeId, type_name: &str) {
        if self.recordable.remove(&probe_id).is_some() {
            self.counters.probes_excluded.fetch_add(1, Ordering::Relaxed);
            counter!(PROBES_EXCLUDED_TOTAL).increment(1);
            debug!("Probe {} no longer serialized: {} is excluded", probe_id, type_name);
        }
    }

    fn fail(&self, probe_id: ProbeId, object_id: ObjectId, error: &EngineError) {
        self.recordable.remove(&probe_id);
        if object_id != NULL_OBJECT_ID {
            self.skipped.insert(object_id);
        }

        self.counters
            .serialization_failures
            .fetch_add(1, Ordering::Relaxed);
        counter!(SERIALIZATION_FAILURES_TOTAL).increment(1);
        warn!(
            "Failed to serialize value at probe {} (object {}): {}",
            probe_id, object_id, error
        );

        let payload = serialization_failure_payload(&error.to_string());
        self.emit(probe_id, object_id, Some(&payload));
    }

    fn emit_identity_only(&self, probe_id: ProbeId, object_id: ObjectId) {
        if self.emit(probe_id, object_id, None) {
            self.counters.identity_only.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit_serialized(&self, probe_id: ProbeId, object_id: ObjectId, payload: &[u8]) {
        if self.emit(probe_id, object_id, Some(payload)) {
            self.counters.serialized.fetch_add(1, Ordering::Relaxed);
            counter!(SERIALIZED_TOTAL).increment(1);
        }
    }

    /// Append to the sink; returns whether the sink accepted the event
    fn emit(&self, probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> bool {
        self.accepted(probe_id, self.sink.append(probe_id, value, payload))
    }

    fn accepted(&self, probe_id: ProbeId, appended: Result<()>) -> bool {
        match appended {
            Ok(()) => {
                self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
                counter!(EVENTS_TOTAL).increment(1);
                true
            }
            Err(e) => {
                self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                counter!(SINK_FAILURES_TOTAL).increment(1);
                warn!("Dropped event for probe {}: {}", probe_id, e);
                false
            }
        }
    }
}

/// Run user code, turning a panic into a serialization error
fn contain<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        Err(EngineError::SerializationFailed(format!(
            "panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
