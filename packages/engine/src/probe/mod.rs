// packages/engine/src/probe/mod.rs
//! Probe descriptors and weave batches
//!
//! Probes are placed and numbered by the instrumentation step. The engine only
//! receives them, grouped per instrumented class, through
//! [`RecordingEngine::register_batch`](crate::recording::RecordingEngine::register_batch).

use crate::policy::Category;
use serde::{Deserialize, Serialize};

/// Instrumentation point id, unique across a run
pub type ProbeId = i32;

/// Surrogate identity of an observed value
pub type ObjectId = i64;

/// Instrumented class id
pub type ClassId = i32;

/// Object id reserved for absent values
pub const NULL_OBJECT_ID: ObjectId = 0;

/// What happened at a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MethodEntry,
    MethodParam,
    MethodNormalExit,
    MethodExceptionalExit,
    Call,
    CallParam,
    CallReturn,
    NewObject,
    GetField,
    PutField,
    ArrayLoad,
    ArrayStore,
    NewArray,
    MonitorEnter,
    MonitorExit,
    LocalLoad,
    LocalStore,
    LineNumber,
    Label,
    Catch,
}

impl EventKind {
    /// Capture category that switches this kind on
    pub fn category(&self) -> Category {
        match self {
            EventKind::MethodEntry
            | EventKind::MethodNormalExit
            | EventKind::MethodExceptionalExit => Category::Exec,
            EventKind::MethodParam | EventKind::CallParam => Category::Parameters,
            EventKind::Call | EventKind::CallReturn | EventKind::NewObject => Category::Call,
            EventKind::GetField | EventKind::PutField => Category::Field,
            EventKind::ArrayLoad | EventKind::ArrayStore | EventKind::NewArray => {
                Category::Array
            }
            EventKind::MonitorEnter | EventKind::MonitorExit => Category::Sync,
            EventKind::LocalLoad | EventKind::LocalStore => Category::Locals,
            EventKind::LineNumber => Category::Line,
            EventKind::Label | EventKind::Catch => Category::Label,
        }
    }
}

/// Static type of the value observed at a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDescriptor {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Object,
}

impl ValueDescriptor {
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueDescriptor::Object)
    }
}

/// One instrumentation point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub id: ProbeId,
    pub event_kind: EventKind,
    pub value_kind: ValueDescriptor,
    pub source_line: u32,

    /// Position of the instrumented instruction within its method
    pub instruction_index: u32,

    /// Free-form `key=value` attributes attached by the instrumentation step
    #[serde(default)]
    pub attributes: String,
}

impl Probe {
    pub fn new(id: ProbeId, event_kind: EventKind, value_kind: ValueDescriptor) -> Self {
        Self {
            id,
            event_kind,
            value_kind,
            source_line: 0,
            instruction_index: 0,
            attributes: String::new(),
        }
    }

    pub fn at_line(mut self, source_line: u32) -> Self {
        self.source_line = source_line;
        self
    }

    pub fn with_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.attributes = attributes.into();
        self
    }

    pub fn category(&self) -> Category {
        self.event_kind.category()
    }

    /// Value of `key` in the `a=1,b=2` attribute string
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim())
    }
}

/// All probes placed in one class, in placement order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveBatch {
    pub class_id: ClassId,
    pub class_name: String,
    pub probes: Vec<Probe>,
}

impl WeaveBatch {
    pub fn new(class_id: ClassId, class_name: impl Into<String>, probes: Vec<Probe>) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            probes,
        }
    }

    pub fn probe_ids(&self) -> Vec<ProbeId> {
        self.probes.iter().map(|p| p.id).collect()
    }

    /// First probe of the batch; async completions are reported under it
    pub fn anchor(&self) -> Option<ProbeId> {
        self.probes.first().map(|p| p.id)
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
