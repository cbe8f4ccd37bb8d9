// packages/engine/src/recording/value.rs
//! Observed values as the engine sees them
//!
//! Reference values arrive as [`ObjectRef`] (`Arc<dyn Recordable>`). The engine
//! never inspects them beyond the [`Recordable`] surface: a type name for the
//! exclusion index, a [`Shape`] deciding how serialization proceeds, and a
//! structured form handed to the [`Codec`](crate::recording::codec::Codec).

use crate::recording::scalar::Scalar;
use crate::utils::errors::{EngineError, Result};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handle to an observed reference value
pub type ObjectRef = Arc<dyn Recordable>;

/// How a value is serialized
pub enum Shape<'a> {
    /// Ordinary value; serialized through [`Recordable::to_structure`]
    Plain,
    /// Already-encoded bytes, written verbatim
    Bytes(&'a [u8]),
    /// A type descriptor rather than a value; never serialized
    TypeLiteral,
    /// Lazily evaluated sequence; serializing it would consume it
    LazySequence,
    /// Single-shot completion that may still be running
    Completion(&'a dyn BoundedCompletion),
}

/// A value the engine can observe
pub trait Recordable: Send + Sync + 'static {
    /// Fully qualified type name used for exclusion lookups
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Plain
    }

    /// Structured form of the value
    fn to_structure(&self) -> Result<serde_json::Value>;
}

/// Completion handle that can be waited on for a bounded time
pub trait BoundedCompletion: Send + Sync {
    /// `None` when the completion has not resolved within `timeout`
    fn wait_structure(&self, timeout: Duration) -> Option<Result<serde_json::Value>>;
}

/// Implement [`Recordable`] for `Serialize` types
///
/// ```ignore
/// #[derive(serde::Serialize)]
/// struct Order { id: u64 }
///
/// probelog_engine::impl_recordable!(Order);
/// ```
#[macro_export]
macro_rules! impl_recordable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::recording::value::Recordable for $ty {
                fn to_structure(&self) -> $crate::utils::errors::Result<$crate::__private::serde_json::Value> {
                    $crate::__private::serde_json::to_value(self).map_err(::std::convert::Into::into)
                }
            }
        )+
    };
}

impl_recordable!(
    String,
    &'static str,
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    u64,
    f32,
    f64,
    serde_json::Value,
    Vec<String>,
    Vec<i32>,
    Vec<i64>,
    Vec<f64>,
    std::collections::HashMap<String, String>,
    std::collections::BTreeMap<String, serde_json::Value>,
);

impl Recordable for Vec<u8> {
    fn shape(&self) -> Shape<'_> {
        Shape::Bytes(self)
    }

    fn to_structure(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Recordable for Box<[u8]> {
    fn shape(&self) -> Shape<'_> {
        Shape::Bytes(self)
    }

    fn to_structure(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self[..])?)
    }
}

impl<T: Send + Sync + 'static> Recordable for std::vec::IntoIter<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::LazySequence
    }

    fn to_structure(&self) -> Result<serde_json::Value> {
        Err(EngineError::SerializationFailed(
            "lazy sequences are not serialized".to_string(),
        ))
    }
}

/// A type used as a value
pub struct TypeTag<T: ?Sized> {
    _type: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + 'static> TypeTag<T> {
    pub fn of() -> Self {
        Self { _type: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl<T: ?Sized + 'static> Recordable for TypeTag<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::TypeLiteral
    }

    fn to_structure(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::String(self.name().to_string()))
    }
}

/// Single-shot result slot, filled once by a producer and waited on by readers
pub struct Completion<T> {
    slot: Mutex<Option<std::result::Result<T, String>>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Resolve successfully. Returns false if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with an error. Returns false if already resolved.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.resolve(Err(message.into()))
    }

    fn resolve(&self, outcome: std::result::Result<T, String>) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.ready.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Completion<T> {
    fn structure_of(outcome: &std::result::Result<T, String>) -> Result<serde_json::Value> {
        match outcome {
            Ok(value) => Ok(serde_json::to_value(value)?),
            Err(message) => Err(EngineError::SerializationFailed(format!(
                "completion failed: {}",
                message
            ))),
        }
    }
}

impl<T: Serialize + Send + Sync> BoundedCompletion for Completion<T> {
    fn wait_structure(&self, timeout: Duration) -> Option<Result<serde_json::Value>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_none() {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.as_ref().map(Self::structure_of)
    }
}

impl<T: Serialize + Send + Sync + 'static> Recordable for Completion<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::Completion(self)
    }

    fn to_structure(&self) -> Result<serde_json::Value> {
        match self.slot.lock().as_ref() {
            Some(outcome) => Self::structure_of(outcome),
            None => Err(EngineError::SerializationFailed(
                "completion not resolved".to_string(),
            )),
        }
    }
}

/// Value observed at a probe
#[derive(Clone)]
pub enum Observed {
    Scalar(Scalar),
    /// `None` stands for an absent reference
    Reference(Option<ObjectRef>),
}

impl Observed {
    pub fn reference<T: Recordable>(value: T) -> Self {
        Observed::Reference(Some(Arc::new(value)))
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Observed::Scalar(scalar) => Some(*scalar),
            Observed::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectRef> {
        match self {
            Observed::Reference(value) => value.as_ref(),
            Observed::Scalar(_) => None,
        }
    }
}

impl From<Scalar> for Observed {
    fn from(scalar: Scalar) -> Self {
        Observed::Scalar(scalar)
    }
}

impl From<Option<ObjectRef>> for Observed {
    fn from(value: Option<ObjectRef>) -> Self {
        Observed::Reference(value)
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Scalar(scalar) => f.debug_tuple("Scalar").field(scalar).finish(),
            Observed::Reference(Some(value)) => {
                f.debug_tuple("Reference").field(&value.type_name()).finish()
            }
            Observed::Reference(None) => f.write_str("Reference(null)"),
        }
    }
}
