// packages/engine/src/identity/mod.rs
//! Surrogate identities for observed values
//!
//! The engine asks an [`IdentityStore`] for a stable `i64` per live value. The
//! same value keeps its id for as long as it is alive; once it is dropped the
//! id may be retired and a later value may receive a fresh one.

pub mod object_id_map;

pub use object_id_map::ObjectIdMap;

use crate::probe::ObjectId;
use crate::recording::value::ObjectRef;

/// Source of surrogate object ids
pub trait IdentityStore: Send + Sync {
    /// Id of `value`, assigning one on first sight
    fn id_for(&self, value: &ObjectRef) -> ObjectId;

    /// Fresh id for something that is not an [`ObjectRef`] (futures, streams)
    fn issue_id(&self) -> ObjectId;

    /// Most recently observed live instance whose type name matches
    fn most_recent_instance_of_type(&self, type_name: &str) -> Option<ObjectRef>;
}
