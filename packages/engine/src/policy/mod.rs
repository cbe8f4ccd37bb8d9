// packages/engine/src/policy/mod.rs
//! Capture policy
//!
//! Decides which categories of probe events are active for a run. A policy is
//! derived once from a configuration string, validated, and then shared as a
//! plain `Copy` value; narrowing produces a new value and never touches the
//! parent.

pub mod capture_policy;

pub use capture_policy::{CapturePolicy, Category, DetailLevel};
