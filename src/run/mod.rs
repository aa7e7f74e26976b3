//! Run grouping and metric aggregation.
//!
//! A run is a named scope that collects every span closed while it is active
//! and, on close, computes declared summary statistics over the evaluator
//! metrics those spans carry.
//!
//! # Architecture
//!
//! - **Aggregation / AggregationSpec**: the five supported aggregation
//!   functions and the `(metric, function)` pairs declared at run open.
//! - **Run**: the sealed, read-only record produced when a run closes.
//! - **RunRegistry**: tracks the stack of active runs (nested runs are
//!   allowed; a span belongs to the innermost one) and enforces run-name
//!   uniqueness at open time.
//! - **RunHandle**: the caller's handle to an open run; closing it seals the
//!   run, and dropping it unclosed seals the run as a fallback so an
//!   unwinding scope never leaves a run open.

pub mod aggregation;
pub mod model;
pub mod registry;

// Re-export main types
pub use aggregation::{Aggregation, AggregationSpec};
pub use model::Run;
pub use registry::{RunHandle, RunRegistry};
