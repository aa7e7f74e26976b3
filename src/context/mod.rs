//! Trace context propagation.
//!
//! The propagator tracks the currently open span per logical execution path so
//! that a newly opened span records the correct `parent_id`. State lives in a
//! thread-local stack: independent threads (and tasks polled on them) are
//! isolated by construction, and no locking is involved.
//!
//! # Architecture
//!
//! - **propagator**: `current()` / `push()` / `pop()` over the thread-local
//!   span stack, with token-checked pops that surface mismatched usage.
//! - **SpanContext**: an explicit snapshot of the stack, captured at spawn
//!   time and re-attached on another execution path to continue a trace.
//! - **WithSpanContext**: a future wrapper that re-attaches a captured
//!   context on every poll, keeping spans open across suspension points and
//!   across task migration between worker threads.
//!
//! # Handoff across concurrency boundaries
//!
//! The engine never infers trace continuity across an opaque `spawn`. Code
//! that hands work to another task captures the context explicitly:
//!
//! ```rust,ignore
//! use agentrace::context::{SpanContext, TraceFutureExt};
//!
//! let ctx = SpanContext::capture();
//! tokio::spawn(async move {
//!     // spans opened in here link to the captured current span
//!     do_work().await;
//! }.with_span_context(ctx));
//! ```

pub mod future;
pub mod propagator;

// Re-export main types
pub use future::{TraceFutureExt, WithSpanContext};
pub use propagator::{current, pop, push, ContextGuard, ContextToken, SpanContext};
