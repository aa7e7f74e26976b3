//! Evaluator contract and execution engine.
//!
//! Evaluators are pure scoring functions: given a span's captured inputs and
//! output, they return named numeric metrics. The [`EvaluatorEngine`] runs
//! them and normalizes their results. An evaluator failure never propagates
//! to the caller of the instrumented function; it is converted to the
//! `evaluation_error` indicator metric so aggregation has a consistent key to
//! observe failure rates.
//!
//! Evaluators too slow or unreliable to run inline can be applied post-hoc:
//! spans are looked up by filter from an external [`SpanFinder`], scored
//! against their recorded inputs and output, and re-stored with the merged
//! metrics.
//!
//! [`SpanFinder`]: crate::export::SpanFinder

pub mod engine;
pub mod evaluator;

// Re-export main types
pub use engine::{EvaluatorEngine, EVALUATION_ERROR_METRIC};
pub use evaluator::{response_length, CompositeEvaluator, Evaluator, EvaluatorMetrics};
