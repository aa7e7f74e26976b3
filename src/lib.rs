pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod export;
pub mod run;
pub mod span;
pub mod wrap;

pub use error::{AgentraceError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::context::{SpanContext, TraceFutureExt};
    pub use crate::engine::TraceEngine;
    pub use crate::error::{AgentraceError, Result};
    pub use crate::eval::{
        CompositeEvaluator, Evaluator, EvaluatorEngine, EvaluatorMetrics, EVALUATION_ERROR_METRIC,
    };
    pub use crate::export::{
        InMemoryExporter, NullExporter, SpanExporter, SpanFilter, SpanFinder,
    };
    pub use crate::run::{Aggregation, AggregationSpec, Run, RunHandle};
    pub use crate::span::{InputCapture, Span, SpanInputs, SpanStatus};
    pub use crate::wrap::TracedCall;
}
