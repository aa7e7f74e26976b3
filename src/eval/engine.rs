//! Execution and normalization of evaluators.

use super::evaluator::{Evaluator, EvaluatorMetrics};
use crate::error::{AgentraceError, Result};
use crate::export::{SpanExporter, SpanFilter, SpanFinder};
use crate::span::{Span, SpanInputs};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Metric key recording that an evaluator failed or timed out.
///
/// Emitted with value `1.0` in place of the evaluator's normal keys, so
/// aggregation always has a consistent key to observe failure rates.
pub const EVALUATION_ERROR_METRIC: &str = "evaluation_error";

/// Runs evaluators and normalizes their results.
///
/// Evaluator failures are caught here and never propagate to the caller of
/// the instrumented function. An optional timeout bounds how long an inline
/// evaluation may take; a timed-out evaluator yields the error indicator
/// metric and its eventual result is discarded.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorEngine {
    timeout: Option<Duration>,
}

impl EvaluatorEngine {
    /// Create an engine with no evaluator timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each evaluation to the given duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Optionally bound each evaluation.
    pub fn with_timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured evaluation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run an evaluator against captured inputs and output.
    ///
    /// Always returns a metrics mapping: the evaluator's own metrics on
    /// success, or `{"evaluation_error": 1.0}` when it fails or exceeds the
    /// configured timeout.
    pub fn evaluate(
        &self,
        evaluator: &Arc<dyn Evaluator>,
        inputs: &SpanInputs,
        output: &Value,
    ) -> EvaluatorMetrics {
        match self.run(evaluator, inputs, output) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "evaluator failed; recording error indicator");
                Self::error_metrics()
            }
        }
    }

    /// The metrics mapping substituted for a failed evaluation.
    pub fn error_metrics() -> EvaluatorMetrics {
        HashMap::from([(EVALUATION_ERROR_METRIC.to_string(), 1.0)])
    }

    /// Run an evaluator against a previously closed span, merging the
    /// resulting metrics into the span.
    ///
    /// For spans whose call failed, the evaluator sees a null output.
    pub fn evaluate_span(&self, span: &mut Span, evaluator: &Arc<dyn Evaluator>) {
        let output = span.output.clone().unwrap_or(Value::Null);
        let metrics = self.evaluate(evaluator, &span.inputs, &output);
        span.metrics.extend(metrics);
    }

    /// Post-hoc evaluation: look up closed spans, score them, and re-store
    /// the updated copies.
    ///
    /// Each span is looked up from `finder`, evaluated against its recorded
    /// inputs and output, and handed back to `exporter` with the merged
    /// metrics. Safe to call concurrently for disjoint filters: every span is
    /// scored on an owned copy.
    ///
    /// # Returns
    ///
    /// The updated spans, in the order the finder returned them.
    pub fn evaluate_stored(
        &self,
        finder: &dyn SpanFinder,
        exporter: &dyn SpanExporter,
        filter: &SpanFilter,
        evaluator: &Arc<dyn Evaluator>,
    ) -> Result<Vec<Span>> {
        let mut spans = finder.find_spans(filter)?;
        debug!(count = spans.len(), "post-hoc evaluation");

        for span in &mut spans {
            self.evaluate_span(span, evaluator);
            exporter.store_span(span)?;
        }

        Ok(spans)
    }

    fn run(
        &self,
        evaluator: &Arc<dyn Evaluator>,
        inputs: &SpanInputs,
        output: &Value,
    ) -> Result<EvaluatorMetrics> {
        match self.timeout {
            None => evaluator.evaluate(inputs, output),
            Some(limit) => {
                let evaluator = Arc::clone(evaluator);
                let inputs = inputs.clone();
                let output = output.clone();
                let (tx, rx) = mpsc::channel();

                std::thread::spawn(move || {
                    // The receiver may be gone after a timeout.
                    let _ = tx.send(evaluator.evaluate(&inputs, &output));
                });

                match rx.recv_timeout(limit) {
                    Ok(result) => result,
                    Err(_) => Err(AgentraceError::TimeoutError(format!(
                        "evaluator exceeded {:?}",
                        limit
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryExporter;
    use crate::span::{ActiveSpan, SpanStatus};
    use serde_json::json;

    fn constant(name: &'static str, value: f64) -> Arc<dyn Evaluator> {
        Arc::new(move |_inputs: &SpanInputs, _output: &Value| {
            Ok(HashMap::from([(name.to_string(), value)]))
        })
    }

    fn failing() -> Arc<dyn Evaluator> {
        Arc::new(|_: &SpanInputs, _: &Value| -> Result<EvaluatorMetrics> {
            Err(AgentraceError::EvaluatorError("judge offline".to_string()))
        })
    }

    #[test]
    fn test_evaluate_returns_evaluator_metrics() {
        let engine = EvaluatorEngine::new();
        let metrics = engine.evaluate(&constant("score", 0.7), &SpanInputs::new(), &json!(null));
        assert_eq!(metrics["score"], 0.7);
    }

    #[test]
    fn test_evaluator_failure_becomes_error_indicator() {
        let engine = EvaluatorEngine::new();
        let metrics = engine.evaluate(&failing(), &SpanInputs::new(), &json!(null));

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[EVALUATION_ERROR_METRIC], 1.0);
    }

    #[test]
    fn test_timeout_yields_error_indicator() {
        let engine = EvaluatorEngine::new().with_timeout(Duration::from_millis(20));
        let slow: Arc<dyn Evaluator> = Arc::new(|_: &SpanInputs, _: &Value| {
            std::thread::sleep(Duration::from_secs(2));
            Ok(EvaluatorMetrics::new())
        });

        let metrics = engine.evaluate(&slow, &SpanInputs::new(), &json!(null));
        assert_eq!(metrics[EVALUATION_ERROR_METRIC], 1.0);
    }

    #[test]
    fn test_fast_evaluator_beats_timeout() {
        let engine = EvaluatorEngine::new().with_timeout(Duration::from_secs(5));
        let metrics = engine.evaluate(&constant("score", 1.0), &SpanInputs::new(), &json!(null));
        assert_eq!(metrics["score"], 1.0);
    }

    #[test]
    fn test_evaluate_span_merges_metrics() {
        let engine = EvaluatorEngine::new();
        let mut span = ActiveSpan::open("call", SpanInputs::new(), None).close_ok(json!("out"));
        span.metrics.insert("existing".to_string(), 2.0);

        engine.evaluate_span(&mut span, &constant("score", 0.5));

        assert_eq!(span.metrics["existing"], 2.0);
        assert_eq!(span.metrics["score"], 0.5);
    }

    #[test]
    fn test_evaluate_span_on_failed_call_sees_null_output() {
        let engine = EvaluatorEngine::new();
        let saw_null: Arc<dyn Evaluator> = Arc::new(|_: &SpanInputs, output: &Value| {
            let flag = if output.is_null() { 1.0 } else { 0.0 };
            Ok(HashMap::from([("saw_null".to_string(), flag)]))
        });

        let mut span = ActiveSpan::open("call", SpanInputs::new(), None).close_err("boom");
        engine.evaluate_span(&mut span, &saw_null);

        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.metrics["saw_null"], 1.0);
    }

    #[test]
    fn test_post_hoc_evaluation_re_stores_spans() {
        let engine = EvaluatorEngine::new();
        let store = InMemoryExporter::default();

        let span = ActiveSpan::open("agent", SpanInputs::new(), None).close_ok(json!("hi"));
        let span_id = span.id.clone();
        store.store_span(&span).unwrap();

        let updated = engine
            .evaluate_stored(
                &store,
                &store,
                &SpanFilter::new().with_name("agent"),
                &constant("score", 0.9),
            )
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].metrics["score"], 0.9);

        // The store now holds the scored copy.
        let stored = store.get_span(&span_id).unwrap();
        assert_eq!(stored.metrics["score"], 0.9);
    }

    #[test]
    fn test_repeated_post_hoc_passes_do_not_duplicate_spans() {
        let engine = EvaluatorEngine::new();
        let store = InMemoryExporter::default();

        let span = ActiveSpan::open("agent", SpanInputs::new(), None).close_ok(json!("hi"));
        store.store_span(&span).unwrap();

        let filter = SpanFilter::new().with_name("agent");
        for _ in 0..2 {
            let updated = engine
                .evaluate_stored(&store, &store, &filter, &constant("score", 0.9))
                .unwrap();
            assert_eq!(updated.len(), 1);
        }

        assert_eq!(store.len(), 1);
        assert_eq!(store.find_spans(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_post_hoc_concurrent_on_disjoint_spans() {
        let engine = EvaluatorEngine::new();
        let store = Arc::new(InMemoryExporter::default());

        for name in ["a", "b"] {
            let span = ActiveSpan::open(name, SpanInputs::new(), None).close_ok(json!(null));
            store.store_span(&span).unwrap();
        }

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let engine = engine.clone();
                let store = store.clone();
                std::thread::spawn(move || {
                    engine
                        .evaluate_stored(
                            store.as_ref(),
                            store.as_ref(),
                            &SpanFilter::new().with_name(name),
                            &constant("score", 1.0),
                        )
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let updated = handle.join().unwrap();
            assert_eq!(updated.len(), 1);
            assert_eq!(updated[0].metrics["score"], 1.0);
        }
    }
}
