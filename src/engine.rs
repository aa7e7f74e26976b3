//! Central engine coordinating instrumentation, runs, and export.
//!
//! The [`TraceEngine`] is the entry point for everything: it wraps callables
//! for instrumentation, opens and closes runs, routes every closed span to
//! the innermost active run and to the exporter, and drives post-hoc
//! evaluation. It is cheap to clone and safe to share across tasks.

use crate::config;
use crate::error::Result;
use crate::eval::{Evaluator, EvaluatorEngine};
use crate::export::{NullExporter, SpanExporter, SpanFilter, SpanFinder};
use crate::run::{AggregationSpec, Run, RunHandle, RunRegistry};
use crate::span::Span;
use crate::wrap::TracedCall;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Central engine for capturing spans and aggregating runs.
///
/// The engine is responsible for recording spans produced by instrumented
/// calls, associating them with the active run, and handing them to the
/// configured exporter. Cloning an engine yields another handle to the same
/// underlying state.
#[derive(Clone)]
pub struct TraceEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    exporter: Arc<dyn SpanExporter>,
    registry: Arc<RunRegistry>,
    enabled: AtomicBool,
    evaluator_timeout: Mutex<Option<Duration>>,
}

impl TraceEngine {
    /// Create a new trace engine.
    ///
    /// # Arguments
    ///
    /// * `exporter` - Optional exporter for closed spans and sealed runs. If
    ///   None, a [`NullExporter`] is used and nothing is persisted.
    /// * `enabled` - Whether the engine records spans (default: true)
    pub fn new(exporter: Option<Arc<dyn SpanExporter>>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                exporter: exporter.unwrap_or_else(|| Arc::new(NullExporter::new())),
                registry: Arc::new(RunRegistry::new()),
                enabled: AtomicBool::new(enabled),
                evaluator_timeout: Mutex::new(None),
            }),
        }
    }

    /// Check if the engine is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Enable span recording.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::SeqCst);
    }

    /// Disable span recording.
    ///
    /// Wrapped calls still execute, but produce no spans.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
    }

    /// Bound inline evaluations to the given duration.
    ///
    /// There is no timeout by default; a slow evaluator otherwise delays the
    /// instrumented call's return. Pass `None` to remove the bound.
    pub fn set_evaluator_timeout(&self, timeout: Option<Duration>) {
        *self.inner.evaluator_timeout.lock().unwrap() = timeout;
    }

    /// Wrap a named callable for instrumentation.
    ///
    /// The returned [`TracedCall`] opens a span around every invocation. Use
    /// its builder methods to attach an evaluator or detach it from the
    /// ambient trace context.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentrace::engine::TraceEngine;
    /// use agentrace::span::InputCapture;
    ///
    /// let engine = TraceEngine::default();
    /// let agent = engine.wrap("my_agent");
    ///
    /// let answer: Result<String, std::convert::Infallible> = agent.call(
    ///     InputCapture::new().arg("query", &"hello"),
    ///     || Ok("world".to_string()),
    /// );
    /// assert_eq!(answer.unwrap(), "world");
    /// ```
    pub fn wrap(&self, name: impl Into<String>) -> TracedCall {
        TracedCall::new(self.clone(), name)
    }

    /// Begin a run; every span closed from now until the run closes is
    /// associated with it (innermost run wins when runs are nested).
    ///
    /// # Arguments
    ///
    /// * `name` - Run name, unique within the engine's lifetime
    /// * `specs` - `(metric, aggregation)` pairs evaluated at run close
    /// * `config_path` - Optional YAML file loaded as a flat key/value
    ///   mapping and stored verbatim as the run's config snapshot
    ///
    /// # Errors
    ///
    /// A duplicate run name is rejected here, before any span is recorded
    /// under it.
    pub fn open_run(
        &self,
        name: impl Into<String>,
        specs: Vec<AggregationSpec>,
        config_path: Option<&Path>,
    ) -> Result<RunHandle> {
        let name = name.into();
        let snapshot = match config_path {
            Some(path) => config::load_snapshot(path)?,
            None => Default::default(),
        };

        let id = self.inner.registry.open(name.clone(), specs, snapshot)?;
        Ok(RunHandle::new(
            self.inner.registry.clone(),
            self.inner.exporter.clone(),
            id,
            name,
        ))
    }

    /// Seal a run: compute its summary metrics and hand it to the exporter.
    ///
    /// Equivalent to [`RunHandle::close`].
    pub fn close_run(&self, handle: RunHandle) -> Result<Run> {
        handle.close()
    }

    /// Name of the innermost active run, if any.
    pub fn active_run_name(&self) -> Option<String> {
        self.inner.registry.active_run_name()
    }

    /// Run an evaluator against previously closed spans.
    ///
    /// Spans matching `filter` are looked up from `finder`, scored against
    /// their recorded inputs and output, and re-stored through this engine's
    /// exporter with the merged metrics. This is the escape hatch for
    /// evaluators too slow or unreliable to run inline, and the only way to
    /// attach metrics to spans whose call failed.
    pub fn evaluate_post_hoc(
        &self,
        finder: &dyn SpanFinder,
        filter: &SpanFilter,
        evaluator: &Arc<dyn Evaluator>,
    ) -> Result<Vec<Span>> {
        self.evaluators()
            .evaluate_stored(finder, self.inner.exporter.as_ref(), filter, evaluator)
    }

    /// The evaluator engine configured with the current timeout.
    pub(crate) fn evaluators(&self) -> EvaluatorEngine {
        let timeout = *self.inner.evaluator_timeout.lock().unwrap();
        EvaluatorEngine::new().with_timeout_opt(timeout)
    }

    /// Record a closed span: associate it with the innermost active run and
    /// hand it to the exporter.
    pub(crate) fn record_span(&self, span: Span) {
        if !self.inner.registry.record_span(&span) {
            debug!(span = %span.name, "span closed outside any run");
        }
        if let Err(e) = self.inner.exporter.store_span(&span) {
            warn!(span = %span.name, error = %e, "exporter failed to store span");
        }
    }
}

impl Default for TraceEngine {
    fn default() -> Self {
        Self::new(None, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryExporter;
    use crate::run::Aggregation;
    use crate::span::{ActiveSpan, SpanInputs};
    use serde_json::json;

    fn engine_with_store() -> (TraceEngine, Arc<InMemoryExporter>) {
        let store = Arc::new(InMemoryExporter::default());
        (TraceEngine::new(Some(store.clone()), true), store)
    }

    fn closed_span(name: &str) -> Span {
        ActiveSpan::open(name, SpanInputs::new(), None).close_ok(json!(null))
    }

    #[test]
    fn test_new_engine_is_enabled() {
        let engine = TraceEngine::default();
        assert!(engine.is_enabled());
    }

    #[test]
    fn test_enable_disable() {
        let engine = TraceEngine::default();
        engine.disable();
        assert!(!engine.is_enabled());

        engine.enable();
        assert!(engine.is_enabled());
    }

    #[test]
    fn test_record_span_exports() {
        let (engine, store) = engine_with_store();
        engine.record_span(closed_span("call"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_span_joins_active_run() {
        let (engine, _store) = engine_with_store();
        let handle = engine.open_run("eval-1", vec![], None).unwrap();

        engine.record_span(closed_span("call"));

        let run = engine.close_run(handle).unwrap();
        assert_eq!(run.span_count(), 1);
    }

    #[test]
    fn test_duplicate_run_name_rejected_at_open() {
        let engine = TraceEngine::default();
        let _first = engine.open_run("eval-1", vec![], None).unwrap();

        assert!(engine.open_run("eval-1", vec![], None).is_err());
    }

    #[test]
    fn test_run_summary_from_recorded_spans() {
        let (engine, store) = engine_with_store();
        let specs = vec![AggregationSpec::new("m", Aggregation::Mean)];
        let handle = engine.open_run("eval-1", specs, None).unwrap();

        for value in [1.0, 2.0, 3.0] {
            let mut span = closed_span("call");
            span.metrics.insert("m".to_string(), value);
            engine.record_span(span);
        }

        let run = engine.close_run(handle).unwrap();
        assert!((run.summary("m_mean").unwrap() - 2.0).abs() < 1e-9);
        assert!(store.get_run("eval-1").is_some());
    }

    #[test]
    fn test_post_hoc_evaluation_through_engine() {
        let (engine, store) = engine_with_store();
        let span = closed_span("agent");
        let span_id = span.id.clone();
        engine.record_span(span);

        let evaluator: Arc<dyn Evaluator> = Arc::new(
            |_: &SpanInputs, _: &serde_json::Value| {
                Ok(std::collections::HashMap::from([("score".to_string(), 0.9)]))
            },
        );

        let updated = engine
            .evaluate_post_hoc(store.as_ref(), &SpanFilter::new().with_id(span_id), &evaluator)
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].metrics["score"], 0.9);
    }

    #[test]
    fn test_clone_shares_state() {
        let (engine, _store) = engine_with_store();
        let other = engine.clone();

        engine.disable();
        assert!(!other.is_enabled());

        let _handle = other.open_run("shared", vec![], None).unwrap();
        assert_eq!(engine.active_run_name().as_deref(), Some("shared"));
    }
}
