//! Instrumentation wrapper turning an arbitrary callable into one that
//! produces a span.
//!
//! A [`TracedCall`] is a reusable wrapper around a call site. Each invocation
//! snapshots the named arguments, opens a span under the ambient parent, runs
//! the callable, records its output or error, optionally scores the result
//! with an evaluator, and hands the closed span to the engine. Failures of
//! the wrapped call are re-raised unchanged; instrumentation is transparent
//! to failure propagation.
//!
//! The async variant keeps the span open for the full logical duration of the
//! call, across suspension points, and closes the span with an error status
//! if the call is cancelled mid-flight.

use crate::context::propagator::{self, SpanContext};
use crate::context::TraceFutureExt;
use crate::engine::TraceEngine;
use crate::eval::Evaluator;
use crate::span::{snapshot_value, ActiveSpan, Span, SpanInputs};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// A named, instrumented call site.
///
/// Built via [`TraceEngine::wrap`]; invoke with [`call`](TracedCall::call)
/// or [`call_async`](TracedCall::call_async).
///
/// # Examples
///
/// ```
/// use agentrace::engine::TraceEngine;
/// use agentrace::span::InputCapture;
///
/// let engine = TraceEngine::default();
/// let summarize = engine.wrap("summarize");
///
/// let result: Result<String, String> = summarize.call(
///     InputCapture::new().arg("text", &"a long document"),
///     || Ok("a document".to_string()),
/// );
/// assert!(result.is_ok());
/// ```
pub struct TracedCall {
    engine: TraceEngine,
    name: String,
    evaluator: Option<Arc<dyn Evaluator>>,
    detached: bool,
}

impl TracedCall {
    pub(crate) fn new(engine: TraceEngine, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            evaluator: None,
            detached: false,
        }
    }

    /// Attach an evaluator, invoked inline after each successful call.
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Attach an already-shared evaluator.
    pub fn with_shared_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Open every span of this call site as a trace root, ignoring the
    /// ambient context.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Label recorded on spans produced by this call site.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke a synchronous callable under a span.
    ///
    /// The callable's result is returned unchanged; on failure the span is
    /// closed with status `ERROR` and the error is re-raised as-is. The
    /// evaluator, if any, runs only after a successful call.
    pub fn call<T, E, F>(
        &self,
        inputs: impl Into<SpanInputs>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        T: Serialize,
        E: Display,
    {
        if !self.engine.is_enabled() {
            return f();
        }

        let parent = if self.detached { None } else { propagator::current() };
        let active = ActiveSpan::open(&self.name, inputs.into(), parent);
        let token = propagator::push(active.clone());
        let mut unwind_guard = UnwindGuard::new(self.engine.clone(), active.clone(), token);

        let result = f();

        if let Some(token) = unwind_guard.defuse() {
            if let Err(e) = propagator::pop(token) {
                error!(span = %self.name, error = %e, "trace context corrupted; span tree may be wrong");
            }
        }

        let span = self.close_span(&active, &result);
        self.engine.record_span(span);
        result
    }

    /// Invoke an asynchronous callable under a span.
    ///
    /// The span stays open across every suspension point and closes when the
    /// logical call completes. If the future is dropped before completion
    /// (cancellation, or a timeout imposed by the caller) the span is still
    /// closed, with status `ERROR` and a cancellation message.
    pub async fn call_async<T, E, Fut>(
        &self,
        inputs: impl Into<SpanInputs>,
        fut: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        if !self.engine.is_enabled() {
            return fut.await;
        }

        let (parent, base_context) = if self.detached {
            (None, SpanContext::empty())
        } else {
            (propagator::current(), SpanContext::capture())
        };
        let active = ActiveSpan::open(&self.name, inputs.into(), parent);
        let context = base_context.child_of(active.clone());

        let mut cancel_guard = CancelGuard::new(self.engine.clone(), active.clone());
        let result = fut.with_span_context(context).await;
        cancel_guard.defuse();

        let span = self.close_span(&active, &result);
        self.engine.record_span(span);
        result
    }

    fn close_span<T, E>(
        &self,
        active: &Arc<ActiveSpan>,
        result: &std::result::Result<T, E>,
    ) -> Span
    where
        T: Serialize,
        E: Display,
    {
        match result {
            Ok(value) => {
                let mut span = active.close_ok(snapshot_value(value));
                if let Some(evaluator) = &self.evaluator {
                    let output = span.output.clone().unwrap_or(Value::Null);
                    let metrics =
                        self.engine
                            .evaluators()
                            .evaluate(evaluator, &span.inputs, &output);
                    span.metrics.extend(metrics);
                }
                span
            }
            Err(e) => active.close_err(e.to_string()),
        }
    }
}

/// Closes the span and restores the trace context if the wrapped callable
/// panics. The panic continues to unwind to the caller unchanged.
struct UnwindGuard {
    engine: TraceEngine,
    state: Option<(Arc<ActiveSpan>, propagator::ContextToken)>,
}

impl UnwindGuard {
    fn new(engine: TraceEngine, span: Arc<ActiveSpan>, token: propagator::ContextToken) -> Self {
        Self {
            engine,
            state: Some((span, token)),
        }
    }

    fn defuse(&mut self) -> Option<propagator::ContextToken> {
        self.state.take().map(|(_, token)| token)
    }
}

impl Drop for UnwindGuard {
    fn drop(&mut self) {
        if let Some((span, token)) = self.state.take() {
            if let Err(e) = propagator::pop(token) {
                error!(span = %span.name(), error = %e, "trace context corrupted; span tree may be wrong");
            }
            warn!(span = %span.name(), "instrumented call panicked before completion");
            let closed = span.close_err("call panicked before completion");
            self.engine.record_span(closed);
        }
    }
}

/// Closes the span if the instrumented future is dropped before completing.
struct CancelGuard {
    engine: TraceEngine,
    span: Option<Arc<ActiveSpan>>,
}

impl CancelGuard {
    fn new(engine: TraceEngine, span: Arc<ActiveSpan>) -> Self {
        Self {
            engine,
            span: Some(span),
        }
    }

    fn defuse(&mut self) {
        self.span = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(active) = self.span.take() {
            warn!(span = %active.name(), "instrumented call cancelled before completion");
            let span = active.close_err("call cancelled before completion");
            self.engine.record_span(span);
        }
    }
}
