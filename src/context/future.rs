//! Async propagation of the trace context.
//!
//! Tokio tasks migrate between worker threads, so the thread-local span stack
//! cannot follow a future on its own. [`WithSpanContext`] carries a captured
//! [`SpanContext`] and re-attaches it for the duration of every poll, keeping
//! the logical call's span current across suspension points.

use super::propagator::SpanContext;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

pin_project! {
    /// A future that has an associated trace context.
    #[derive(Debug, Clone)]
    pub struct WithSpanContext<T> {
        #[pin]
        inner: T,
        context: SpanContext,
    }
}

impl<T: Future> Future for WithSpanContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.context.clone().attach();
        this.inner.poll(task_cx)
    }
}

/// Extension trait attaching a trace context to futures.
pub trait TraceFutureExt: Sized {
    /// Attach the provided [`SpanContext`] to this future.
    ///
    /// While the future is being polled, the attached context is current on
    /// the polling thread.
    fn with_span_context(self, context: SpanContext) -> WithSpanContext<Self> {
        WithSpanContext {
            inner: self,
            context,
        }
    }

    /// Attach the calling execution path's current context to this future.
    ///
    /// Capture happens here, at spawn time, not at first poll.
    fn with_current_context(self) -> WithSpanContext<Self> {
        let context = SpanContext::capture();
        self.with_span_context(context)
    }
}

impl<T: Sized> TraceFutureExt for T {}
