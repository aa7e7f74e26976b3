//! Per-execution-path tracking of the currently open span.
//!
//! The current span is held in a thread-local stack. Pushing a span makes it
//! current for the calling path and yields a [`ContextToken`]; popping with
//! that token restores the previous span and detects mismatched push/pop
//! pairs, which corrupt the span tree and must never be ignored silently.

use crate::error::{AgentraceError, Result};
use crate::span::ActiveSpan;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT_STACK: RefCell<Vec<Arc<ActiveSpan>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the span currently open on this execution path, if any.
pub fn current() -> Option<Arc<ActiveSpan>> {
    CURRENT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Opaque proof of a prior [`push`], required to [`pop`].
///
/// Tokens are deliberately `!Send`: a push on one execution path cannot be
/// popped from another.
#[derive(Debug)]
pub struct ContextToken {
    span_id: String,
    depth: usize,
    // ties the token to the thread-local it indexes into
    _not_send: PhantomData<*const ()>,
}

impl ContextToken {
    /// Id of the span this token made current.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }
}

/// Mark `span` as current for this execution path.
///
/// Returns a token that must be handed back to [`pop`] when the span's
/// handling ends.
pub fn push(span: Arc<ActiveSpan>) -> ContextToken {
    CURRENT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let span_id = span.id().to_string();
        stack.push(span);
        ContextToken {
            span_id,
            depth: stack.len(),
            _not_send: PhantomData,
        }
    })
}

/// Restore the previous current span for this execution path.
///
/// Fails with [`AgentraceError::ContextError`] if the token does not match
/// the span on top of the stack, which indicates out-of-order or unbalanced
/// push/pop usage.
pub fn pop(token: ContextToken) -> Result<()> {
    CURRENT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            Some(top) if top.id() == token.span_id && stack.len() == token.depth => {
                stack.pop();
                Ok(())
            }
            Some(top) => Err(AgentraceError::ContextError(format!(
                "pop of span {} does not match current span {} at depth {}",
                token.span_id,
                top.id(),
                stack.len()
            ))),
            None => Err(AgentraceError::ContextError(format!(
                "pop of span {} with no span on the context stack",
                token.span_id
            ))),
        }
    })
}

/// A snapshot of one execution path's span stack.
///
/// Capture it at spawn time and [`attach`](SpanContext::attach) it (or wrap a
/// future with [`TraceFutureExt::with_span_context`]) on the new execution
/// path so spans opened there link into the same trace.
///
/// [`TraceFutureExt::with_span_context`]: crate::context::TraceFutureExt::with_span_context
#[derive(Debug, Clone, Default)]
pub struct SpanContext {
    stack: Vec<Arc<ActiveSpan>>,
}

impl SpanContext {
    /// Capture the calling execution path's current span stack.
    pub fn capture() -> Self {
        CURRENT_STACK.with(|stack| Self {
            stack: stack.borrow().clone(),
        })
    }

    /// An empty context; attaching it detaches the path from any trace.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context with `span` as its sole (current) entry.
    pub(crate) fn with_span(span: Arc<ActiveSpan>) -> Self {
        Self { stack: vec![span] }
    }

    /// A copy of this context with `span` pushed on top.
    pub(crate) fn child_of(&self, span: Arc<ActiveSpan>) -> Self {
        let mut stack = self.stack.clone();
        stack.push(span);
        Self { stack }
    }

    /// The span that would be current under this context.
    pub fn current_span(&self) -> Option<&Arc<ActiveSpan>> {
        self.stack.last()
    }

    /// Replace the calling path's context with this one.
    ///
    /// Dropping the returned [`ContextGuard`] restores the previous context.
    pub fn attach(self) -> ContextGuard {
        let previous = CURRENT_STACK.with(|stack| stack.replace(self.stack));
        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }
}

/// Restores the previously attached context when dropped.
pub struct ContextGuard {
    previous: Option<Vec<Arc<ActiveSpan>>>,
    // relies on thread-local state, must not cross threads
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT_STACK.with(|stack| stack.replace(previous));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanInputs;

    fn open_span(name: &str) -> Arc<ActiveSpan> {
        ActiveSpan::open(name, SpanInputs::new(), current())
    }

    #[test]
    fn test_current_is_none_initially() {
        assert!(current().is_none());
    }

    #[test]
    fn test_push_makes_span_current() {
        let span = open_span("outer");
        let token = push(span.clone());

        let seen = current().expect("span should be current");
        assert_eq!(seen.id(), span.id());

        pop(token).unwrap();
        assert!(current().is_none());
    }

    #[test]
    fn test_nested_push_pop_restores_outer() {
        let outer = open_span("outer");
        let outer_token = push(outer.clone());

        let inner = open_span("inner");
        assert_eq!(inner.parent_id(), Some(outer.id()));

        let inner_token = push(inner);
        pop(inner_token).unwrap();

        assert_eq!(current().unwrap().id(), outer.id());
        pop(outer_token).unwrap();
    }

    #[test]
    fn test_out_of_order_pop_is_an_error() {
        let outer_token = push(open_span("outer"));
        let inner_token = push(open_span("inner"));

        let err = pop(outer_token).unwrap_err();
        assert!(err.to_string().contains("does not match"));

        // The stack is untouched after a failed pop.
        pop(inner_token).unwrap();
        assert!(current().is_some());
        CURRENT_STACK.with(|stack| stack.borrow_mut().clear());
    }

    #[test]
    fn test_pop_on_empty_stack_is_an_error() {
        let token = push(open_span("lonely"));
        pop(token).unwrap();

        let orphan = push(open_span("orphan"));
        pop(orphan).unwrap();

        let stale = ContextToken {
            span_id: "gone".to_string(),
            depth: 1,
            _not_send: PhantomData,
        };
        let err = pop(stale).unwrap_err();
        assert!(err.to_string().contains("no span on the context stack"));
    }

    #[test]
    fn test_threads_are_isolated() {
        let span = open_span("main-thread");
        let token = push(span);

        let handle = std::thread::spawn(|| current().is_none());
        assert!(handle.join().unwrap(), "other threads must not see this thread's span");

        pop(token).unwrap();
    }

    #[test]
    fn test_capture_and_attach_hands_off_context() {
        let span = open_span("spawning");
        let token = push(span.clone());
        let captured = SpanContext::capture();
        pop(token).unwrap();

        let expected_id = span.id().to_string();
        let handle = std::thread::spawn(move || {
            let _guard = captured.attach();
            current().map(|s| s.id().to_string())
        });

        assert_eq!(handle.join().unwrap(), Some(expected_id));
        assert!(current().is_none());
    }

    #[test]
    fn test_guard_restores_previous_context() {
        let base = open_span("base");
        let token = push(base.clone());

        {
            let _guard = SpanContext::empty().attach();
            assert!(current().is_none());
        }

        assert_eq!(current().unwrap().id(), base.id());
        pop(token).unwrap();
    }
}
