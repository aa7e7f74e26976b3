//! Exporter and lookup interfaces.
//!
//! The engine hands every closed span and every sealed run to a
//! [`SpanExporter`]; persistence, retry, and buffering are the exporter's
//! concern, never the engine's. Post-hoc evaluation retrieves previously
//! closed spans through a [`SpanFinder`].
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryExporter`]: thread-safe span/run storage with callbacks and
//!   filtering, the default backing store and the post-hoc lookup
//!   collaborator for tests and local use.
//! - [`NullExporter`]: discards everything, for deployments that trace but
//!   do not collect.

pub mod memory;
pub mod null;

use crate::error::Result;
use crate::run::Run;
use crate::span::{Span, SpanStatus};

// Re-export main types
pub use memory::{InMemoryExporter, SpanCallback};
pub use null::NullExporter;

/// Destination for closed spans and sealed runs.
///
/// Implementations are called synchronously at span-close and run-close time
/// and should return quickly; the engine does not retry on failure.
pub trait SpanExporter: Send + Sync {
    /// Persist a closed span.
    fn store_span(&self, span: &Span) -> Result<()>;

    /// Persist a sealed run.
    fn store_run(&self, run: &Run) -> Result<()>;
}

/// Lookup of previously closed spans, used for post-hoc evaluation.
pub trait SpanFinder: Send + Sync {
    /// Retrieve closed spans matching the filter.
    fn find_spans(&self, filter: &SpanFilter) -> Result<Vec<Span>>;
}

/// Trait for custom span predicates used by store queries.
///
/// Implemented for any matching closure, so plain functions work directly.
pub trait SpanFilterFn: Send + Sync {
    /// Test whether a span passes the filter.
    fn matches(&self, span: &Span) -> bool;
}

impl<F> SpanFilterFn for F
where
    F: Fn(&Span) -> bool + Send + Sync,
{
    fn matches(&self, span: &Span) -> bool {
        self(span)
    }
}

/// Declarative criteria for retrieving spans.
///
/// All fields are optional; an empty filter matches every span.
///
/// # Examples
///
/// ```
/// use agentrace::export::SpanFilter;
/// use agentrace::span::SpanStatus;
///
/// let filter = SpanFilter::new().with_name("summarize").with_status(SpanStatus::Error);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpanFilter {
    /// Match only spans with one of these ids.
    pub ids: Option<Vec<String>>,
    /// Match only spans with this name.
    pub name: Option<String>,
    /// Match only spans with this parent.
    pub parent_id: Option<String>,
    /// Match only spans with this status.
    pub status: Option<SpanStatus>,
    /// Match only spans that started at or after this timestamp.
    pub started_after: Option<f64>,
    /// Match only spans that ended at or before this timestamp.
    pub ended_before: Option<f64>,
}

impl SpanFilter {
    /// An empty filter matching every span.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a single span id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    /// Restrict to spans with the given name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to children of the given span.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Restrict to spans with the given status.
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to spans that started at or after the timestamp.
    pub fn started_after(mut self, timestamp: f64) -> Self {
        self.started_after = Some(timestamp);
        self
    }

    /// Restrict to spans that ended at or before the timestamp.
    pub fn ended_before(mut self, timestamp: f64) -> Self {
        self.ended_before = Some(timestamp);
        self
    }

    /// Test whether a span satisfies every criterion in this filter.
    pub fn matches(&self, span: &Span) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &span.id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if name != &span.name {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if span.parent_id.as_deref() != Some(parent_id.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if span.status != status {
                return false;
            }
        }
        if let Some(start) = self.started_after {
            if span.start_time < start {
                return false;
            }
        }
        if let Some(end) = self.ended_before {
            if span.end_time > end {
                return false;
            }
        }
        true
    }
}
