//! In-memory span and run storage with callbacks and filtering.
//!
//! This module provides thread-safe storage for closed spans and sealed runs,
//! with support for callbacks, filtering by time range and custom predicates,
//! and last-N queries. It implements both [`SpanExporter`] and [`SpanFinder`],
//! so it doubles as the post-hoc evaluation lookup in tests and local use.

use super::{SpanExporter, SpanFilter, SpanFilterFn, SpanFinder};
use crate::error::Result;
use crate::run::Run;
use crate::span::Span;
use std::sync::{Arc, Mutex};

/// Type alias for span callback functions.
pub type SpanCallback = Arc<dyn Fn(&Span) + Send + Sync>;

/// Store for capturing and querying spans and runs.
///
/// `InMemoryExporter` provides thread-safe storage with support for:
/// - Callbacks triggered on each stored span
/// - Filtering by time range
/// - Custom filter predicates
/// - Query for last N spans
pub struct InMemoryExporter {
    spans: Mutex<Vec<Span>>,
    runs: Mutex<Vec<Run>>,
    on_store_callback: Option<SpanCallback>,
}

impl InMemoryExporter {
    /// Create a new in-memory exporter.
    ///
    /// # Arguments
    ///
    /// * `on_store_callback` - Optional callback function called whenever a span is stored
    pub fn new(on_store_callback: Option<SpanCallback>) -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            on_store_callback,
        }
    }

    /// Get a stored span by id.
    pub fn get_span(&self, id: &str) -> Option<Span> {
        let spans = self.spans.lock().unwrap();
        spans.iter().find(|s| s.id == id).cloned()
    }

    /// Get a stored run by name.
    pub fn get_run(&self, name: &str) -> Option<Run> {
        let runs = self.runs.lock().unwrap();
        runs.iter().find(|r| r.name == name).cloned()
    }

    /// Get all stored runs.
    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    /// Count spans matching filters.
    ///
    /// # Arguments
    ///
    /// * `started_after` - Include spans with start_time >= started_after
    /// * `ended_before` - Include spans with end_time <= ended_before
    /// * `filter_func` - Custom filter function to apply to spans
    ///
    /// # Returns
    ///
    /// Number of spans matching the filter criteria
    pub fn count_spans(
        &self,
        started_after: Option<f64>,
        ended_before: Option<f64>,
        filter_func: Option<&dyn SpanFilterFn>,
    ) -> usize {
        let spans = self.spans.lock().unwrap();
        spans
            .iter()
            .filter(|span| Self::passes(span, started_after, ended_before, filter_func))
            .count()
    }

    /// Get summaries of spans matching filters.
    ///
    /// Returns printable summaries instead of cloning spans.
    ///
    /// # Arguments
    ///
    /// * `started_after` - Include spans with start_time >= started_after
    /// * `ended_before` - Include spans with end_time <= ended_before
    /// * `filter_func` - Custom filter function to apply to spans
    ///
    /// # Returns
    ///
    /// Vector of span summaries matching the filter criteria
    pub fn get_span_summaries(
        &self,
        started_after: Option<f64>,
        ended_before: Option<f64>,
        filter_func: Option<&dyn SpanFilterFn>,
    ) -> Vec<String> {
        let spans = self.spans.lock().unwrap();
        spans
            .iter()
            .filter(|span| Self::passes(span, started_after, ended_before, filter_func))
            .map(Span::printable_summary)
            .collect()
    }

    /// Get the last N span summaries, optionally filtered.
    ///
    /// # Arguments
    ///
    /// * `n` - Number of spans to return
    /// * `filter_func` - Optional custom filter function
    ///
    /// # Returns
    ///
    /// Vector of the last N span summaries matching the filter criteria
    pub fn get_last_n_summaries(
        &self,
        n: usize,
        filter_func: Option<&dyn SpanFilterFn>,
    ) -> Vec<String> {
        let spans = self.spans.lock().unwrap();

        let filtered: Vec<&Span> = if let Some(filter) = filter_func {
            spans.iter().filter(|s| filter.matches(s)).collect()
        } else {
            spans.iter().collect()
        };

        let start_idx = filtered.len().saturating_sub(n);
        filtered[start_idx..].iter().map(|s| s.printable_summary()).collect()
    }

    /// Clear all stored spans and runs.
    pub fn clear(&self) {
        self.spans.lock().unwrap().clear();
        self.runs.lock().unwrap().clear();
    }

    /// Get the total number of stored spans.
    pub fn len(&self) -> usize {
        self.spans.lock().unwrap().len()
    }

    /// Check if the store holds no spans.
    pub fn is_empty(&self) -> bool {
        self.spans.lock().unwrap().is_empty()
    }

    fn passes(
        span: &Span,
        started_after: Option<f64>,
        ended_before: Option<f64>,
        filter_func: Option<&dyn SpanFilterFn>,
    ) -> bool {
        if let Some(start) = started_after {
            if span.start_time < start {
                return false;
            }
        }
        if let Some(end) = ended_before {
            if span.end_time > end {
                return false;
            }
        }
        if let Some(filter) = filter_func {
            if !filter.matches(span) {
                return false;
            }
        }
        true
    }
}

impl Default for InMemoryExporter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SpanExporter for InMemoryExporter {
    /// Store a span, replacing any previously stored copy with the same id.
    ///
    /// Post-hoc evaluation re-stores updated copies under the same id; the
    /// store holds one entry per span regardless of how often it is scored.
    fn store_span(&self, span: &Span) -> Result<()> {
        // Trigger callback before storing (if exists)
        if let Some(callback) = &self.on_store_callback {
            callback(span);
        }

        let mut spans = self.spans.lock().unwrap();
        match spans.iter_mut().find(|s| s.id == span.id) {
            Some(existing) => *existing = span.clone(),
            None => spans.push(span.clone()),
        }
        Ok(())
    }

    fn store_run(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(run.clone());
        Ok(())
    }
}

impl SpanFinder for InMemoryExporter {
    fn find_spans(&self, filter: &SpanFilter) -> Result<Vec<Span>> {
        let spans = self.spans.lock().unwrap();
        Ok(spans.iter().filter(|s| filter.matches(s)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{ActiveSpan, SpanInputs, SpanStatus};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn closed_span(name: &str) -> Span {
        ActiveSpan::open(name, SpanInputs::new(), None).close_ok(json!(null))
    }

    #[test]
    fn test_store_span() {
        let store = InMemoryExporter::default();

        store.store_span(&closed_span("call")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_callback_triggered() {
        let callback_count = Arc::new(AtomicUsize::new(0));
        let callback_count_clone = Arc::clone(&callback_count);

        let callback: SpanCallback = Arc::new(move |_span| {
            callback_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let store = InMemoryExporter::new(Some(callback));
        store.store_span(&closed_span("call")).unwrap();

        assert_eq!(callback_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_store_span_replaces_by_id() {
        let store = InMemoryExporter::default();
        let mut span = closed_span("call");
        store.store_span(&span).unwrap();

        span.metrics.insert("quality_score".to_string(), 0.9);
        store.store_span(&span).unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get_span(&span.id).unwrap();
        assert_eq!(stored.metrics.get("quality_score"), Some(&0.9));
    }

    #[test]
    fn test_find_spans_applies_filter() {
        let store = InMemoryExporter::default();
        store.store_span(&closed_span("alpha")).unwrap();
        store.store_span(&closed_span("beta")).unwrap();
        let failed = ActiveSpan::open("beta", SpanInputs::new(), None).close_err("boom");
        store.store_span(&failed).unwrap();

        let by_name = store.find_spans(&SpanFilter::new().with_name("beta")).unwrap();
        assert_eq!(by_name.len(), 2);

        let by_status = store
            .find_spans(&SpanFilter::new().with_status(SpanStatus::Error))
            .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].name, "beta");
    }

    #[test]
    fn test_count_spans_with_predicate() {
        let store = InMemoryExporter::default();
        for name in ["a", "ab", "abc"] {
            store.store_span(&closed_span(name)).unwrap();
        }

        let filter = |s: &Span| s.name.len() > 1;
        assert_eq!(store.count_spans(None, None, Some(&filter)), 2);
    }

    #[test]
    fn test_last_n_summaries() {
        let store = InMemoryExporter::default();
        for i in 0..5 {
            store.store_span(&closed_span(&format!("call-{}", i))).unwrap();
        }

        let summaries = store.get_last_n_summaries(2, None);
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].contains("call-3"));
        assert!(summaries[1].contains("call-4"));
    }

    #[test]
    fn test_clear() {
        let store = InMemoryExporter::default();
        store.store_span(&closed_span("call")).unwrap();
        assert!(!store.is_empty());

        store.clear();
        assert!(store.is_empty());
        assert!(store.runs().is_empty());
    }
}
