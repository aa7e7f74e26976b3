//! The sealed run record.

use super::aggregation::AggregationSpec;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named scope grouping spans for aggregate reporting.
///
/// A `Run` is produced when its scope closes and is read-only from then on:
/// the span set is final and `summary_metrics` holds one entry per
/// aggregation spec that collected at least one value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier, generated at run open.
    pub id: String,
    /// Caller-supplied name, unique within the engine's lifetime.
    pub name: String,
    /// Declared configuration values, captured verbatim at run open.
    pub config_snapshot: HashMap<String, Value>,
    /// The `(metric, aggregation)` pairs declared at run open.
    pub aggregation_specs: Vec<AggregationSpec>,
    /// Every span closed while this run was the innermost active run.
    pub spans: Vec<Span>,
    /// Aggregated metrics, keyed `{metric}_{aggregation}`.
    pub summary_metrics: HashMap<String, f64>,
    /// Monotonic timestamp (Unix seconds) when the run opened.
    pub started_at: f64,
    /// Monotonic timestamp (Unix seconds) when the run was sealed.
    pub ended_at: f64,
}

impl Run {
    /// Number of spans collected by this run.
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Value of a summary metric, if the spec collected any values.
    pub fn summary(&self, key: &str) -> Option<f64> {
        self.summary_metrics.get(key).copied()
    }
}
