//! Aggregation functions applied to evaluator metrics at run close.

use crate::error::{AgentraceError, Result};
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Median,
    Stdev,
    Min,
    Max,
}

impl Aggregation {
    /// Apply this aggregation to the collected values.
    ///
    /// Returns `None` when no summary is defined: an empty collection for any
    /// function, or fewer than two values for `Stdev` (sample standard
    /// deviation divides by N−1).
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregation::Mean => Some(mean(values)),
            Aggregation::Median => Some(median(values)),
            Aggregation::Stdev => stdev(values),
            Aggregation::Min => values.iter().copied().reduce(f64::min),
            Aggregation::Max => values.iter().copied().reduce(f64::max),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Stdev => "stdev",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Aggregation {
    type Err = AgentraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "stdev" => Ok(Aggregation::Stdev),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            other => Err(AgentraceError::ConfigError(format!(
                "unknown aggregation function: {}. Use 'mean', 'median', 'stdev', 'min', or 'max'",
                other
            ))),
        }
    }
}

/// A declared `(metric name, aggregation function)` pair, evaluated at run close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Name of the evaluator metric to aggregate.
    pub metric: String,
    /// Aggregation function to apply.
    pub aggregation: Aggregation,
}

impl AggregationSpec {
    /// Create a spec from a metric name and aggregation function.
    pub fn new(metric: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            metric: metric.into(),
            aggregation,
        }
    }

    /// Create a spec from a metric name and an aggregation function name.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentrace::run::AggregationSpec;
    ///
    /// let spec = AggregationSpec::parse("quality_score", "mean").unwrap();
    /// assert_eq!(spec.summary_key(), "quality_score_mean");
    /// ```
    pub fn parse(metric: impl Into<String>, aggregation: &str) -> Result<Self> {
        Ok(Self::new(metric, aggregation.parse()?))
    }

    /// The key this spec produces in the run's summary metrics.
    pub fn summary_key(&self) -> String {
        format!("{}_{}", self.metric, self.aggregation)
    }
}

/// Compute summary metrics for the given specs over the run's spans.
///
/// Spans missing a metric are skipped, not treated as zero. Specs that
/// collect no values produce no summary key at all.
pub(crate) fn summarize(specs: &[AggregationSpec], spans: &[Span]) -> HashMap<String, f64> {
    let mut summary = HashMap::new();
    for spec in specs {
        let values: Vec<f64> = spans
            .iter()
            .filter_map(|span| span.metrics.get(&spec.metric).copied())
            .collect();
        if let Some(value) = spec.aggregation.apply(&values) {
            summary.insert(spec.summary_key(), value);
        }
    }
    summary
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

// Sample standard deviation; undefined for fewer than two values.
fn stdev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(variance.sqrt())
}
