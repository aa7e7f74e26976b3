//! The evaluator contract and composition.

use crate::error::Result;
use crate::span::SpanInputs;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Mapping of metric name to numeric value, as produced by an evaluator.
pub type EvaluatorMetrics = HashMap<String, f64>;

/// A scoring function producing named numeric metrics from a call's inputs
/// and output.
///
/// Evaluators must not mutate the inputs or output they receive; they only
/// observe. An evaluator may fail; its failure is handled by the
/// [`EvaluatorEngine`](crate::eval::EvaluatorEngine) and is distinct from a
/// failure of the instrumented call itself.
///
/// The trait is implemented for any matching closure, so plain functions
/// work directly:
///
/// ```
/// use agentrace::eval::{Evaluator, EvaluatorMetrics};
/// use agentrace::span::SpanInputs;
/// use agentrace::Result;
/// use serde_json::Value;
/// use std::collections::HashMap;
///
/// fn output_present(_inputs: &SpanInputs, output: &Value) -> Result<EvaluatorMetrics> {
///     let score = if output.is_null() { 0.0 } else { 1.0 };
///     Ok(HashMap::from([("output_present".to_string(), score)]))
/// }
///
/// let evaluator: &dyn Evaluator = &output_present;
/// ```
pub trait Evaluator: Send + Sync {
    /// Score a call from its captured inputs and output.
    fn evaluate(&self, inputs: &SpanInputs, output: &Value) -> Result<EvaluatorMetrics>;
}

impl<F> Evaluator for F
where
    F: Fn(&SpanInputs, &Value) -> Result<EvaluatorMetrics> + Send + Sync,
{
    fn evaluate(&self, inputs: &SpanInputs, output: &Value) -> Result<EvaluatorMetrics> {
        self(inputs, output)
    }
}

/// An evaluator built from several smaller evaluators.
///
/// Runs each part in order and unions their metric mappings. Metric name
/// collisions between parts are a caller error; the last writer wins and the
/// engine does not detect it. If any part fails, the composition fails as a
/// whole.
#[derive(Default)]
pub struct CompositeEvaluator {
    parts: Vec<Arc<dyn Evaluator>>,
}

impl CompositeEvaluator {
    /// Create an empty composition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an evaluator to the composition.
    pub fn with(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.parts.push(Arc::new(evaluator));
        self
    }

    /// Add an already-shared evaluator to the composition.
    pub fn with_shared(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.parts.push(evaluator);
        self
    }

    /// Number of composed evaluators.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the composition is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Evaluator for CompositeEvaluator {
    fn evaluate(&self, inputs: &SpanInputs, output: &Value) -> Result<EvaluatorMetrics> {
        let mut metrics = EvaluatorMetrics::new();
        for part in &self.parts {
            metrics.extend(part.evaluate(inputs, output)?);
        }
        Ok(metrics)
    }
}

/// Stock evaluator scoring the length of the response text.
///
/// Strings are measured directly; objects are measured by their `response`
/// or `content` field when present, otherwise by their JSON rendering.
pub fn response_length(_inputs: &SpanInputs, output: &Value) -> Result<EvaluatorMetrics> {
    let length = match output {
        Value::String(text) => text.len(),
        Value::Object(fields) => fields
            .get("response")
            .or_else(|| fields.get("content"))
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or_else(|| output.to_string().len()),
        other => other.to_string().len(),
    };

    Ok(HashMap::from([(
        "response_length".to_string(),
        length as f64,
    )]))
}
