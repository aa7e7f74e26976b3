//! Span data model and lifecycle.
//!
//! A [`Span`] is the immutable record of one instrumented call: its captured
//! inputs and output, status, timing, evaluator metrics, and links to its
//! parent and children. Spans are built by the instrumentation wrapper via
//! [`ActiveSpan`], which holds the mutable state of a call that is still in
//! flight, and sealed into a `Span` exactly once when the call completes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use chrono::{DateTime, Local};

/// Ordered mapping of argument name to captured value snapshot.
///
/// Insertion order is preserved so recorded inputs read in declaration order.
pub type SpanInputs = IndexMap<String, Value>;

/// Outcome of an instrumented call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Immutable record of one instrumented call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier, generated when the span opens.
    pub id: String,
    /// Identifier of the enclosing span, or `None` for a root span.
    pub parent_id: Option<String>,
    /// Caller-supplied label for the call.
    pub name: String,
    /// Snapshot of the call's named arguments, captured at call time.
    pub inputs: SpanInputs,
    /// Snapshot of the return value, absent if the call failed.
    pub output: Option<Value>,
    /// Whether the call succeeded or failed.
    pub status: SpanStatus,
    /// Failure message, present only when `status` is `Error`.
    pub error_message: Option<String>,
    /// Monotonic timestamp (Unix seconds) when the span opened.
    pub start_time: f64,
    /// Monotonic timestamp (Unix seconds) when the span closed.
    pub end_time: f64,
    /// Metric name to numeric value, populated by evaluators. May be empty.
    pub metrics: HashMap<String, f64>,
    /// Ids of child spans, in the order the children closed.
    pub children: Vec<String>,
}

impl Span {
    /// Whether this span has no enclosing parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Duration of the instrumented call in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        (self.end_time - self.start_time) * 1000.0
    }

    /// Get a formatted string summary of the span.
    pub fn printable_summary(&self) -> String {
        let dt = DateTime::from_timestamp(self.start_time as i64, 0)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
            .with_timezone(&Local);
        let time_str = dt.format("%H:%M:%S%.3f").to_string();

        let status = match self.status {
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        };

        let mut summary = format!(
            "[{}] Span '{}' (id: {}, status: {})",
            time_str, self.name, self.id, status
        );

        if let Some(parent_id) = &self.parent_id {
            summary.push_str(&format!("\n   Parent: {}", parent_id));
        }

        if !self.inputs.is_empty() {
            let arg_names: Vec<&str> = self.inputs.keys().map(|k| k.as_str()).collect();
            summary.push_str(&format!("\n   Inputs: {}", arg_names.join(", ")));
        }

        if let Some(output) = &self.output {
            let output_str = output.to_string();
            // Truncate on a char boundary; the rendering is arbitrary JSON.
            let output_preview = if output_str.chars().count() > 100 {
                let head: String = output_str.chars().take(100).collect();
                format!("{}...", head)
            } else {
                output_str
            };
            summary.push_str(&format!("\n   Output: {}", output_preview));
        }

        if let Some(message) = &self.error_message {
            summary.push_str(&format!("\n   Error: {}", message));
        }

        if !self.metrics.is_empty() {
            let mut names: Vec<&str> = self.metrics.keys().map(|k| k.as_str()).collect();
            names.sort_unstable();
            summary.push_str(&format!("\n   Metrics: {}", names.join(", ")));
        }

        summary.push_str(&format!("\n   Duration: {:.2}ms", self.duration_ms()));

        summary
    }
}

/// Capture a value snapshot for span inputs or output.
///
/// Values that cannot be serialized are stringified as a type-name placeholder
/// rather than failing the instrumented call.
pub fn snapshot_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| {
        Value::String(format!("<unserializable: {}>", std::any::type_name::<T>()))
    })
}

/// Builder for capturing named call arguments into [`SpanInputs`].
///
/// # Examples
///
/// ```
/// use agentrace::span::InputCapture;
///
/// let inputs = InputCapture::new()
///     .arg("query", &"What is tracing?")
///     .arg("max_tokens", &256)
///     .capture();
///
/// assert_eq!(inputs.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InputCapture {
    values: SpanInputs,
}

impl InputCapture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a named argument by snapshotting its value.
    pub fn arg<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.values.insert(name.into(), snapshot_value(value));
        self
    }

    /// Capture a named argument from its display form.
    ///
    /// Useful for values that do not implement `Serialize`.
    pub fn arg_display(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(name.into(), Value::String(value.to_string()));
        self
    }

    /// Finish the capture, yielding the ordered input mapping.
    pub fn capture(self) -> SpanInputs {
        self.values
    }
}

impl From<InputCapture> for SpanInputs {
    fn from(capture: InputCapture) -> Self {
        capture.values
    }
}

/// Current timestamp as Unix seconds, derived from a monotonic anchor.
///
/// The first call pins a (monotonic instant, wall clock) pair; subsequent
/// timestamps are the anchor plus monotonic elapsed time, so within a process
/// timestamps never move backwards even if the wall clock does.
pub(crate) fn monotonic_timestamp() -> f64 {
    static ANCHOR: OnceLock<(Instant, f64)> = OnceLock::new();
    let (instant, wall) = ANCHOR.get_or_init(|| {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        (Instant::now(), wall)
    });
    wall + instant.elapsed().as_secs_f64()
}

/// Mutable state of a span that is still open.
///
/// An `ActiveSpan` is shared behind an `Arc`: the trace context propagator
/// holds it as the "current" span while the call runs, and closing children
/// append their ids through [`ActiveSpan::record_child`]. The `parent_id` is
/// fixed when the span opens and never changes.
#[derive(Debug)]
pub struct ActiveSpan {
    id: String,
    name: String,
    parent: Option<Arc<ActiveSpan>>,
    inputs: SpanInputs,
    start_time: f64,
    children: Mutex<Vec<String>>,
}

impl ActiveSpan {
    /// Open a new span under the given parent.
    pub(crate) fn open(
        name: impl Into<String>,
        inputs: SpanInputs,
        parent: Option<Arc<ActiveSpan>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            parent,
            inputs,
            start_time: monotonic_timestamp(),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Unique identifier of this span.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Caller-supplied label of this span.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the enclosing span, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref().map(ActiveSpan::id)
    }

    /// Append a closed child's id. Called once per child, at child close time.
    fn record_child(&self, child_id: &str) {
        let mut children = self.children.lock().unwrap();
        children.push(child_id.to_string());
    }

    /// Seal this span as succeeded, with the captured output.
    pub(crate) fn close_ok(&self, output: Value) -> Span {
        self.close(SpanStatus::Ok, Some(output), None)
    }

    /// Seal this span as failed, with the captured error message.
    pub(crate) fn close_err(&self, message: impl Into<String>) -> Span {
        self.close(SpanStatus::Error, None, Some(message.into()))
    }

    fn close(&self, status: SpanStatus, output: Option<Value>, error_message: Option<String>) -> Span {
        let end_time = monotonic_timestamp();
        let children = self.children.lock().unwrap().clone();

        // Register with the parent at close time so sibling order reflects
        // close order, and nested children land before their parent.
        if let Some(parent) = &self.parent {
            parent.record_child(&self.id);
        }

        Span {
            id: self.id.clone(),
            parent_id: self.parent_id().map(str::to_string),
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            output,
            status,
            error_message,
            start_time: self.start_time,
            end_time,
            metrics: HashMap::new(),
            children,
        }
    }
}
