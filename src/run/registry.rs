//! Tracking of active runs and run-scope lifecycle.
//!
//! The registry owns the stack of currently open runs. Every mutation (open,
//! span append, close) happens under the registry's single lock, so a span
//! can never be appended to a run whose close has already started: once
//! `close` pops the run off the stack, later spans simply fall through to the
//! enclosing run (or to no run at all).

use super::aggregation::{summarize, AggregationSpec};
use super::model::Run;
use crate::error::{AgentraceError, Result};
use crate::export::SpanExporter;
use crate::span::{monotonic_timestamp, Span};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

struct ActiveRun {
    id: String,
    name: String,
    config_snapshot: HashMap<String, Value>,
    specs: Vec<AggregationSpec>,
    spans: Vec<Span>,
    started_at: f64,
}

#[derive(Default)]
struct RegistryState {
    /// Innermost active run is last.
    active: Vec<ActiveRun>,
    /// Every run name seen during this registry's lifetime.
    used_names: HashSet<String>,
}

/// Registry of active runs.
///
/// Runs may be nested; a span belongs to the innermost active run only. Run
/// names must be unique for the registry's lifetime, and a duplicate is
/// rejected immediately at open.
#[derive(Default)]
pub struct RunRegistry {
    state: Mutex<RegistryState>,
}

impl RunRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a run, making it the innermost active run.
    ///
    /// Returns the new run's id. Fails with [`AgentraceError::RunError`] if
    /// the name was already used during this registry's lifetime.
    pub fn open(
        &self,
        name: impl Into<String>,
        specs: Vec<AggregationSpec>,
        config_snapshot: HashMap<String, Value>,
    ) -> Result<String> {
        let name = name.into();
        let mut state = self.state.lock().unwrap();

        if !state.used_names.insert(name.clone()) {
            return Err(AgentraceError::RunError(format!(
                "duplicate run name: {}",
                name
            )));
        }

        let id = Uuid::new_v4().to_string();
        debug!(run = %name, id = %id, "opening run");
        state.active.push(ActiveRun {
            id: id.clone(),
            name,
            config_snapshot,
            specs,
            spans: Vec::new(),
            started_at: monotonic_timestamp(),
        });

        Ok(id)
    }

    /// Append a closed span to the innermost active run.
    ///
    /// Returns `false` when no run is active, in which case the span is not
    /// associated with any run.
    pub fn record_span(&self, span: &Span) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.active.last_mut() {
            Some(run) => {
                run.spans.push(span.clone());
                true
            }
            None => false,
        }
    }

    /// Seal the run with the given id and compute its summary metrics.
    ///
    /// Only the innermost active run may be closed; closing an outer run
    /// while an inner one is still open, or closing a run twice, is a
    /// configuration error reported here.
    pub fn close(&self, run_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();

        match state.active.last() {
            Some(innermost) if innermost.id == run_id => {}
            Some(_) if state.active.iter().any(|r| r.id == run_id) => {
                return Err(AgentraceError::RunError(format!(
                    "run {} is not the innermost active run; close nested runs first",
                    run_id
                )));
            }
            _ => {
                return Err(AgentraceError::RunError(format!(
                    "run {} is not active (already closed or never opened)",
                    run_id
                )));
            }
        }

        let active = state.active.pop().unwrap();
        drop(state);

        let summary_metrics = summarize(&active.specs, &active.spans);
        debug!(run = %active.name, spans = active.spans.len(), "sealed run");

        Ok(Run {
            id: active.id,
            name: active.name,
            config_snapshot: active.config_snapshot,
            aggregation_specs: active.specs,
            spans: active.spans,
            summary_metrics,
            started_at: active.started_at,
            ended_at: monotonic_timestamp(),
        })
    }

    /// Name of the innermost active run, if any.
    pub fn active_run_name(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.active.last().map(|r| r.name.clone())
    }
}

/// Handle to an open run.
///
/// Close it explicitly with [`RunHandle::close`] to obtain the sealed
/// [`Run`]. If the handle is dropped without closing, say by an early return
/// or a panic unwinding the scope, the run is sealed and exported as a fallback,
/// so no run is ever left permanently open.
pub struct RunHandle {
    registry: Arc<RunRegistry>,
    exporter: Arc<dyn SpanExporter>,
    id: String,
    name: String,
    closed: bool,
}

impl RunHandle {
    pub(crate) fn new(
        registry: Arc<RunRegistry>,
        exporter: Arc<dyn SpanExporter>,
        id: String,
        name: String,
    ) -> Self {
        Self {
            registry,
            exporter,
            id,
            name,
            closed: false,
        }
    }

    /// Unique identifier of the run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the run.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seal the run, compute summary metrics, and hand it to the exporter.
    ///
    /// The sealed run is returned to the caller even if the exporter fails;
    /// exporter errors are logged, not propagated, since the computed run is
    /// not lost.
    pub fn close(mut self) -> Result<Run> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<Run> {
        self.closed = true;
        let run = self.registry.close(&self.id)?;
        if let Err(e) = self.exporter.store_run(&run) {
            warn!(run = %run.name, error = %e, "exporter failed to store run");
        }
        Ok(run)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.closed {
            match self.close_inner() {
                Ok(run) => debug!(run = %run.name, "run sealed on drop"),
                Err(e) => warn!(run = %self.name, error = %e, "failed to seal run on drop"),
            }
        }
    }
}
