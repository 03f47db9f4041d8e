//! Structured diagnostic events emitted by the planner, passes, and budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single diagnostic record. `id` is a stable machine-readable code
/// (e.g. `CHAOS_SKIPPED_BUDGET`), `context` a dotted component path
/// (e.g. `chaos.safety`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: String,
    pub context: String,
    pub severity: Severity,
    pub params: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Vec-backed recorder for diagnostics, instantiated per compilation run.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. Params are `(key, value)` pairs.
    pub fn emit(
        &mut self,
        id: &str,
        context: &str,
        severity: Severity,
        params: Vec<(&str, Value)>,
    ) -> &Diagnostic {
        let diagnostic = Diagnostic {
            id: id.to_string(),
            context: context.to_string(),
            severity,
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            timestamp: Utc::now(),
        };
        self.diagnostics.push(diagnostic);
        self.diagnostics.last().expect("just pushed")
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics with the given id, in emission order.
    pub fn with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.id == id)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}
