//! Diagnostic sink, injected as a capability rather than relying on a
//! global logger (§2). The default implementation forwards every
//! diagnostic through `tracing`, at a level matching its severity.

use std::fmt;

/// Severity of one diagnostic emitted while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single diagnostic: a malformed artifact, a scheduling decision
/// worth surfacing, a subprocess failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl fmt::Display) -> Self {
        Self { severity: Severity::Warning, message: message.to_string() }
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self { severity: Severity::Error, message: message.to_string() }
    }
}

/// Capability for reporting diagnostics as the build proceeds.
pub trait Reporter: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing`, at a level matching its
/// severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => tracing::warn!("{}", diagnostic.message),
            Severity::Error => tracing::error!("{}", diagnostic.message),
        }
    }
}

/// Accumulates diagnostics in memory, for tests that need to assert on
/// what was reported.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    diagnostics: std::sync::Mutex<Vec<Diagnostic>>,
}

impl Reporter for CollectingReporter {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push(diagnostic);
    }
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}
