//! Diagnostics sink for model checks and recoverable analysis failures.

use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; the run continues, possibly with a clamped parameter.
    Warning,
    /// The current analysis is aborted.
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: String,
    pub message: String,
}

/// Receives diagnostics from devices and analysis drivers.
pub trait Reporter: Debug {
    fn report(&mut self, severity: Severity, source: &str, message: &str);

    /// Diagnostics retained so far, for reporters that keep them.
    fn diagnostics(&self) -> &[Diagnostic] {
        &[]
    }
}

/// Forwards every diagnostic to `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, severity: Severity, source: &str, message: &str) {
        match severity {
            Severity::Warning => tracing::warn!(source, "{message}"),
            Severity::Fatal => tracing::error!(source, "{message}"),
        }
    }
}

/// Logs like [`TracingReporter`] and keeps a copy of each diagnostic.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    entries: Vec<Diagnostic>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, severity: Severity, source: &str, message: &str) {
        TracingReporter.report(severity, source, message);
        self.entries.push(Diagnostic {
            severity,
            source: source.to_string(),
            message: message.to_string(),
        });
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        &self.entries
    }
}
