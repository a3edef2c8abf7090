//! Report sink for recoverable anomalies.
//!
//! Every degradation in the semantic core (unresolvable reference,
//! linearization failure, duplicate qualified name, malformed producer
//! input) funnels through a [`Reporter`] instead of raising. The reporter
//! counts violations so the caller can decide whether the accumulated
//! severity fails the overall run; the core itself never terminates early.
//!
//! Messages are forwarded to `tracing` at the matching level. Callers that
//! need to inspect messages (tests, diagnostics output) can enable in-memory
//! capture with [`Reporter::with_capture`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity
// ============================================================================

/// Severity of a reported anomaly.
///
/// Ordering is significant: `Violation` is the highest severity and is the
/// only level that increments the violation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Diagnostic chatter (suppressed bindings, cache decisions).
    Debug,
    /// Progress and informational messages.
    Info,
    /// Something is off but the result is still usable.
    Warning,
    /// A problem the user can fix; counts toward failing the run.
    Violation,
}

// ============================================================================
// Report
// ============================================================================

/// A single reported message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Which build step the message belongs to (e.g. `"mro"`, `"docstring"`).
    pub section: String,
    /// Human-readable description, already formatted with source context.
    pub message: String,
    /// Severity level.
    pub severity: Severity,
}

// ============================================================================
// Reporter
// ============================================================================

/// Collecting sink for all recoverable anomalies.
#[derive(Debug, Default)]
pub struct Reporter {
    violations: usize,
    once_seen: HashSet<(String, String)>,
    captured: Option<Vec<Report>>,
}

impl Reporter {
    /// Create a reporter that counts and forwards to `tracing` only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reporter that additionally keeps every message in memory.
    pub fn with_capture() -> Self {
        Reporter {
            captured: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Report a message.
    pub fn report(&mut self, section: &str, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        if severity == Severity::Violation {
            self.violations += 1;
        }
        match severity {
            Severity::Debug => tracing::debug!(section, "{message}"),
            Severity::Info => tracing::info!(section, "{message}"),
            Severity::Warning => tracing::warn!(section, "{message}"),
            Severity::Violation => tracing::warn!(section, violation = true, "{message}"),
        }
        if let Some(captured) = &mut self.captured {
            captured.push(Report {
                section: section.to_string(),
                message,
                severity,
            });
        }
    }

    /// Report a message at most once per `(section, message)` pair.
    pub fn report_once(&mut self, section: &str, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        if !self
            .once_seen
            .insert((section.to_string(), message.clone()))
        {
            return;
        }
        self.report(section, message, severity);
    }

    /// Number of violation-level messages seen so far.
    ///
    /// The caller decides whether a non-zero count fails the run.
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Captured messages, empty unless built with [`Reporter::with_capture`].
    pub fn captured(&self) -> &[Report] {
        self.captured.as_deref().unwrap_or(&[])
    }

    /// Captured messages for one section, in arrival order.
    pub fn captured_in(&self, section: &str) -> Vec<&Report> {
        self.captured()
            .iter()
            .filter(|r| r.section == section)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_counting() {
        let mut reporter = Reporter::new();
        reporter.report("mro", "cannot linearize", Severity::Violation);
        reporter.report("parsing", "processing module", Severity::Info);
        reporter.report("docstring", "existing docstring overridden", Severity::Violation);
        assert_eq!(reporter.violations(), 2);
    }

    #[test]
    fn test_capture_disabled_by_default() {
        let mut reporter = Reporter::new();
        reporter.report("mro", "message", Severity::Warning);
        assert!(reporter.captured().is_empty());
    }

    #[test]
    fn test_capture_records_messages() {
        let mut reporter = Reporter::with_capture();
        reporter.report("mro", "first", Severity::Warning);
        reporter.report("resolve", "second", Severity::Debug);
        let captured = reporter.captured();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].section, "mro");
        assert_eq!(captured[0].message, "first");
        assert_eq!(captured[1].severity, Severity::Debug);
    }

    #[test]
    fn test_report_once_deduplicates() {
        let mut reporter = Reporter::with_capture();
        reporter.report_once("discover", "skipping path", Severity::Warning);
        reporter.report_once("discover", "skipping path", Severity::Warning);
        reporter.report_once("discover", "another path", Severity::Warning);
        assert_eq!(reporter.captured().len(), 2);
    }

    #[test]
    fn test_captured_in_filters_by_section() {
        let mut reporter = Reporter::with_capture();
        reporter.report("mro", "a", Severity::Warning);
        reporter.report("resolve", "b", Severity::Warning);
        reporter.report("mro", "c", Severity::Warning);
        let mro = reporter.captured_in("mro");
        assert_eq!(mro.len(), 2);
        assert_eq!(mro[1].message, "c");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Violation > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Debug);
    }
}
