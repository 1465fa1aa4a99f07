//! Runtime diagnostics.
//!
//! Logic errors that should not crash a production app (an action sent to
//! absent child state, an effect error nobody caught) and test-harness
//! failures are both expressed as an [`Issue`] and routed through an
//! [`IssueReporter`]. Production code logs them, the test harness fails on
//! them, and harness self-tests collect them.

use std::sync::{Arc, Mutex, PoisonError};

/// How serious an [`Issue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational; reported when exhaustivity is relaxed.
    Info,
    /// A logic error that the runtime recovered from.
    Warning,
    /// A failed expectation. Test reporters treat this as a test failure.
    Failure,
}

/// What kind of problem an [`Issue`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// A child action arrived while its child state was absent.
    MissingChildState,
    /// A fallible effect body failed.
    EffectFailed,
    /// State after an action did not match the asserted state.
    StateMismatch,
    /// An assertion expected a state change, but nothing changed.
    ExpectedStateChange,
    /// An action was sent while effect actions were still waiting to be received.
    UnreceivedActions,
    /// An expected effect action was never received, or a different one was.
    ReceiveMismatch,
    /// Effects were still running when the test finished.
    InFlightEffects,
    /// A mutation or action was skipped under relaxed exhaustivity.
    Skipped,
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Issue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Category of the issue.
    pub kind: IssueKind,
    /// Human-readable description, including diffs where relevant.
    pub message: String,
}

impl Issue {
    /// Create a new issue.
    #[must_use]
    pub fn new(severity: Severity, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
        }
    }

    /// A [`Severity::Warning`] issue.
    #[must_use]
    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    /// A [`Severity::Failure`] issue.
    #[must_use]
    pub fn failure(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Failure, kind, message)
    }

    /// A [`Severity::Info`] issue.
    #[must_use]
    pub fn info(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, message)
    }
}

/// Sink for [`Issue`]s.
pub trait IssueReporter: Send + Sync {
    /// Report an issue.
    fn report(&self, issue: Issue);
}

impl<T: IssueReporter + ?Sized> IssueReporter for Arc<T> {
    fn report(&self, issue: Issue) {
        (**self).report(issue);
    }
}

/// Logs issues through `tracing`. The default for reducers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl IssueReporter for TracingReporter {
    fn report(&self, issue: Issue) {
        match issue.severity {
            Severity::Info => tracing::info!(kind = ?issue.kind, "{}", issue.message),
            Severity::Warning => tracing::warn!(kind = ?issue.kind, "{}", issue.message),
            Severity::Failure => tracing::error!(kind = ?issue.kind, "{}", issue.message),
        }
    }
}

/// Panics on [`Severity::Failure`], logs everything else.
///
/// The default for the test harness, so a failed expectation fails the test.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicReporter;

impl IssueReporter for PanicReporter {
    #[allow(clippy::panic)]
    fn report(&self, issue: Issue) {
        if issue.severity == Severity::Failure {
            panic!("{}", issue.message);
        }
        TracingReporter.report(issue);
    }
}

/// Records every issue for later inspection.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    issues: Arc<Mutex<Vec<Issue>>>,
}

impl CollectingReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every issue reported so far.
    #[must_use]
    pub fn issues(&self) -> Vec<Issue> {
        self.issues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded issues.
    pub fn take(&self) -> Vec<Issue> {
        std::mem::take(&mut *self.issues.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Issues of the given severity.
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Vec<Issue> {
        self.issues()
            .into_iter()
            .filter(|issue| issue.severity == severity)
            .collect()
    }

    /// Whether nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl IssueReporter for CollectingReporter {
    fn report(&self, issue: Issue) {
        self.issues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_reporter_shares_buffer_between_clones() {
        let reporter = CollectingReporter::new();
        let clone = reporter.clone();

        clone.report(Issue::warning(IssueKind::MissingChildState, "gone"));
        reporter.report(Issue::info(IssueKind::Skipped, "skipped"));

        assert_eq!(reporter.issues().len(), 2);
        assert_eq!(reporter.with_severity(Severity::Warning).len(), 1);
        assert_eq!(clone.take().len(), 2);
        assert!(reporter.is_empty());
    }

    #[test]
    #[should_panic(expected = "state mismatch")]
    fn panic_reporter_panics_on_failure() {
        PanicReporter.report(Issue::failure(IssueKind::StateMismatch, "state mismatch"));
    }

    #[test]
    fn panic_reporter_tolerates_warnings() {
        PanicReporter.report(Issue::warning(IssueKind::EffectFailed, "logged only"));
    }

    #[test]
    fn issue_displays_its_message() {
        let issue = Issue::failure(IssueKind::ReceiveMismatch, "expected Tick");
        assert_eq!(issue.to_string(), "expected Tick");
    }
}
