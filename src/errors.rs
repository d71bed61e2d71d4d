//! Error types for the intent-gate crate.
//!
//! This module defines a unified error enumeration used across the intent
//! store, the state machine, the trace ledger, and the hook pipeline. It
//! integrates with `thiserror` to provide rich `Display` implementations
//! and error source chaining where applicable.
//!
//! Guard failures (`IntentNotFound`, `IntentCompleted`, `IntentLocked`)
//! carry a *guided recovery* payload: the violation, the set of currently
//! workable intent identifiers, and the single remediation step. Hosts can
//! render the payload programmatically via [`OrchestrationError::recovery`]
//! instead of scraping the message text.

use thiserror::Error;

/// Structured remediation payload attached to intent-guard failures.
///
/// Pairs the violation with the legal alternatives and one concrete,
/// machine-actionable remediation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// What was violated, as a single human-readable line.
    pub violation: String,
    /// Intent identifiers that are currently legal targets for work.
    pub alternatives: Vec<String>,
    /// The one step that resolves the violation.
    pub remediation: String,
}

#[derive(Error, Debug)]
/// Unified error enumeration for the intent-gate library.
///
/// - Used across ledger I/O, intent lifecycle, classification and the
///   pipeline driver.
/// - Implements `std::error::Error` via `thiserror`.
pub enum OrchestrationError {
    /// A persisted document (intent ledger or trace ledger) is absent.
    #[error("File missing: {0}")]
    FileMissing(String),

    /// A persisted document failed to parse or violates its schema.
    #[error("Malformed document `{path}`: {detail}")]
    MalformedDocument { path: String, detail: String },

    /// The referenced intent does not exist in the ledger.
    #[error(
        "Intent `{id}` not found. Workable intents: [{}]. Declare the intent in the ledger or target one of the workable ids.",
        .workable.join(", ")
    )]
    IntentNotFound { id: String, workable: Vec<String> },

    /// The referenced intent is in the terminal `COMPLETED` state.
    #[error(
        "Intent `{id}` is COMPLETED and accepts no further work. Workable intents: [{}]. Manually reopen the intent in the ledger to continue.",
        .workable.join(", ")
    )]
    IntentCompleted { id: String, workable: Vec<String> },

    /// The referenced intent is `LOCKED` pending administrative action.
    #[error(
        "Intent `{id}` is LOCKED. Workable intents: [{}]. Seek an administrative unlock to resume work on it.",
        .workable.join(", ")
    )]
    IntentLocked { id: String, workable: Vec<String> },

    /// The requested status transition is not in the legal table.
    #[error("Illegal transition for intent `{id}`: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: String,
        to: String,
    },

    /// The event's target path lies outside every owned scope pattern.
    #[error("Scope violation")]
    ScopeViolation(String),

    /// Another invocation holds the path lock, or the workspace revision
    /// moved out from under the session.
    #[error("Concurrency conflict detected")]
    ConcurrencyConflict { expected: String, actual: String },

    /// The human approver rejected the command, or the approval timed out.
    #[error("Human approval denied")]
    ApprovalDenied,

    /// The caller-supplied executor returned an error.
    #[error("{0}")]
    ExecutorFailure(String),

    /// A post-execution step (formatter, linter, trace append) failed.
    #[error("Post-processing failure: {0}")]
    PostProcessingFailure(String),

    /// I/O error from an underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Guided-recovery payload for intent-guard failures; `None` for every
    /// other error kind.
    pub fn recovery(&self) -> Option<Recovery> {
        match self {
            OrchestrationError::IntentNotFound { id, workable } => Some(Recovery {
                violation: format!("Intent `{id}` not found"),
                alternatives: workable.clone(),
                remediation: "Declare the intent in the ledger or target a workable id".into(),
            }),
            OrchestrationError::IntentCompleted { id, workable } => Some(Recovery {
                violation: format!("Intent `{id}` is COMPLETED"),
                alternatives: workable.clone(),
                remediation: "Manually reopen the intent in the ledger".into(),
            }),
            OrchestrationError::IntentLocked { id, workable } => Some(Recovery {
                violation: format!("Intent `{id}` is LOCKED"),
                alternatives: workable.clone(),
                remediation: "Seek an administrative unlock".into(),
            }),
            _ => None,
        }
    }

    /// Whether the caller may retry the identical call and expect it to
    /// succeed once the transient condition clears.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestrationError::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_message_carries_workable_ids() {
        let err = OrchestrationError::IntentCompleted {
            id: "INT-003".into(),
            workable: vec!["INT-001".into(), "INT-002".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("COMPLETED"));
        assert!(msg.contains("INT-001"));
        assert!(msg.contains("INT-002"));
    }

    #[test]
    fn recovery_payload_only_for_guard_errors() {
        let guard = OrchestrationError::IntentLocked {
            id: "INT-007".into(),
            workable: vec!["INT-001".into()],
        };
        let recovery = guard.recovery().expect("guard errors carry recovery");
        assert_eq!(recovery.alternatives, vec!["INT-001".to_string()]);
        assert!(recovery.remediation.contains("administrative"));

        assert!(OrchestrationError::ApprovalDenied.recovery().is_none());
    }

    #[test]
    fn only_concurrency_conflicts_are_retryable() {
        let conflict = OrchestrationError::ConcurrencyConflict {
            expected: "a".repeat(40),
            actual: "b".repeat(40),
        };
        assert!(conflict.is_retryable());
        assert!(!OrchestrationError::ApprovalDenied.is_retryable());
    }
}
