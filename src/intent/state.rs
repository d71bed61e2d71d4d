//! Intent State Machine: legal transitions, guard evaluation, and
//! guided-recovery error synthesis.
//!
//! Legal transitions:
//!
//! ```text
//!  PENDING      -> IN_PROGRESS
//!  IN_PROGRESS  -> COMPLETED
//!  IN_PROGRESS  -> LOCKED
//!  COMPLETED    -> (terminal)
//!  LOCKED       -> IN_PROGRESS   (administrative override only)
//! ```
//!
//! Every mutation runs as a single read-modify-write against the
//! [`IntentStore`], so a transition either lands fully in the ledger or
//! not at all.

use std::sync::Arc;

use crate::errors::OrchestrationError;
use crate::intent::IntentStatus;
use crate::intent::store::IntentStore;

/// Whether `from -> to` appears in the legal-transition table.
///
/// `LOCKED -> IN_PROGRESS` is legal only for administrative callers; the
/// crate does not define how a caller earns that identity, only that the
/// operation requires it.
pub fn is_legal_transition(from: IntentStatus, to: IntentStatus, admin: bool) -> bool {
    matches!(
        (from, to),
        (IntentStatus::Pending, IntentStatus::InProgress)
            | (IntentStatus::InProgress, IntentStatus::Completed)
            | (IntentStatus::InProgress, IntentStatus::Locked)
    ) || (admin && from == IntentStatus::Locked && to == IntentStatus::InProgress)
}

/// Lifecycle driver over the persisted ledger.
pub struct IntentStateMachine {
    store: Arc<IntentStore>,
}

impl IntentStateMachine {
    pub fn new(store: Arc<IntentStore>) -> Self {
        Self { store }
    }

    /// Current status of an intent; absent status fields have already
    /// been normalized to `PENDING` on load.
    pub fn status(&self, id: &str) -> Result<IntentStatus, OrchestrationError> {
        Ok(self.store.load_one(id)?.status)
    }

    /// Move an intent to `target`, enforcing the legal table.
    pub fn transition(
        &self,
        id: &str,
        target: IntentStatus,
        admin: bool,
    ) -> Result<(), OrchestrationError> {
        self.store.update(|ledger| {
            let workable = ledger.workable_ids();
            let intent =
                ledger
                    .find_mut(id)
                    .ok_or_else(|| OrchestrationError::IntentNotFound {
                        id: id.to_string(),
                        workable,
                    })?;
            if !is_legal_transition(intent.status, target, admin) {
                return Err(OrchestrationError::IllegalTransition {
                    id: id.to_string(),
                    from: intent.status.as_str().to_string(),
                    to: target.as_str().to_string(),
                });
            }
            tracing::info!(id, from = %intent.status, to = %target, "intent transition");
            intent.status = target;
            Ok(())
        })
    }

    /// Admit-or-reject check run before any tool invocation.
    ///
    /// Returns the current status when it is workable; otherwise fails
    /// with a guided-recovery error naming the violation, the workable
    /// alternatives, and the remediation step.
    pub fn guard(&self, id: &str) -> Result<IntentStatus, OrchestrationError> {
        let ledger = self.store.load_ledger()?;
        let workable = ledger.workable_ids();
        let Some(intent) = ledger.find(id) else {
            return Err(OrchestrationError::IntentNotFound {
                id: id.to_string(),
                workable,
            });
        };
        match intent.status {
            status if status.is_workable() => Ok(status),
            IntentStatus::Completed => Err(OrchestrationError::IntentCompleted {
                id: id.to_string(),
                workable,
            }),
            _ => Err(OrchestrationError::IntentLocked {
                id: id.to_string(),
                workable,
            }),
        }
    }

    /// Transition from `PENDING` to `IN_PROGRESS`; no-op when already
    /// `IN_PROGRESS`.
    pub fn mark_in_progress(&self, id: &str) -> Result<(), OrchestrationError> {
        if self.status(id)? == IntentStatus::InProgress {
            return Ok(());
        }
        self.transition(id, IntentStatus::InProgress, false)
    }

    /// Transition to the terminal `COMPLETED` state.
    pub fn mark_completed(&self, id: &str) -> Result<(), OrchestrationError> {
        self.transition(id, IntentStatus::Completed, false)
    }

    /// Freeze the intent pending administrative action.
    pub fn lock(&self, id: &str) -> Result<(), OrchestrationError> {
        self.transition(id, IntentStatus::Locked, false)
    }
}
