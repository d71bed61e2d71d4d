//! Standard hooks: the built-in pipeline stages, exposed as reusable
//! functions over `(event, context, deps)` so alternate drivers can
//! compose them without the [`HookEngine`](super::HookEngine). Side
//! effects are confined to the intent store, the trace ledger, and the
//! feedback sink.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use path_absolutize::Absolutize;

use crate::config::ContextLimits;
use crate::errors::OrchestrationError;
use crate::intent::IntentStatus;
use crate::intent::state::IntentStateMachine;
use crate::intent::store::IntentStore;
use crate::pipeline::{Approver, HookContext, PathLockGuard, PathLocks, ToolEvent, ToolchainRunner};
use crate::trace::{FileChange, TraceLedger};
use crate::vcs::RevisionProvider;

/// Stage 1: load the intent, evaluate the guard, auto-start pending
/// intents, and populate the context under the context-size controls.
pub fn context_load(
    event: &ToolEvent,
    ctx: &mut HookContext,
    store: &IntentStore,
    machine: &IntentStateMachine,
    limits: &ContextLimits,
) -> Result<(), OrchestrationError> {
    let status = machine.guard(&event.intent_id)?;
    if status == IntentStatus::Pending {
        machine.mark_in_progress(&event.intent_id)?;
    }

    let mut intent = store.load_one(&event.intent_id)?;
    for warning in intent.apply_context_limits(limits) {
        ctx.feedback.push(warning);
    }
    ctx.allowed_paths = intent.owned_scope.clone();
    ctx.active_intent = Some(intent);
    Ok(())
}

/// Stage 3: confine the event's target path to the intent's owned scope.
///
/// Each allowed pattern is reduced to a directory prefix by stripping a
/// trailing `/**`; the absolutized target must fall under at least one
/// prefix. Events without a target path pass trivially.
pub fn scope_validate(
    event: &ToolEvent,
    ctx: &mut HookContext,
) -> Result<(), OrchestrationError> {
    let Some(file_path) = &event.payload.file_path else {
        return Ok(());
    };
    let target = Path::new(file_path).absolutize_from(&ctx.workspace_root)?;

    let allowed = ctx.allowed_paths.iter().any(|pattern| {
        let prefix = pattern.strip_suffix("/**").unwrap_or(pattern);
        match Path::new(prefix).absolutize_from(&ctx.workspace_root) {
            Ok(prefix) => target.starts_with(&prefix),
            Err(_) => false,
        }
    });

    if allowed {
        Ok(())
    } else {
        ctx.feedback.push(format!(
            "Scope violation: Agent attempted to modify {file_path}"
        ));
        Err(OrchestrationError::ScopeViolation(file_path.clone()))
    }
}

/// Stage 4: take the per-path advisory lock and verify the workspace has
/// not moved since the session's recorded sync point.
///
/// The returned guard must be held until pipeline exit. Sessions that
/// never recorded a sync baseline skip the revision comparison.
pub fn concurrency_guard(
    event: &ToolEvent,
    ctx: &mut HookContext,
    locks: &PathLocks,
    last_sync: Option<String>,
    revision: &dyn RevisionProvider,
) -> Result<Option<PathLockGuard>, OrchestrationError> {
    let guard = match &event.payload.file_path {
        Some(file_path) => {
            let target = Path::new(file_path).absolutize_from(&ctx.workspace_root)?;
            match locks.try_lock(&target) {
                Some(guard) => Some(guard),
                None => {
                    let current = revision.current_revision();
                    ctx.feedback.push(format!(
                        "Concurrency conflict: {file_path} is locked by another invocation"
                    ));
                    return Err(OrchestrationError::ConcurrencyConflict {
                        expected: current.clone(),
                        actual: current,
                    });
                }
            }
        }
        None => None,
    };

    if let Some(expected) = last_sync {
        let actual = revision.current_revision();
        if actual != expected {
            ctx.feedback.push(format!(
                "Concurrency conflict: workspace revision moved from {expected} to {actual}"
            ));
            return Err(OrchestrationError::ConcurrencyConflict { expected, actual });
        }
    }

    Ok(guard)
}

/// Stage 5: ask the human approver about destructive commands. Timeouts
/// count as rejection; non-destructive events pass without a prompt.
pub async fn approval_gate(
    event: &ToolEvent,
    ctx: &mut HookContext,
    approver: &dyn Approver,
    timeout: Duration,
) -> Result<(), OrchestrationError> {
    if !event.payload.is_destructive() {
        return Ok(());
    }

    let message = ctx.prompt_builder.render_command(event);
    let approved = tokio::time::timeout(timeout, approver.approve(&message))
        .await
        .unwrap_or(false);
    if approved {
        Ok(())
    } else {
        ctx.feedback
            .push(format!("Approval denied for: {message}"));
        Err(OrchestrationError::ApprovalDenied)
    }
}

/// Stage 7: run the external formatter and linter on the touched file
/// (best-effort, output demoted to feedback) and append the classified
/// file-change entry to the trace ledger.
pub async fn post_trace(
    event: &ToolEvent,
    ctx: &mut HookContext,
    ledger: &TraceLedger,
    toolchain: &dyn ToolchainRunner,
) -> Result<(), OrchestrationError> {
    let Some(file_path) = &event.payload.file_path else {
        return Ok(());
    };
    let target = Path::new(file_path)
        .absolutize_from(&ctx.workspace_root)?
        .into_owned();

    for (label, output) in [
        ("formatter", toolchain.format(&target).await),
        ("linter", toolchain.lint(&target).await),
    ] {
        if !output.stdout.trim().is_empty() {
            ctx.feedback.push(format!("{label}: {}", output.stdout.trim()));
        }
        if !output.stderr.trim().is_empty() {
            ctx.feedback.push(format!("{label}: {}", output.stderr.trim()));
        }
    }

    let spec_refs = ctx
        .active_intent
        .as_ref()
        .and_then(|intent| intent.spec_ref.clone())
        .into_iter()
        .collect();

    ledger.append_file_change(FileChange {
        intent_id: Some(event.intent_id.clone()),
        file_path: file_path.clone(),
        timestamp: Some(Utc::now()),
        notes: vec![format!("{} applied by orchestration pipeline", event.tool_name)],
        before: event.payload.before.clone(),
        after: event.payload.after.clone(),
        spec_refs,
        requirement_ids: Vec::new(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::CommandPromptBuilder;
    use crate::vcs::StaticRevisionProvider;

    fn context_at(root: &Path, allowed: &[&str]) -> HookContext {
        let mut ctx = HookContext::new(root, Arc::new(CommandPromptBuilder));
        ctx.allowed_paths = allowed.iter().map(|s| s.to_string()).collect();
        ctx
    }

    fn event_for(path: &str) -> ToolEvent {
        ToolEvent {
            tool_name: "write_file".into(),
            intent_id: "INT-001".into(),
            payload: crate::pipeline::ToolPayload {
                file_path: Some(path.into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn scope_accepts_paths_under_a_stripped_glob() {
        let mut ctx = context_at(Path::new("/ws"), &["src/auth/**"]);
        assert!(scope_validate(&event_for("src/auth/user.ts"), &mut ctx).is_ok());
        assert!(scope_validate(&event_for("src/auth/deep/nested.ts"), &mut ctx).is_ok());
        assert!(ctx.feedback.is_empty());
    }

    #[test]
    fn scope_rejects_paths_outside_every_pattern() {
        let mut ctx = context_at(Path::new("/ws"), &["src/auth/**"]);
        let err = scope_validate(&event_for("src/ui/Button.tsx"), &mut ctx).unwrap_err();
        assert!(matches!(err, OrchestrationError::ScopeViolation(_)));
        assert_eq!(
            ctx.feedback.lines(),
            &["Scope violation: Agent attempted to modify src/ui/Button.tsx".to_string()]
        );
    }

    #[test]
    fn scope_is_component_wise_not_textual() {
        let mut ctx = context_at(Path::new("/ws"), &["src/auth/**"]);
        // `src/authx` shares a textual prefix with `src/auth` but is a
        // different directory.
        assert!(scope_validate(&event_for("src/authx/user.ts"), &mut ctx).is_err());
        // Escaping the workspace through `..` must not pass either.
        assert!(scope_validate(&event_for("src/auth/../../etc/passwd"), &mut ctx).is_err());
    }

    #[test]
    fn scope_passes_events_without_a_target() {
        let mut ctx = context_at(Path::new("/ws"), &["src/auth/**"]);
        let event = ToolEvent {
            tool_name: "run_command".into(),
            intent_id: "INT-001".into(),
            payload: Default::default(),
        };
        assert!(scope_validate(&event, &mut ctx).is_ok());
    }

    #[test]
    fn path_lock_conflicts_are_reported_and_released() {
        let locks = PathLocks::new();
        let revision = StaticRevisionProvider::unknown();
        let mut ctx = context_at(Path::new("/ws"), &["src/**"]);

        let first = concurrency_guard(&event_for("src/a.ts"), &mut ctx, &locks, None, &revision)
            .expect("first lock")
            .expect("guard");
        let err = concurrency_guard(&event_for("src/a.ts"), &mut ctx, &locks, None, &revision)
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ConcurrencyConflict { .. }));

        drop(first);
        assert!(
            concurrency_guard(&event_for("src/a.ts"), &mut ctx, &locks, None, &revision)
                .expect("relock after release")
                .is_some()
        );
    }

    #[test]
    fn revision_drift_is_a_conflict() {
        let locks = PathLocks::new();
        let revision = StaticRevisionProvider::new("b".repeat(40));
        let mut ctx = context_at(Path::new("/ws"), &["src/**"]);

        let err = concurrency_guard(
            &event_for("src/a.ts"),
            &mut ctx,
            &locks,
            Some("a".repeat(40)),
            &revision,
        )
        .unwrap_err();
        match err {
            OrchestrationError::ConcurrencyConflict { expected, actual } => {
                assert_eq!(expected, "a".repeat(40));
                assert_eq!(actual, "b".repeat(40));
            }
            other => panic!("expected ConcurrencyConflict, got {other}"),
        }
        // The failed check released the path lock.
        let target = Path::new("src/a.ts").absolutize_from("/ws").unwrap();
        assert!(!locks.is_locked(&target));
    }
}
