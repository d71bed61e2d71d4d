//! Hook Pipeline Engine: the ordered middleware wrapped around every tool
//! invocation.
//!
//! # Stage order
//!
//! ```text
//!  1. context-load        (intent guard, context-size controls)
//!  2. registered pre-hooks
//!  3. scope validation
//!  4. concurrency guard   (path lock + revision sync check)
//!  5. approval gate       (destructive commands only)
//!  6. executor            (caller-supplied)
//!  7. post-trace          (formatter/linter, trace append)
//!  8. registered post-hooks
//! ```
//!
//! Any stage returning a non-allow outcome short-circuits the pipeline
//! with `{success: false, reason}`; later stages and the executor never
//! run. The intent guard runs first so rejected calls never touch the
//! filesystem or spawn subprocesses. Scope precedes concurrency because a
//! scope violation is a permanent authorization failure while a
//! concurrency conflict is transient and retriable. Approval comes last
//! so the human only sees requests that already passed every automated
//! check, and post-trace runs only after a successful executor because
//! the ledger records changes that actually happened.
//!
//! The engine owns no executor: callers inject a [`ToolExecutor`] per
//! invocation, which breaks the engine/executor dependency cycle.

pub mod hooks;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::OrchestrationConfig;
use crate::errors::OrchestrationError;
use crate::intent::Intent;
use crate::intent::state::IntentStateMachine;
use crate::intent::store::IntentStore;
use crate::trace::TraceLedger;
use crate::vcs::RevisionProvider;

/// Reason emitted when a registered pre-hook denies execution.
pub const REASON_PRE_HOOK_BLOCKED: &str = "Pre-hook blocked execution";
/// Reason emitted when the pipeline is cancelled before the executor.
pub const REASON_CANCELLED: &str = "cancelled";
/// `commandType` value that routes an event through the approval gate.
pub const DESTRUCTIVE_COMMAND_TYPE: &str = "destructive";

/// One tool invocation presented to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvent {
    pub tool_name: String,
    pub intent_id: String,
    #[serde(default)]
    pub payload: ToolPayload,
}

/// Typed view of the dynamic tool payload. The core reads only the fields
/// below; everything else rides along opaquely in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ToolPayload {
    /// Whether this payload must pass the human approval gate.
    pub fn is_destructive(&self) -> bool {
        self.command_type.as_deref() == Some(DESTRUCTIVE_COMMAND_TYPE)
    }
}

/// Result returned by a [`ToolExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Outcome of one pipeline run. `reason` is a single human-readable line;
/// multi-line context goes to the feedback sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl PipelineOutcome {
    pub fn allowed() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Append-only diagnostic sink surfaced by the host UI.
#[derive(Debug, Default)]
pub struct Feedback {
    lines: Vec<String>,
}

impl Feedback {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Hand the accumulated diagnostics to the host, emptying the sink.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

/// Renders the command string shown to the human approver.
pub trait PromptBuilder: Send + Sync {
    fn render_command(&self, event: &ToolEvent) -> String;
}

/// Default rendering: the raw command, or the tool name when the payload
/// carries none.
#[derive(Debug, Default)]
pub struct CommandPromptBuilder;

impl PromptBuilder for CommandPromptBuilder {
    fn render_command(&self, event: &ToolEvent) -> String {
        match &event.payload.command {
            Some(command) => format!("Agent requests `{}` via {}", command, event.tool_name),
            None => format!("Agent requests {}", event.tool_name),
        }
    }
}

/// Per-invocation state carried through the pipeline.
///
/// Created fresh by the caller for every tool call, mutated by hooks, and
/// discarded on return; never shared across invocations.
pub struct HookContext {
    pub workspace_root: PathBuf,
    /// Populated by context-load.
    pub active_intent: Option<Intent>,
    /// Derived from the intent's `owned_scope`; populated by context-load.
    pub allowed_paths: Vec<String>,
    pub feedback: Feedback,
    pub prompt_builder: Arc<dyn PromptBuilder>,
}

impl HookContext {
    pub fn new(workspace_root: impl Into<PathBuf>, prompt_builder: Arc<dyn PromptBuilder>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            active_intent: None,
            allowed_paths: Vec::new(),
            feedback: Feedback::default(),
            prompt_builder,
        }
    }
}

/// Human approval seam. The gate treats a timeout as rejection.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, message: &str) -> bool;
}

/// Captured output of an external formatter or linter run.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOutput {
    pub stdout: String,
    pub stderr: String,
}

/// External formatter/linter seam; both calls are best-effort and their
/// output is demoted to feedback.
#[async_trait]
pub trait ToolchainRunner: Send + Sync {
    async fn format(&self, path: &Path) -> ToolchainOutput;
    async fn lint(&self, path: &Path) -> ToolchainOutput;
}

/// Caller-supplied executor for the tool itself.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn run(&self, event: &ToolEvent) -> Result<ToolResult, OrchestrationError>;
}

/// Registered pre-hook: may deny by returning `false`.
#[async_trait]
pub trait PreHook: Send + Sync {
    async fn run(&self, event: &ToolEvent, ctx: &mut HookContext) -> bool;
}

/// Registered post-hook: observes only; errors are demoted to feedback.
#[async_trait]
pub trait PostHook: Send + Sync {
    async fn run(&self, event: &ToolEvent, ctx: &mut HookContext)
    -> Result<(), OrchestrationError>;
}

/// Process-local advisory locks keyed by absolute target path.
#[derive(Clone, Default)]
pub struct PathLocks {
    inner: Arc<DashMap<PathBuf, ()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the advisory lock for `path`, or `None` when another
    /// in-flight invocation holds it.
    pub fn try_lock(&self, path: &Path) -> Option<PathLockGuard> {
        match self.inner.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(PathLockGuard {
                    locks: self.inner.clone(),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    /// Whether `path` is currently locked.
    pub fn is_locked(&self, path: &Path) -> bool {
        self.inner.contains_key(path)
    }
}

/// Releases the advisory lock at pipeline exit, success or failure.
#[derive(Debug)]
pub struct PathLockGuard {
    locks: Arc<DashMap<PathBuf, ()>>,
    path: PathBuf,
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        self.locks.remove(&self.path);
    }
}

/// The pipeline driver.
pub struct HookEngine {
    config: OrchestrationConfig,
    store: Arc<IntentStore>,
    machine: IntentStateMachine,
    ledger: Arc<TraceLedger>,
    revision: Arc<dyn RevisionProvider>,
    approver: Arc<dyn Approver>,
    toolchain: Arc<dyn ToolchainRunner>,
    locks: PathLocks,
    last_sync: RwLock<Option<String>>,
    pre_hooks: Vec<Arc<dyn PreHook>>,
    post_hooks: Vec<Arc<dyn PostHook>>,
}

impl HookEngine {
    pub fn new(
        config: OrchestrationConfig,
        store: Arc<IntentStore>,
        ledger: Arc<TraceLedger>,
        revision: Arc<dyn RevisionProvider>,
        approver: Arc<dyn Approver>,
        toolchain: Arc<dyn ToolchainRunner>,
    ) -> Self {
        Self {
            config,
            machine: IntentStateMachine::new(store.clone()),
            store,
            ledger,
            revision,
            approver,
            toolchain,
            locks: PathLocks::new(),
            last_sync: RwLock::new(None),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    /// Append a pre-hook; registration order is execution order.
    pub fn register_pre(&mut self, hook: Arc<dyn PreHook>) {
        self.pre_hooks.push(hook);
    }

    /// Append a post-hook; registration order is execution order.
    pub fn register_post(&mut self, hook: Arc<dyn PostHook>) {
        self.post_hooks.push(hook);
    }

    /// Record the current workspace revision as the session baseline for
    /// the concurrency guard's sync check.
    pub fn record_sync(&self) {
        let current = self.revision.current_revision();
        *self.last_sync.write().expect("last_sync poisoned") = Some(current);
    }

    fn last_sync(&self) -> Option<String> {
        self.last_sync.read().expect("last_sync poisoned").clone()
    }

    /// Run one tool invocation through the full pipeline.
    pub async fn execute(
        &self,
        event: &ToolEvent,
        ctx: &mut HookContext,
        executor: &dyn ToolExecutor,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        if cancel.is_cancelled() {
            return PipelineOutcome::rejected(REASON_CANCELLED);
        }

        // 1. Context-load: intent guard + context-size controls.
        if let Err(e) = hooks::context_load(
            event,
            ctx,
            &self.store,
            &self.machine,
            &self.config.limits,
        ) {
            return PipelineOutcome::rejected(e.to_string());
        }

        // 2. Registered pre-hooks, in registration order.
        for hook in &self.pre_hooks {
            if cancel.is_cancelled() {
                return PipelineOutcome::rejected(REASON_CANCELLED);
            }
            if !hook.run(event, ctx).await {
                return PipelineOutcome::rejected(REASON_PRE_HOOK_BLOCKED);
            }
        }

        // 3. Scope validation.
        if let Err(e) = hooks::scope_validate(event, ctx) {
            return PipelineOutcome::rejected(e.to_string());
        }

        // 4. Concurrency guard. The advisory lock is held until pipeline
        // exit; the guard drops on every return path below.
        let _path_lock = match hooks::concurrency_guard(
            event,
            ctx,
            &self.locks,
            self.last_sync(),
            self.revision.as_ref(),
        ) {
            Ok(guard) => guard,
            Err(e) => return PipelineOutcome::rejected(e.to_string()),
        };

        // 5. Approval gate, destructive commands only.
        if cancel.is_cancelled() {
            return PipelineOutcome::rejected(REASON_CANCELLED);
        }
        let approval_timeout = Duration::from_secs(self.config.approval_timeout_secs);
        if let Err(e) =
            hooks::approval_gate(event, ctx, self.approver.as_ref(), approval_timeout).await
        {
            return PipelineOutcome::rejected(e.to_string());
        }

        // 6. Executor. Failures are still recorded via append_raw so
        // audits observe the attempted call, but post stages are skipped.
        if cancel.is_cancelled() {
            return PipelineOutcome::rejected(REASON_CANCELLED);
        }
        let result = match executor.run(event).await {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                self.record_executor_failure(event, &reason);
                return PipelineOutcome::rejected(reason);
            }
        };
        if !result.success {
            let reason = result
                .message
                .unwrap_or_else(|| "Executor failure".to_string());
            self.record_executor_failure(event, &reason);
            return PipelineOutcome::rejected(reason);
        }

        // 7. Post-trace. Runs even when cancellation raced the executor:
        // the effect happened and must be recorded.
        if let Err(e) = hooks::post_trace(event, ctx, &self.ledger, self.toolchain.as_ref()).await {
            ctx.feedback.push(format!("Post-trace: {e}"));
        }

        // 8. Registered post-hooks; errors become feedback, never failures.
        for hook in &self.post_hooks {
            if let Err(e) = hook.run(event, ctx).await {
                ctx.feedback.push(format!("Post-hook error: {e}"));
            }
        }

        PipelineOutcome::allowed()
    }

    fn record_executor_failure(&self, event: &ToolEvent, reason: &str) {
        let diagnostic = json!({
            "event": "executor_failure",
            "toolName": event.tool_name,
            "intentId": event.intent_id,
            "reason": reason,
            "files": [],
        });
        if let Err(e) = self.ledger.append_raw(diagnostic) {
            tracing::warn!("failed to record executor failure: {e}");
        }
    }
}
