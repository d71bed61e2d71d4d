//! Intent-Gate is an intent-driven orchestration middleware: it mediates
//! every mutating tool action an autonomous coding agent performs against
//! a source workspace, anchoring each action to a declared Intent,
//! confining it to the intent's owned scope, guarding against concurrent
//! conflicts, optionally gating it behind human approval, and recording
//! the classified mutation in an append-only trace ledger.

pub mod classify;
pub mod config;
pub mod errors;
pub mod intent;
pub mod logging;
pub mod pipeline;
pub mod trace;
pub mod vcs;

pub use classify::{MutationClass, classify};
pub use config::{ContextLimits, OrchestrationConfig, OrchestrationPaths};
pub use errors::{OrchestrationError, Recovery};
pub use intent::state::IntentStateMachine;
pub use intent::store::IntentStore;
pub use intent::{Intent, IntentLedger, IntentStatus};
pub use pipeline::{
    Approver, CommandPromptBuilder, Feedback, HookContext, HookEngine, PathLockGuard, PathLocks,
    PipelineOutcome, PostHook, PreHook, PromptBuilder, ToolEvent, ToolExecutor, ToolPayload,
    ToolResult, ToolchainOutput, ToolchainRunner,
};
pub use trace::{FileChange, FileRecord, TraceEntry, TraceLedger, create_file_trace};
pub use vcs::{GitRevisionProvider, RevisionProvider, StaticRevisionProvider, UNKNOWN_REVISION};
