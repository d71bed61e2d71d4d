use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::OrchestrationError;

/// Directory name holding the orchestration state inside a workspace.
pub const ORCHESTRATION_DIR: &str = ".orchestration";
/// Intent ledger file name, relative to [`ORCHESTRATION_DIR`].
pub const INTENT_LEDGER_FILE: &str = "active_intents.yaml";
/// Trace ledger file name, relative to [`ORCHESTRATION_DIR`].
pub const TRACE_LEDGER_FILE: &str = "agent_trace.jsonl";
/// Human-facing intent map file name, relative to [`ORCHESTRATION_DIR`].
pub const INTENT_MAP_FILE: &str = "intent_map.md";

/// Resolved locations of the orchestration files for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationPaths {
    workspace_root: PathBuf,
}

impl OrchestrationPaths {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Absolute workspace root this layout is anchored to.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// `<workspace>/.orchestration`
    pub fn orchestration_dir(&self) -> PathBuf {
        self.workspace_root.join(ORCHESTRATION_DIR)
    }

    /// `<workspace>/.orchestration/active_intents.yaml`
    pub fn intent_ledger(&self) -> PathBuf {
        self.orchestration_dir().join(INTENT_LEDGER_FILE)
    }

    /// `<workspace>/.orchestration/agent_trace.jsonl`
    pub fn trace_ledger(&self) -> PathBuf {
        self.orchestration_dir().join(TRACE_LEDGER_FILE)
    }

    /// `<workspace>/.orchestration/intent_map.md`
    pub fn intent_map(&self) -> PathBuf {
        self.orchestration_dir().join(INTENT_MAP_FILE)
    }

    /// Create the orchestration directory and seed an empty intent ledger
    /// if none exists, so a fresh workspace is immediately usable.
    pub fn ensure(&self) -> Result<(), OrchestrationError> {
        fs::create_dir_all(self.orchestration_dir())?;
        let ledger = self.intent_ledger();
        if !ledger.exists() {
            fs::write(&ledger, "active_intent: \"\"\nintents: []\n")?;
        }
        Ok(())
    }
}

/// Caps applied to the active intent when it is loaded into a hook
/// context. Oversized fields are truncated with a warning diagnostic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_scope_entries: usize,
    pub max_constraints: usize,
    pub max_acceptance_criteria: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_scope_entries: 10,
            max_constraints: 20,
            max_acceptance_criteria: 15,
        }
    }
}

/// Tunables for the hook pipeline and the persisted ledgers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OrchestrationConfig {
    /// Context-size controls applied during context-load.
    pub limits: ContextLimits,
    /// Seconds the approval gate waits for the human approver before
    /// treating the request as rejected.
    pub approval_timeout_secs: u64,
    /// Maximum column width intended for the persisted intent ledger.
    pub yaml_line_width: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            limits: ContextLimits::default(),
            approval_timeout_secs: 120,
            yaml_line_width: 120,
        }
    }
}
