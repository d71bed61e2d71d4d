//! Intent model: the named, stateful work items that anchor every tool
//! invocation, and the persisted ledger document that owns them.
//!
//! # Lifecycle
//!
//! ```text
//!  PENDING ──▶ IN_PROGRESS ──▶ COMPLETED   (terminal)
//!                  │
//!                  └─────────▶ LOCKED ──▶ IN_PROGRESS  (admin override)
//! ```
//!
//! An intent owns a filesystem scope (`owned_scope` glob patterns), a set
//! of free-form constraints, and ordered acceptance criteria. The ledger
//! file (`active_intents.yaml`) is the single source of truth; it is
//! mutated only by the [`store::IntentStore`] under exclusive access.
//!
//! # Input normalization
//!
//! Two ledger schemas circulated historically: `description` vs `name`,
//! and `constraints` as a mapping vs as a sequence. Loading accepts both
//! and normalizes to *mapping + description*; unrecognized or missing
//! `status` values normalize to `PENDING`. Each normalization emits a
//! `tracing::warn!` diagnostic. Serialization always emits the canonical
//! shape.

pub mod map;
pub mod state;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ContextLimits;

/// Lifecycle status of an [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    /// Declared but not yet worked on. The default for absent or
    /// unrecognized status values.
    #[default]
    Pending,
    /// At least one tool invocation has been admitted under this intent.
    InProgress,
    /// Terminal. Accepts no further work without manual reopening.
    Completed,
    /// Frozen pending administrative action.
    Locked,
}

impl IntentStatus {
    /// Returns the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "PENDING",
            IntentStatus::InProgress => "IN_PROGRESS",
            IntentStatus::Completed => "COMPLETED",
            IntentStatus::Locked => "LOCKED",
        }
    }

    /// Whether work may be admitted under this status.
    pub fn is_workable(&self) -> bool {
        matches!(self, IntentStatus::Pending | IntentStatus::InProgress)
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(IntentStatus::Pending),
            "IN_PROGRESS" => Ok(IntentStatus::InProgress),
            "COMPLETED" => Ok(IntentStatus::Completed),
            "LOCKED" => Ok(IntentStatus::Locked),
            _ => Err(format!("Invalid intent status: {}", value)),
        }
    }
}

/// A named, stateful work item with an owned filesystem scope.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Intent {
    /// Stable identifier in the canonical `INT-###` form.
    pub id: String,
    /// Human description of the work item.
    pub description: String,
    /// Lifecycle status; see module docs for the transition diagram.
    pub status: IntentStatus,
    /// Path-glob patterns this intent owns; `**` suffix supported.
    /// Never empty for an intent in a non-terminal state.
    pub owned_scope: Vec<String>,
    /// Free-form constraint mapping (constraint name to value).
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_yaml::Value>,
    /// Ordered human-readable predicates for completion.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Optional path to an external specification document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<String>,
}

/// Accepts both the canonical and the deprecated ledger shapes.
#[derive(Deserialize)]
struct RawIntent {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    owned_scope: Vec<String>,
    #[serde(default)]
    constraints: Option<RawConstraints>,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    spec_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConstraints {
    Mapping(BTreeMap<String, serde_yaml::Value>),
    Sequence(Vec<String>),
}

impl From<RawIntent> for Intent {
    fn from(raw: RawIntent) -> Self {
        let status = match raw.status.as_deref() {
            None => {
                tracing::warn!(id = %raw.id, "intent has no status; defaulting to PENDING");
                IntentStatus::Pending
            }
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(id = %raw.id, status = value, "unrecognized intent status; defaulting to PENDING");
                IntentStatus::Pending
            }),
        };

        let description = match (raw.description, raw.name) {
            (Some(description), _) => description,
            (None, Some(name)) => {
                tracing::warn!(id = %raw.id, "intent uses deprecated `name` field; treating as description");
                name
            }
            (None, None) => String::new(),
        };

        let constraints = match raw.constraints {
            Some(RawConstraints::Mapping(mapping)) => mapping,
            Some(RawConstraints::Sequence(entries)) => {
                tracing::warn!(id = %raw.id, "intent uses deprecated sequence-shaped constraints; folding into a mapping");
                entries
                    .into_iter()
                    .map(|entry| (entry, serde_yaml::Value::Null))
                    .collect()
            }
            None => BTreeMap::new(),
        };

        if raw.owned_scope.is_empty() && status.is_workable() {
            tracing::warn!(id = %raw.id, "workable intent owns no scope; every tool action under it will be rejected");
        }

        Intent {
            id: raw.id,
            description,
            status,
            owned_scope: raw.owned_scope,
            constraints,
            acceptance_criteria: raw.acceptance_criteria,
            spec_ref: raw.spec_ref,
        }
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawIntent::deserialize(deserializer).map(Intent::from)
    }
}

impl Intent {
    /// Whether work may be admitted under this intent.
    pub fn is_workable(&self) -> bool {
        self.status.is_workable()
    }

    /// Apply the context-size controls, truncating oversized fields in
    /// place. Returns one warning line per truncated field. Idempotent:
    /// applying the same limits twice changes nothing further.
    pub fn apply_context_limits(&mut self, limits: &ContextLimits) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.owned_scope.len() > limits.max_scope_entries {
            warnings.push(format!(
                "Intent {}: owned_scope truncated from {} to {} entries",
                self.id,
                self.owned_scope.len(),
                limits.max_scope_entries
            ));
            self.owned_scope.truncate(limits.max_scope_entries);
        }

        if self.constraints.len() > limits.max_constraints {
            warnings.push(format!(
                "Intent {}: constraints truncated from {} to {} entries",
                self.id,
                self.constraints.len(),
                limits.max_constraints
            ));
            let kept: Vec<String> = self
                .constraints
                .keys()
                .take(limits.max_constraints)
                .cloned()
                .collect();
            self.constraints.retain(|key, _| kept.contains(key));
        }

        if self.acceptance_criteria.len() > limits.max_acceptance_criteria {
            warnings.push(format!(
                "Intent {}: acceptance_criteria truncated from {} to {} entries",
                self.id,
                self.acceptance_criteria.len(),
                limits.max_acceptance_criteria
            ));
            self.acceptance_criteria
                .truncate(limits.max_acceptance_criteria);
        }

        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        warnings
    }
}

/// The persisted intent ledger document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentLedger {
    /// Identifier of the currently selected intent; may be empty.
    #[serde(default)]
    pub active_intent: String,
    /// All declared intents. Identifiers are unique within the ledger.
    #[serde(default)]
    pub intents: Vec<Intent>,
}

impl IntentLedger {
    /// Find an intent by identifier.
    pub fn find(&self, id: &str) -> Option<&Intent> {
        self.intents.iter().find(|intent| intent.id == id)
    }

    /// Mutable lookup by identifier.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Intent> {
        self.intents.iter_mut().find(|intent| intent.id == id)
    }

    /// Identifiers of all intents whose status admits work.
    pub fn workable_ids(&self) -> Vec<String> {
        self.intents
            .iter()
            .filter(|intent| intent.is_workable())
            .map(|intent| intent.id.clone())
            .collect()
    }
}
