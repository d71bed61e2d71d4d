//! Human-facing intent map mirror.
//!
//! `intent_map.md` is a generated markdown view of the intent ledger for
//! people browsing the workspace; the core never reads it back.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::errors::OrchestrationError;
use crate::intent::IntentLedger;

/// Render the ledger as a markdown table and write it to `path`,
/// replacing any previous mirror.
pub fn write_intent_map(ledger: &IntentLedger, path: &Path) -> Result<(), OrchestrationError> {
    let mut doc = String::from("# Intent Map\n\n");
    if ledger.active_intent.is_empty() {
        doc.push_str("Active intent: _none_\n\n");
    } else {
        let _ = writeln!(doc, "Active intent: `{}`\n", ledger.active_intent);
    }

    doc.push_str("| Intent | Status | Description | Owned scope |\n");
    doc.push_str("|---|---|---|---|\n");
    for intent in &ledger.intents {
        let _ = writeln!(
            doc,
            "| `{}` | {} | {} | {} |",
            intent.id,
            intent.status,
            intent.description,
            intent
                .owned_scope
                .iter()
                .map(|pattern| format!("`{pattern}`"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, doc)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, IntentStatus};

    #[test]
    fn mirror_lists_every_intent_with_status() {
        let ledger = IntentLedger {
            active_intent: "INT-001".into(),
            intents: vec![Intent {
                id: "INT-001".into(),
                description: "harden auth".into(),
                status: IntentStatus::InProgress,
                owned_scope: vec!["src/auth/**".into()],
                constraints: Default::default(),
                acceptance_criteria: vec![],
                spec_ref: None,
            }],
        };

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".orchestration/intent_map.md");
        write_intent_map(&ledger, &path).expect("write");

        let doc = fs::read_to_string(&path).expect("read");
        assert!(doc.contains("Active intent: `INT-001`"));
        assert!(doc.contains("| `INT-001` | IN_PROGRESS | harden auth | `src/auth/**` |"));
    }
}
