//! Trace Ledger: append-only JSONL audit log of semantically classified
//! mutations, anchored to a version-control revision identifier.
//!
//! Every append serializes one self-contained JSON object, terminated by a
//! newline, and flushes before returning. Entries are never rewritten or
//! deleted. Concurrent appenders serialize on the ledger's internal mutex
//! so no two writes interleave a single line; cross-process serialization
//! is out of scope.
//!
//! The ledger owns `<workspace>/.orchestration/agent_trace.jsonl`
//! exclusively. Records that omit a revision id or timestamp are stamped
//! from the [`RevisionProvider`] and the current instant.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use similar::{Algorithm, ChangeTag, TextDiff};
use uuid::Uuid;

use crate::classify::{MutationClass, classify};
use crate::errors::OrchestrationError;
use crate::vcs::RevisionProvider;

/// Version-control anchor carried by every trace entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VcsInfo {
    /// 40-character revision identifier, or the `"unknown"` sentinel.
    pub revision_id: String,
}

/// Kind of a [`RelatedRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    Specification,
    Requirement,
    Note,
    SpecRef,
}

/// Typed reference attached to a file record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedRef {
    #[serde(rename = "type")]
    pub kind: RelatedKind,
    pub value: String,
}

impl RelatedRef {
    pub fn note(value: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::Note,
            value: value.into(),
        }
    }

    pub fn requirement(value: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::Requirement,
            value: value.into(),
        }
    }

    pub fn spec_ref(value: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::SpecRef,
            value: value.into(),
        }
    }

    pub fn specification(value: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::Specification,
            value: value.into(),
        }
    }
}

/// Contiguous span of the *after* content covered by a file record.
///
/// `start_line` is 1-based and `end_line >= start_line`; `content_hash`
/// is the hex SHA-256 of the covered slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineRange {
    pub start_line: usize,
    pub end_line: usize,
    pub content_hash: String,
}

/// One file's worth of classified mutation inside a trace entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub relative_path: String,
    pub mutation_classes: BTreeSet<MutationClass>,
    pub ranges: Vec<LineRange>,
    pub related: Vec<RelatedRef>,
}

/// One line of the trace ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub vcs: VcsInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    pub files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
}

/// Input to [`TraceLedger::append_file_change`].
#[derive(Debug, Clone, Default)]
pub struct FileChange {
    pub intent_id: Option<String>,
    pub file_path: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub notes: Vec<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub spec_refs: Vec<String>,
    pub requirement_ids: Vec<String>,
}

/// Hex SHA-256 of the 1-based inclusive line span of `content`.
fn hash_line_span(content: &str, start_line: usize, end_line: usize) -> String {
    let slice: Vec<&str> = content
        .lines()
        .skip(start_line.saturating_sub(1))
        .take(end_line.saturating_sub(start_line) + 1)
        .collect();
    hex::encode(Sha256::digest(slice.join("\n").as_bytes()))
}

/// Contiguous runs of inserted lines in `after`, as 1-based inclusive
/// spans with their content hashes. Myers diff, same engine the rest of
/// the crate uses for line work.
fn changed_ranges(before: &str, after: &str) -> Vec<LineRange> {
    let old_lines: Vec<&str> = before.lines().collect();
    let new_lines: Vec<&str> = after.lines().collect();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old_lines, &new_lines);

    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut new_line_no = 0usize;

    let close_run = |run_start: &mut Option<usize>, end: usize, ranges: &mut Vec<LineRange>| {
        if let Some(start) = run_start.take() {
            ranges.push(LineRange {
                start_line: start,
                end_line: end,
                content_hash: hash_line_span(after, start, end),
            });
        }
    };

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => {
                new_line_no += 1;
                if run_start.is_none() {
                    run_start = Some(new_line_no);
                }
            }
            ChangeTag::Equal => {
                close_run(&mut run_start, new_line_no, &mut ranges);
                new_line_no += 1;
            }
            // Deletes do not advance the new side and cannot break a run.
            ChangeTag::Delete => {}
        }
    }
    close_run(&mut run_start, new_line_no, &mut ranges);

    ranges
}

/// Pure constructor for a [`FileRecord`] covering one span of the *after*
/// content. Runs the classifier and hashes the selected range.
pub fn create_file_trace(
    relative_path: impl Into<String>,
    before: &str,
    after: &str,
    start_line: usize,
    end_line: usize,
    related: Vec<RelatedRef>,
) -> FileRecord {
    debug_assert!(start_line >= 1 && end_line >= start_line);
    FileRecord {
        relative_path: relative_path.into(),
        mutation_classes: classify(before, after),
        ranges: vec![LineRange {
            start_line,
            end_line,
            content_hash: hash_line_span(after, start_line, end_line),
        }],
        related,
    }
}

/// Append-only writer for the trace ledger file.
pub struct TraceLedger {
    path: PathBuf,
    revision: Arc<dyn RevisionProvider>,
    writer: Mutex<()>,
}

impl TraceLedger {
    pub fn new(path: impl Into<PathBuf>, revision: Arc<dyn RevisionProvider>) -> Self {
        Self {
            path: path.into(),
            revision,
            writer: Mutex::new(()),
        }
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize any structured record to a single JSON line and append.
    ///
    /// Missing `timestamp` and `vcs.revision_id` keys are stamped before
    /// the write.
    pub fn append_raw(&self, mut record: Value) -> Result<(), OrchestrationError> {
        if let Some(object) = record.as_object_mut() {
            if !object.contains_key("timestamp") {
                object.insert("timestamp".into(), json!(Utc::now()));
            }
            let vcs = object.entry("vcs").or_insert_with(|| json!({}));
            if let Some(vcs) = vcs.as_object_mut() {
                if !vcs.contains_key("revision_id") {
                    vcs.insert("revision_id".into(), json!(self.revision.current_revision()));
                }
            }
        }
        let line = serde_json::to_string(&record).map_err(|e| {
            OrchestrationError::PostProcessingFailure(format!("trace serialization: {e}"))
        })?;
        self.write_line(&line)
    }

    /// Append a fully stamped trace entry and return it.
    pub fn append_trace(
        &self,
        files: Vec<FileRecord>,
        intent_id: Option<String>,
        prompt_text: Option<String>,
    ) -> Result<TraceEntry, OrchestrationError> {
        let entry = TraceEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            vcs: VcsInfo {
                revision_id: self.revision.current_revision(),
            },
            intent_id,
            files,
            prompt_text,
        };
        let line = serde_json::to_string(&entry).map_err(|e| {
            OrchestrationError::PostProcessingFailure(format!("trace serialization: {e}"))
        })?;
        self.write_line(&line)?;
        Ok(entry)
    }

    /// Record a prompt/session seed with an empty file list.
    pub fn append_prompt(
        &self,
        id: &str,
        intent_id: &str,
        context: &str,
        prompt_text: &str,
    ) -> Result<(), OrchestrationError> {
        self.append_raw(json!({
            "id": id,
            "intentId": intent_id,
            "context": context,
            "promptText": prompt_text,
            "files": [],
        }))
    }

    /// Append a classified file-change entry.
    ///
    /// When both `before` and `after` are supplied the classifier fills
    /// `mutationClasses` and the changed line spans are hashed into
    /// `ranges`. Notes, spec refs and requirement ids fold into `related`.
    pub fn append_file_change(
        &self,
        change: FileChange,
    ) -> Result<TraceEntry, OrchestrationError> {
        let mut related: Vec<RelatedRef> = Vec::new();
        related.extend(change.notes.iter().cloned().map(RelatedRef::note));
        related.extend(change.spec_refs.iter().cloned().map(RelatedRef::spec_ref));
        related.extend(
            change
                .requirement_ids
                .iter()
                .cloned()
                .map(RelatedRef::requirement),
        );

        let (mutation_classes, ranges) = match (&change.before, &change.after) {
            (Some(before), Some(after)) => (classify(before, after), changed_ranges(before, after)),
            (None, Some(after)) => {
                let line_count = after.lines().count();
                let ranges = if line_count == 0 {
                    Vec::new()
                } else {
                    vec![LineRange {
                        start_line: 1,
                        end_line: line_count,
                        content_hash: hash_line_span(after, 1, line_count),
                    }]
                };
                (BTreeSet::new(), ranges)
            }
            _ => (BTreeSet::new(), Vec::new()),
        };

        let entry = TraceEntry {
            id: Uuid::new_v4(),
            timestamp: change.timestamp.unwrap_or_else(Utc::now),
            vcs: VcsInfo {
                revision_id: self.revision.current_revision(),
            },
            intent_id: change.intent_id,
            files: vec![FileRecord {
                relative_path: change.file_path,
                mutation_classes,
                ranges,
                related,
            }],
            prompt_text: None,
        };
        let line = serde_json::to_string(&entry).map_err(|e| {
            OrchestrationError::PostProcessingFailure(format!("trace serialization: {e}"))
        })?;
        self.write_line(&line)?;
        Ok(entry)
    }

    /// Append one line under the writer mutex, creating the parent
    /// directory on first use, and flush before returning.
    fn write_line(&self, line: &str) -> Result<(), OrchestrationError> {
        let _guard = self.writer.lock().expect("trace writer poisoned");
        let mut file = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                OpenOptions::new().create(true).append(true).open(&self.path)?
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::{StaticRevisionProvider, UNKNOWN_REVISION};

    fn ledger_in(dir: &Path) -> TraceLedger {
        TraceLedger::new(
            dir.join(".orchestration/agent_trace.jsonl"),
            Arc::new(StaticRevisionProvider::unknown()),
        )
    }

    fn read_lines(ledger: &TraceLedger) -> Vec<Value> {
        let content = std::fs::read_to_string(ledger.path()).expect("ledger file");
        content
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid JSON line"))
            .collect()
    }

    #[test]
    fn appends_are_single_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger_in(dir.path());

        ledger
            .append_trace(Vec::new(), Some("INT-001".into()), None)
            .expect("append");
        ledger
            .append_raw(json!({"event": "executor_failure", "toolName": "run_command"}))
            .expect("append raw");

        let lines = read_lines(&ledger);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["intentId"], "INT-001");
        assert_eq!(lines[0]["vcs"]["revision_id"], UNKNOWN_REVISION);
        assert!(lines[0]["timestamp"].is_string());
        // append_raw stamps the keys the caller omitted
        assert_eq!(lines[1]["vcs"]["revision_id"], UNKNOWN_REVISION);
        assert!(lines[1]["timestamp"].is_string());
    }

    #[test]
    fn append_raw_keeps_caller_supplied_anchors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger_in(dir.path());
        let rev = "c".repeat(40);
        ledger
            .append_raw(json!({
                "timestamp": "2026-01-01T00:00:00Z",
                "vcs": {"revision_id": rev},
            }))
            .expect("append raw");
        let lines = read_lines(&ledger);
        assert_eq!(lines[0]["timestamp"], "2026-01-01T00:00:00Z");
        assert_eq!(lines[0]["vcs"]["revision_id"], rev.as_str());
    }

    #[test]
    fn file_change_classifies_and_hashes_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger_in(dir.path());

        let entry = ledger
            .append_file_change(FileChange {
                intent_id: Some("INT-001".into()),
                file_path: "src/auth/user.ts".into(),
                notes: vec!["write_file via pipeline".into()],
                before: Some("".into()),
                after: Some("export function hash(){}\n".into()),
                spec_refs: vec!["docs/auth.md".into()],
                requirement_ids: vec!["REQ-9".into()],
                ..Default::default()
            })
            .expect("append file change");

        let record = &entry.files[0];
        assert_eq!(record.relative_path, "src/auth/user.ts");
        assert!(record.mutation_classes.contains(&MutationClass::AddFunction));
        assert!(record.mutation_classes.contains(&MutationClass::AddExport));
        assert_eq!(record.ranges.len(), 1);
        assert_eq!(record.ranges[0].start_line, 1);
        assert_eq!(record.ranges[0].end_line, 1);
        assert_eq!(
            record.ranges[0].content_hash,
            hex::encode(Sha256::digest(b"export function hash(){}"))
        );
        let kinds: Vec<RelatedKind> = record.related.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RelatedKind::Note, RelatedKind::SpecRef, RelatedKind::Requirement]
        );
    }

    #[test]
    fn changed_ranges_cover_inserted_runs_only() {
        let before = "a\nb\nc\n";
        let after = "a\nB1\nB2\nc\nd\n";
        let ranges = changed_ranges(before, after);
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start_line, ranges[0].end_line), (2, 3));
        assert_eq!((ranges[1].start_line, ranges[1].end_line), (5, 5));
        assert_eq!(
            ranges[0].content_hash,
            hex::encode(Sha256::digest(b"B1\nB2"))
        );
        assert!(changed_ranges("same\n", "same\n").is_empty());
    }

    #[test]
    fn create_file_trace_hashes_the_selected_span() {
        let after = "line one\nline two\nline three\n";
        let record = create_file_trace(
            "src/x.ts",
            "",
            after,
            2,
            3,
            vec![RelatedRef::note("span")],
        );
        assert_eq!(
            record.ranges[0].content_hash,
            hex::encode(Sha256::digest(b"line two\nline three"))
        );
        assert!(!record.mutation_classes.is_empty());
    }

    #[test]
    fn serialized_entries_use_the_ledger_schema_keys() {
        let entry = TraceEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            vcs: VcsInfo {
                revision_id: UNKNOWN_REVISION.into(),
            },
            intent_id: Some("INT-001".into()),
            files: vec![create_file_trace("a.ts", "", "let a = 1\n", 1, 1, vec![])],
            prompt_text: None,
        };
        let value: Value = serde_json::to_value(&entry).expect("serialize");
        assert!(value.get("intentId").is_some());
        assert!(value.get("promptText").is_none());
        let file = &value["files"][0];
        assert!(file.get("relativePath").is_some());
        assert!(file.get("mutationClasses").is_some());
        assert!(file["ranges"][0].get("startLine").is_some());
        assert!(file["ranges"][0].get("contentHash").is_some());
    }
}
