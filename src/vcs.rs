//! Revision Oracle: the version-control seam consumed by the trace ledger
//! and the concurrency guard.
//!
//! The oracle answers two questions — "what revision is the workspace at"
//! and "what is the content identifier of this file at head" — and it
//! answers them even when the workspace is not under version control:
//! every failure is swallowed and translated to the [`UNKNOWN_REVISION`]
//! sentinel so the ledger stays writable everywhere.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Sentinel returned whenever the version-control state is unavailable.
pub const UNKNOWN_REVISION: &str = "unknown";

/// Length of a well-formed revision identifier.
const REVISION_HEX_LEN: usize = 40;

/// Read-only view of version-control state.
///
/// Both operations are idempotent and infallible by contract: providers
/// must map every internal failure to [`UNKNOWN_REVISION`] rather than
/// propagate it.
pub trait RevisionProvider: Send + Sync {
    /// The 40-character identifier of the workspace's current revision,
    /// or [`UNKNOWN_REVISION`].
    fn current_revision(&self) -> String;

    /// Content-addressed identifier for `path` as-of head, or
    /// [`UNKNOWN_REVISION`].
    fn file_digest_at_head(&self, path: &Path) -> String;
}

/// [`RevisionProvider`] backed by the external `git` binary.
#[derive(Debug, Clone)]
pub struct GitRevisionProvider {
    workspace_root: PathBuf,
}

impl GitRevisionProvider {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    fn rev_parse(&self, spec: &str) -> Option<String> {
        let output = Command::new("git")
            .arg("rev-parse")
            .arg(spec)
            .current_dir(&self.workspace_root)
            .output()
            .ok()?;
        if !output.status.success() {
            tracing::debug!(spec, "git rev-parse failed");
            return None;
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.len() == REVISION_HEX_LEN && id.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(id)
        } else {
            tracing::debug!(spec, %id, "git rev-parse returned a non-revision");
            None
        }
    }
}

impl RevisionProvider for GitRevisionProvider {
    fn current_revision(&self) -> String {
        self.rev_parse("HEAD")
            .unwrap_or_else(|| UNKNOWN_REVISION.to_string())
    }

    fn file_digest_at_head(&self, path: &Path) -> String {
        self.rev_parse(&format!("HEAD:{}", path.display()))
            .unwrap_or_else(|| UNKNOWN_REVISION.to_string())
    }
}

/// Fixed-answer provider for tests and workspaces without version control.
#[derive(Debug, Clone)]
pub struct StaticRevisionProvider {
    revision: String,
}

impl StaticRevisionProvider {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }

    /// Provider that always answers [`UNKNOWN_REVISION`].
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_REVISION)
    }
}

impl RevisionProvider for StaticRevisionProvider {
    fn current_revision(&self) -> String {
        self.revision.clone()
    }

    fn file_digest_at_head(&self, _path: &Path) -> String {
        self.revision.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_a_repository_answers_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = GitRevisionProvider::new(dir.path());
        assert_eq!(provider.current_revision(), UNKNOWN_REVISION);
        assert_eq!(
            provider.file_digest_at_head(Path::new("src/lib.rs")),
            UNKNOWN_REVISION
        );
    }

    #[test]
    fn static_provider_echoes_its_revision() {
        let rev = "f".repeat(40);
        let provider = StaticRevisionProvider::new(rev.clone());
        assert_eq!(provider.current_revision(), rev);
        assert_eq!(provider.file_digest_at_head(Path::new("x")), rev);
        assert_eq!(
            StaticRevisionProvider::unknown().current_revision(),
            UNKNOWN_REVISION
        );
    }
}
