//! Intent Store: exclusive owner of the persisted intent ledger.
//!
//! Every read parses the YAML document fresh under the store's mutex;
//! mutations go through [`IntentStore::update`], which holds the same
//! mutex across the whole read-modify-write so concurrent invocations
//! never interleave a ledger update or observe a half-written document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::OrchestrationError;
use crate::intent::{Intent, IntentLedger};

/// Load/validate/persist facade over `active_intents.yaml`.
pub struct IntentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl IntentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the full ledger document, normalizing intent shapes on load.
    pub fn load_ledger(&self) -> Result<IntentLedger, OrchestrationError> {
        let _guard = self.lock.lock().expect("intent store poisoned");
        self.load_ledger_unlocked()
    }

    fn load_ledger_unlocked(&self) -> Result<IntentLedger, OrchestrationError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrchestrationError::FileMissing(
                    self.path.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        serde_yaml::from_str(&content).map_err(|e| OrchestrationError::MalformedDocument {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// All intents in ledger order.
    pub fn load_all(&self) -> Result<Vec<Intent>, OrchestrationError> {
        Ok(self.load_ledger()?.intents)
    }

    /// One intent by identifier. Missing intents fail with a recovery
    /// payload listing every workable identifier.
    pub fn load_one(&self, id: &str) -> Result<Intent, OrchestrationError> {
        let ledger = self.load_ledger()?;
        ledger
            .find(id)
            .cloned()
            .ok_or_else(|| OrchestrationError::IntentNotFound {
                id: id.to_string(),
                workable: ledger.workable_ids(),
            })
    }

    /// Identifier of the currently selected intent; may be empty.
    pub fn active_intent_id(&self) -> Result<String, OrchestrationError> {
        Ok(self.load_ledger()?.active_intent)
    }

    /// Intents whose status is `PENDING` or `IN_PROGRESS`.
    pub fn workable(&self) -> Result<Vec<Intent>, OrchestrationError> {
        Ok(self
            .load_ledger()?
            .intents
            .into_iter()
            .filter(Intent::is_workable)
            .collect())
    }

    /// Serialize and write the ledger document.
    pub fn persist(&self, ledger: &IntentLedger) -> Result<(), OrchestrationError> {
        let _guard = self.lock.lock().expect("intent store poisoned");
        self.write_ledger(ledger)
    }

    /// Read-modify-write under the store's exclusive lock.
    pub fn update<R>(
        &self,
        mutate: impl FnOnce(&mut IntentLedger) -> Result<R, OrchestrationError>,
    ) -> Result<R, OrchestrationError> {
        let _guard = self.lock.lock().expect("intent store poisoned");
        let mut ledger = self.load_ledger_unlocked()?;
        let result = mutate(&mut ledger)?;
        self.write_ledger(&ledger)?;
        Ok(result)
    }

    fn write_ledger(&self, ledger: &IntentLedger) -> Result<(), OrchestrationError> {
        let document = serde_yaml::to_string(ledger).map_err(|e| {
            OrchestrationError::MalformedDocument {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            }
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, document)?;
        Ok(())
    }
}
