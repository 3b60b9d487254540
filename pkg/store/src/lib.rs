use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
};

use resolver::{Disposition, IntegrityFault, resolve_disposition};
use schema::{Contact, ContactDraft, ValidationError, validate_draft};
use thiserror::Error;
use tracing::{debug, warn};

mod ids;
mod wal;

pub use ids::{IdSource, MAX_ID_ATTEMPTS, RandomIds, ScriptedIds, parse_identifier};
pub use wal::{
    CheckpointPolicy, FileWal, WalCheckpointStats, WalRecord, WalReplayStats,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("malformed identifier '{0}'")]
    MalformedIdentifier(String),
    #[error("no contact with id '{0}'")]
    NotFound(String),
    #[error("name is already held by contact '{id}'")]
    NameTaken { id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Integrity(#[from] IntegrityFault),
    #[error("no free identifier after {attempts} attempts")]
    IdExhausted { attempts: usize },
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deleted {
    pub existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreLoadStats {
    pub contacts_loaded: usize,
    pub retired_ids: usize,
    pub replay: WalReplayStats,
}

/// Owns every contact. Records live in an arena keyed by insertion slot so
/// `list` is stable; `slots` maps identifiers to their slot.
///
/// All mutations take `&mut self`, so a caller holding the store behind a
/// lock gets atomic check-then-insert for free.
pub struct ContactStore {
    records: BTreeMap<u64, Contact>,
    slots: HashMap<String, u64>,
    retired: HashSet<String>,
    next_slot: u64,
    ids: Box<dyn IdSource>,
    wal: Option<FileWal>,
    checkpoint_policy: CheckpointPolicy,
}

impl Default for ContactStore {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            slots: HashMap::new(),
            retired: HashSet::new(),
            next_slot: 0,
            ids: Box::new(RandomIds),
            wal: None,
            checkpoint_policy: CheckpointPolicy::default(),
        }
    }
}

impl ContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Rebuilds the store from `wal` (snapshot first, then the log tail) and
    /// keeps the log attached so later mutations are persisted.
    pub fn open(
        wal: FileWal,
        checkpoint_policy: CheckpointPolicy,
    ) -> Result<(Self, StoreLoadStats), StoreError> {
        let (records, replay) = wal.replay()?;
        let mut store = Self::new();
        for record in records {
            store.apply_replayed(record)?;
        }
        let stats = StoreLoadStats {
            contacts_loaded: store.len(),
            retired_ids: store.retired.len(),
            replay,
        };
        store.wal = Some(wal);
        store.checkpoint_policy = checkpoint_policy;
        Ok((store, stats))
    }

    pub fn open_path(
        path: impl AsRef<Path>,
        checkpoint_policy: CheckpointPolicy,
    ) -> Result<(Self, StoreLoadStats), StoreError> {
        Self::open(FileWal::open(path)?, checkpoint_policy)
    }

    pub fn wal(&self) -> Option<&FileWal> {
        self.wal.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn insert(&mut self, draft: ContactDraft) -> Result<Contact, StoreError> {
        validate_draft(&draft)?;
        let disposition = resolve_disposition(&draft.name, self.records.values())?;
        if let Disposition::Conflict { id } = disposition {
            return Err(StoreError::NameTaken { id });
        }
        let id = self.assign_id()?;
        let contact = draft.into_contact(id);
        self.log(WalRecord::Insert {
            contact: contact.clone(),
        })?;
        self.apply_insert(contact.clone());
        self.checkpoint_if_due();
        Ok(contact)
    }

    pub fn list(&self) -> Vec<Contact> {
        self.records.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Result<Contact, StoreError> {
        let id = parse_identifier(id)?;
        self.contact(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    pub fn replace_number(&mut self, id: &str, number: &str) -> Result<Contact, StoreError> {
        let id = parse_identifier(id)?;
        let number = number.trim();
        if number.is_empty() {
            return Err(ValidationError::MissingNumber.into());
        }
        if self.contact(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.log(WalRecord::ReplaceNumber {
            id: id.clone(),
            number: number.to_string(),
        })?;
        let updated = self.apply_replace_number(&id, number)?;
        self.checkpoint_if_due();
        Ok(updated)
    }

    /// Removing an absent record is not an error; `existed` tells the
    /// caller which case applied.
    pub fn delete(&mut self, id: &str) -> Result<Deleted, StoreError> {
        let id = parse_identifier(id)?;
        if self.contact(&id).is_none() {
            return Ok(Deleted { existed: false });
        }
        self.log(WalRecord::Delete { id: id.clone() })?;
        self.apply_delete(&id);
        self.checkpoint_if_due();
        Ok(Deleted { existed: true })
    }

    /// Writes a snapshot of the live state and truncates the log. Returns
    /// `None` for a purely in-memory store.
    pub fn checkpoint(&mut self) -> Result<Option<WalCheckpointStats>, StoreError> {
        let records = self.snapshot_records();
        match self.wal.as_mut() {
            Some(wal) => wal.compact_with_snapshot(&records).map(Some),
            None => Ok(None),
        }
    }

    fn contact(&self, id: &str) -> Option<&Contact> {
        self.slots.get(id).and_then(|slot| self.records.get(slot))
    }

    fn assign_id(&mut self) -> Result<String, StoreError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = self.ids.candidate();
            let Ok(candidate) = parse_identifier(&candidate) else {
                debug!(candidate = %candidate, "discarding malformed identifier candidate");
                continue;
            };
            if !self.slots.contains_key(&candidate) && !self.retired.contains(&candidate) {
                return Ok(candidate);
            }
            debug!(candidate = %candidate, "identifier collision, drawing again");
        }
        Err(StoreError::IdExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    fn log(&mut self, record: WalRecord) -> Result<(), StoreError> {
        match self.wal.as_mut() {
            Some(wal) => wal.append(&record),
            None => Ok(()),
        }
    }

    fn checkpoint_if_due(&mut self) {
        let Some(wal_records) = self.wal.as_ref().map(FileWal::wal_record_count) else {
            return;
        };
        if !self.checkpoint_policy.is_due(wal_records) {
            return;
        }
        match self.checkpoint() {
            Ok(Some(stats)) => debug!(
                snapshot_records = stats.snapshot_records,
                truncated_wal_records = stats.truncated_wal_records,
                "checkpoint written"
            ),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "checkpoint failed, log left intact"),
        }
    }

    fn snapshot_records(&self) -> Vec<WalRecord> {
        let mut retired: Vec<&String> = self.retired.iter().collect();
        retired.sort();
        self.records
            .values()
            .map(|contact| WalRecord::Insert {
                contact: contact.clone(),
            })
            .chain(
                retired
                    .into_iter()
                    .map(|id| WalRecord::Delete { id: id.clone() }),
            )
            .collect()
    }

    fn apply_insert(&mut self, contact: Contact) {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(contact.id.clone(), slot);
        self.records.insert(slot, contact);
    }

    fn apply_replace_number(&mut self, id: &str, number: &str) -> Result<Contact, StoreError> {
        let contact = self
            .slots
            .get(id)
            .and_then(|slot| self.records.get_mut(slot))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        contact.number = number.to_string();
        Ok(contact.clone())
    }

    fn apply_delete(&mut self, id: &str) {
        if let Some(slot) = self.slots.remove(id) {
            self.records.remove(&slot);
        }
        self.retired.insert(id.to_string());
    }

    fn apply_replayed(&mut self, record: WalRecord) -> Result<(), StoreError> {
        match record {
            WalRecord::Insert { contact } => {
                if self.slots.contains_key(&contact.id) || self.retired.contains(&contact.id) {
                    return Err(StoreError::Parse(format!(
                        "log reuses identifier '{}'",
                        contact.id
                    )));
                }
                validate_draft(&ContactDraft {
                    name: contact.name.clone(),
                    number: contact.number.clone(),
                })?;
                if let Disposition::Conflict { id } =
                    resolve_disposition(&contact.name, self.records.values())?
                {
                    return Err(IntegrityFault::DuplicateNames {
                        name: contact.name,
                        ids: vec![id, contact.id],
                    }
                    .into());
                }
                self.apply_insert(contact);
            }
            WalRecord::ReplaceNumber { id, number } => {
                self.apply_replace_number(&id, &number).map_err(|_| {
                    StoreError::Parse(format!("log updates unknown identifier '{id}'"))
                })?;
            }
            WalRecord::Delete { id } => self.apply_delete(&id),
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicU64, Ordering},
        time::{SystemTime, UNIX_EPOCH},
    };

    use crate::FileWal;

    pub(crate) fn temp_wal_path() -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be valid")
            .as_nanos();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        path.push(format!(
            "directory-wal-{}-{nanos}-{seq}.log",
            std::process::id()
        ));
        path
    }

    pub(crate) fn cleanup_persistence_files(wal: &FileWal) {
        let _ = std::fs::remove_file(wal.path());
        let _ = std::fs::remove_file(wal.snapshot_path());
    }
}
