pub mod api;
pub mod config;
pub mod error;
pub mod transport;
pub mod transport_axum;

use std::sync::{Mutex, MutexGuard};

use schema::{Contact, ContactPayload, validate_payload};
use store::{ContactStore, Deleted};

pub use error::ServiceError;

/// Progress of a single request. Every request starts `Received` and ends in
/// `Responded` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    Received,
    Validated,
    Resolved,
    Persisted,
    Responded,
    Error,
}

impl RequestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Resolved => "resolved",
            Self::Persisted => "persisted",
            Self::Responded => "responded",
            Self::Error => "error",
        }
    }

    pub fn finish(self, status: u16) -> Self {
        if status < 400 {
            Self::Responded
        } else {
            Self::Error
        }
    }
}

pub fn list_contacts(store: &Mutex<ContactStore>) -> Result<Vec<Contact>, ServiceError> {
    Ok(lock_store(store)?.list())
}

pub fn fetch_contact(store: &Mutex<ContactStore>, id: &str) -> Result<Contact, ServiceError> {
    Ok(lock_store(store)?.get(id)?)
}

/// Validates, then resolves and inserts under one lock acquisition so two
/// creates for the same name cannot both pass the uniqueness check.
pub fn create_contact(
    store: &Mutex<ContactStore>,
    payload: &ContactPayload,
    phase: &mut RequestPhase,
) -> Result<Contact, ServiceError> {
    let draft = validate_payload(payload)?;
    *phase = RequestPhase::Validated;

    let mut guard = lock_store(store)?;
    *phase = RequestPhase::Resolved;
    let created = guard.insert(draft)?;
    *phase = RequestPhase::Persisted;
    Ok(created)
}

/// Replaces the number of an existing contact. The stored name is kept even
/// if the payload spells it differently; names are fixed at creation.
pub fn update_contact(
    store: &Mutex<ContactStore>,
    id: &str,
    payload: &ContactPayload,
    phase: &mut RequestPhase,
) -> Result<Contact, ServiceError> {
    let draft = validate_payload(payload)?;
    *phase = RequestPhase::Validated;

    let mut guard = lock_store(store)?;
    *phase = RequestPhase::Resolved;
    let updated = guard.replace_number(id, &draft.number)?;
    *phase = RequestPhase::Persisted;
    Ok(updated)
}

pub fn remove_contact(
    store: &Mutex<ContactStore>,
    id: &str,
    phase: &mut RequestPhase,
) -> Result<Deleted, ServiceError> {
    let deleted = lock_store(store)?.delete(id)?;
    *phase = RequestPhase::Persisted;
    Ok(deleted)
}

pub fn count_contacts(store: &Mutex<ContactStore>) -> Result<usize, ServiceError> {
    Ok(lock_store(store)?.len())
}

fn lock_store(store: &Mutex<ContactStore>) -> Result<MutexGuard<'_, ContactStore>, ServiceError> {
    store
        .lock()
        .map_err(|_| ServiceError::Internal("contact store lock poisoned".to_string()))
}
