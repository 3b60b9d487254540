use schema::{Contact, normalize_name};
use thiserror::Error;

/// Verdict for a candidate name against the current record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Insert,
    Conflict { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityFault {
    #[error("name '{name}' is held by {} records: {}", ids.len(), ids.join(", "))]
    DuplicateNames { name: String, ids: Vec<String> },
}

/// Decides whether `name` may be inserted. Matching is case-insensitive
/// equality of the whole trimmed name, not token-wise.
///
/// More than one existing match means the uniqueness invariant is already
/// broken; that is reported instead of picking one of the records.
pub fn resolve_disposition<'a, I>(name: &str, existing: I) -> Result<Disposition, IntegrityFault>
where
    I: IntoIterator<Item = &'a Contact>,
{
    let candidate = normalize_name(name);
    let matches: Vec<&Contact> = existing
        .into_iter()
        .filter(|contact| normalize_name(&contact.name) == candidate)
        .collect();

    match matches.as_slice() {
        [] => Ok(Disposition::Insert),
        [only] => Ok(Disposition::Conflict {
            id: only.id.clone(),
        }),
        many => Err(IntegrityFault::DuplicateNames {
            name: name.to_string(),
            ids: many.iter().map(|contact| contact.id.clone()).collect(),
        }),
    }
}
