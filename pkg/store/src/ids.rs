use std::collections::VecDeque;

use uuid::Uuid;

use crate::StoreError;

/// Upper bound on candidate draws before `insert` gives up.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Source of identifier candidates. The store checks every candidate for
/// collisions, so a source only needs to be likely-unique.
pub trait IdSource: Send {
    fn candidate(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn candidate(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Replays a fixed list of candidates, then falls back to random ones.
#[derive(Debug, Clone, Default)]
pub struct ScriptedIds {
    queue: VecDeque<String>,
}

impl ScriptedIds {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

impl IdSource for ScriptedIds {
    fn candidate(&mut self) -> String {
        self.queue
            .pop_front()
            .unwrap_or_else(|| RandomIds.candidate())
    }
}

/// Parses a client-supplied identifier into its canonical hyphenated
/// lowercase form. Only the hyphenated (36 chars) and simple (32 hex chars)
/// spellings are accepted; braced and URN forms are malformed.
pub fn parse_identifier(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    if trimmed.len() != 36 && trimmed.len() != 32 {
        return Err(StoreError::MalformedIdentifier(raw.to_string()));
    }
    Uuid::try_parse(trimmed)
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| StoreError::MalformedIdentifier(raw.to_string()))
}
