use schema::ValidationError;
use store::StoreError;
use thiserror::Error;

/// Every way a request can fail. Store failures are reclassified here at the
/// handler boundary; anything without a client-facing meaning becomes
/// `Internal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("malformatted body: {0}")]
    MalformedBody(String),
    #[error("content-type must include application/json")]
    UnsupportedContentType,
    #[error("malformatted id '{0}'")]
    MalformedIdentifier(String),
    #[error("no contact with id '{0}'")]
    NotFound(String),
    #[error("name already held by contact '{existing_id}'")]
    UniquenessConflict { existing_id: String },
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::MalformedBody(_)
            | Self::UnsupportedContentType
            | Self::MalformedIdentifier(_)
            | Self::UniquenessConflict { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    /// Text placed in the `error` field of the response. Never carries
    /// internal detail.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::MalformedBody(_) => "malformatted body".to_string(),
            Self::UnsupportedContentType => self.to_string(),
            Self::MalformedIdentifier(_) => "malformatted id".to_string(),
            Self::NotFound(_) => "contact not found".to_string(),
            Self::UniquenessConflict { .. } => "name must be unique".to_string(),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::MalformedIdentifier(raw) => Self::MalformedIdentifier(raw),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::NameTaken { id } => Self::UniquenessConflict { existing_id: id },
            StoreError::Validation(err) => Self::Validation(err),
            err @ (StoreError::Integrity(_)
            | StoreError::IdExhausted { .. }
            | StoreError::Io(_)
            | StoreError::Parse(_)) => Self::Internal(err.to_string()),
        }
    }
}
