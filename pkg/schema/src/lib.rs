use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Core record types
// ---------------------------------------------------------------------------

/// A stored contact. `id` is assigned by the store and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub number: String,
}

/// A validated create/update request, fields trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub name: String,
    pub number: String,
}

impl ContactDraft {
    pub fn into_contact(self, id: String) -> Contact {
        Contact {
            id,
            name: self.name,
            number: self.number,
        }
    }
}

/// Wire shape of a POST/PUT body before validation. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name missing")]
    MissingName,
    #[error("number missing")]
    MissingNumber,
}

pub fn validate_payload(payload: &ContactPayload) -> Result<ContactDraft, ValidationError> {
    let name = non_blank(payload.name.as_deref()).ok_or(ValidationError::MissingName)?;
    let number = non_blank(payload.number.as_deref()).ok_or(ValidationError::MissingNumber)?;
    Ok(ContactDraft {
        name: name.to_string(),
        number: number.to_string(),
    })
}

/// Re-checks a draft that did not come through `validate_payload`, e.g. one
/// replayed from disk.
pub fn validate_draft(draft: &ContactDraft) -> Result<(), ValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if draft.number.trim().is_empty() {
        return Err(ValidationError::MissingNumber);
    }
    Ok(())
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

/// Case-folded form of a name, used for uniqueness comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: Option<&str>, number: Option<&str>) -> ContactPayload {
        ContactPayload {
            name: name.map(str::to_string),
            number: number.map(str::to_string),
        }
    }

    #[test]
    fn validates_payload_and_trims_fields() {
        let draft = validate_payload(&payload(Some("  Ada Lovelace "), Some(" 040-123 "))).unwrap();
        assert_eq!(draft.name, "Ada Lovelace");
        assert_eq!(draft.number, "040-123");
    }

    #[test]
    fn rejects_payload_without_name() {
        assert_eq!(
            validate_payload(&payload(None, Some("1"))),
            Err(ValidationError::MissingName)
        );
    }

    #[test]
    fn rejects_payload_with_blank_name() {
        assert_eq!(
            validate_payload(&payload(Some("   "), Some("1"))),
            Err(ValidationError::MissingName)
        );
    }

    #[test]
    fn rejects_payload_without_number() {
        assert_eq!(
            validate_payload(&payload(Some("Ada"), None)),
            Err(ValidationError::MissingNumber)
        );
        assert_eq!(
            validate_payload(&payload(Some("Ada"), Some(""))),
            Err(ValidationError::MissingNumber)
        );
    }

    #[test]
    fn missing_name_is_reported_before_missing_number() {
        assert_eq!(
            validate_payload(&ContactPayload::default()),
            Err(ValidationError::MissingName)
        );
    }

    #[test]
    fn validation_messages_match_wire_contract() {
        assert_eq!(ValidationError::MissingName.to_string(), "name missing");
        assert_eq!(ValidationError::MissingNumber.to_string(), "number missing");
    }

    #[test]
    fn payload_ignores_unknown_fields() {
        let parsed: ContactPayload =
            serde_json::from_str(r#"{"name":"Ada","number":"1","important":true}"#).unwrap();
        assert_eq!(parsed, payload(Some("Ada"), Some("1")));
    }

    #[test]
    fn validate_draft_rejects_blank_fields() {
        let draft = ContactDraft {
            name: "Ada".into(),
            number: " ".into(),
        };
        assert_eq!(validate_draft(&draft), Err(ValidationError::MissingNumber));
    }

    #[test]
    fn normalize_name_folds_case_and_whitespace() {
        assert_eq!(normalize_name(" Ada LOVELACE "), "ada lovelace");
        assert_eq!(normalize_name("Ärger"), normalize_name("äRGER"));
    }
}
