use serde::{Deserialize, Serialize};

pub use schema::{Contact, ContactPayload};

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
}

pub const UNKNOWN_ENDPOINT: &str = "unknown endpoint";

pub fn render_info_html(contacts: usize, requested_at: &str) -> String {
    format!("<p>Phonebook has info for {contacts} people</p>\n<p>{requested_at}</p>\n")
}

pub fn render_home_html() -> String {
    "<h1>Contact directory</h1>\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_serializes_to_wire_shape() {
        let contact = Contact {
            id: "x".into(),
            name: "Ada".into(),
            number: "1".into(),
        };
        assert_eq!(
            serde_json::to_string(&contact).unwrap(),
            r#"{"id":"x","name":"Ada","number":"1"}"#
        );
    }

    #[test]
    fn info_html_reports_count_and_timestamp() {
        let html = render_info_html(3, "Sat, 17 Oct 2026 10:00:00 +0000");
        assert!(html.contains("info for 3 people"));
        assert!(html.contains("17 Oct 2026"));
    }
}
