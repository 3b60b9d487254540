use std::collections::HashMap;

use serde::Serialize;
use tracing::error;

use crate::api::{ErrorBody, UNKNOWN_ENDPOINT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, target: &str) -> Self {
        Self {
            method: method.to_string(),
            target: target.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_json_body(mut self, body: &str) -> Self {
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self.body = body.as_bytes().to_vec();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Path component of the target, without the query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json_with_status(200, value)
    }

    pub fn ok_html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: "application/json",
            body: String::new(),
        }
    }

    pub fn unknown_endpoint() -> Self {
        Self::error_with_status(404, UNKNOWN_ENDPOINT)
    }

    pub fn error_with_status(status: u16, message: &str) -> Self {
        Self::json_with_status(
            status,
            &ErrorBody {
                error: message.to_string(),
            },
        )
    }

    fn json_with_status<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(err) => {
                error!(error = %err, "response serialization failed");
                Self {
                    status: 500,
                    content_type: "application/json",
                    body: r#"{"error":"internal server error"}"#.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_carry_single_error_field() {
        let response = HttpResponse::error_with_status(400, "name \"quoted\" missing");
        assert_eq!(response.status, 400);
        assert_eq!(response.body, r#"{"error":"name \"quoted\" missing"}"#);
    }

    #[test]
    fn unknown_endpoint_is_404() {
        let response = HttpResponse::unknown_endpoint();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, r#"{"error":"unknown endpoint"}"#);
    }

    #[test]
    fn path_drops_query_string() {
        assert_eq!(HttpRequest::new("GET", "/contacts?x=1").path(), "/contacts");
        assert_eq!(HttpRequest::new("GET", "/info").path(), "/info");
    }
}
