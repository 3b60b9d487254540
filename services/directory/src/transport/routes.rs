use chrono::Utc;
use schema::ContactPayload;

use super::{DirectoryRuntime, HttpRequest, HttpResponse, map_service_error};
use crate::{
    RequestPhase, ServiceError,
    api::{HealthBody, render_home_html, render_info_html},
    count_contacts, create_contact, fetch_contact, list_contacts, remove_contact, update_contact,
};

pub(super) fn route(
    runtime: &DirectoryRuntime,
    request: &HttpRequest,
    phase: &mut RequestPhase,
) -> HttpResponse {
    let segments: Vec<&str> = request
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let store = runtime.store();

    let result = match (request.method.as_str(), segments.as_slice()) {
        ("GET", []) => Ok(HttpResponse::ok_html(render_home_html())),
        ("GET", ["health"]) => Ok(HttpResponse::ok_json(&HealthBody {
            status: "ok".to_string(),
        })),
        ("GET", ["info"]) => count_contacts(store).map(|count| {
            HttpResponse::ok_html(render_info_html(count, &Utc::now().to_rfc2822()))
        }),
        ("GET", ["contacts"]) => list_contacts(store).map(|contacts| HttpResponse::ok_json(&contacts)),
        ("POST", ["contacts"]) => parse_payload(request)
            .and_then(|payload| create_contact(store, &payload, phase))
            .map(|created| HttpResponse::ok_json(&created)),
        ("GET", ["contacts", id]) => {
            fetch_contact(store, id).map(|contact| HttpResponse::ok_json(&contact))
        }
        ("PUT", ["contacts", id]) => parse_payload(request)
            .and_then(|payload| update_contact(store, id, &payload, phase))
            .map(|updated| HttpResponse::ok_json(&updated)),
        ("DELETE", ["contacts", id]) => {
            remove_contact(store, id, phase).map(|_| HttpResponse::no_content())
        }
        _ => Ok(HttpResponse::unknown_endpoint()),
    };

    result.unwrap_or_else(|err| map_service_error(&err))
}

/// Decodes a POST/PUT body. A declared content type must be JSON; an empty
/// body reads as an object with no fields.
fn parse_payload(request: &HttpRequest) -> Result<ContactPayload, ServiceError> {
    if let Some(content_type) = request.headers.get("content-type")
        && !content_type
            .to_ascii_lowercase()
            .contains("application/json")
    {
        return Err(ServiceError::UnsupportedContentType);
    }
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ContactPayload::default());
    }
    serde_json::from_slice(&request.body).map_err(|err| ServiceError::MalformedBody(err.to_string()))
}
