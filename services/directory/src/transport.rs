mod audit;
mod http;
mod routes;

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use store::ContactStore;
use tracing::{error, warn};

use crate::{RequestPhase, ServiceError};

pub use audit::{AuditEvent, AuditLog, render_payload};
pub use http::{HttpRequest, HttpResponse};

/// Everything a request handler needs: the record store behind its lock and
/// the audit trail.
pub struct DirectoryRuntime {
    store: Mutex<ContactStore>,
    audit: AuditLog,
}

pub type SharedRuntime = Arc<DirectoryRuntime>;

impl DirectoryRuntime {
    pub fn new(store: ContactStore, audit: AuditLog) -> Self {
        Self {
            store: Mutex::new(store),
            audit,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(ContactStore::new(), AuditLog::disabled())
    }

    pub fn store(&self) -> &Mutex<ContactStore> {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}

pub fn handle_request(runtime: &DirectoryRuntime, request: &HttpRequest) -> HttpResponse {
    let started = Instant::now();
    let mut phase = RequestPhase::Received;
    let response = routes::route(runtime, request, &mut phase);
    record_exchange(runtime, request, response.status, response.body.len(), phase, started);
    response
}

/// Answers a request whose body could not be read off the wire. It never
/// reaches routing but is still audited.
pub fn handle_unreadable_body(
    runtime: &DirectoryRuntime,
    request: &HttpRequest,
    reason: &str,
    started: Instant,
) -> HttpResponse {
    let response = map_service_error(&ServiceError::MalformedBody(reason.to_string()));
    record_exchange(
        runtime,
        request,
        response.status,
        response.body.len(),
        RequestPhase::Received,
        started,
    );
    response
}

/// Writes the audit line for one finished request.
pub fn record_exchange(
    runtime: &DirectoryRuntime,
    request: &HttpRequest,
    status: u16,
    response_bytes: usize,
    reached: RequestPhase,
    started: Instant,
) {
    runtime.audit.record(&AuditEvent {
        method: &request.method,
        target: &request.target,
        status,
        response_bytes,
        elapsed: started.elapsed(),
        reached,
        phase: reached.finish(status),
        payload: render_payload(&request.body),
    });
}

/// Single translation point from failure to wire response. Internal detail
/// stays in the log.
pub fn map_service_error(err: &ServiceError) -> HttpResponse {
    let status = err.status();
    if status >= 500 {
        error!(error = %err, "request failed");
    } else {
        warn!(status, error = %err, "request rejected");
    }
    HttpResponse::error_with_status(status, &err.client_message())
}
