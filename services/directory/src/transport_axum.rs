use std::{collections::HashMap, sync::Arc, time::Instant};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, Request, Response, StatusCode,
        header::{ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::IntoResponse,
    routing::any,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{
    RequestPhase,
    transport::{
        DirectoryRuntime, HttpRequest, HttpResponse, SharedRuntime, handle_request,
        handle_unreadable_body, record_exchange,
    },
};

const MAX_HTTP_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    runtime: SharedRuntime,
}

/// Every path goes through one fallback so routing, audit and error mapping
/// stay in `handle_request`. Browser clients on other origins are allowed;
/// CORS preflights are answered by the CORS layer and audited around it.
pub fn router(runtime: SharedRuntime) -> Router {
    Router::new()
        .fallback(any(dispatch))
        .with_state(AppState {
            runtime: Arc::clone(&runtime),
        })
        .layer(axum::extract::DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(runtime, audit_preflight))
}

pub fn serve_http_with_axum(
    directory_runtime: DirectoryRuntime,
    bind_addr: &str,
    worker_threads: usize,
) -> Result<(), String> {
    let worker_threads = worker_threads.max(1);
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = bind_addr.to_string();
    tokio_runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
        info!(bind_addr = %bind_addr, worker_threads, "directory listening");

        let app = router(Arc::new(directory_runtime));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("axum server failed: {e}"))
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested, draining connections"),
        Err(err) => warn!(error = %err, "failed to install ctrl-c handler"),
    }
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> impl IntoResponse {
    let started = Instant::now();
    let mut transport_request = HttpRequest {
        method: request.method().to_string(),
        target: request_target(&request),
        headers: collect_headers(request.headers()),
        body: Vec::new(),
    };

    match to_bytes(request.into_body(), MAX_HTTP_BODY_BYTES).await {
        Ok(bytes) => transport_request.body = bytes.to_vec(),
        Err(err) => {
            let reason = format!("request body error: {err}");
            return response_from_transport(handle_unreadable_body(
                &state.runtime,
                &transport_request,
                &reason,
                started,
            ));
        }
    }

    response_from_transport(handle_request(&state.runtime, &transport_request))
}

/// Audits CORS preflights, which the CORS layer answers without reaching
/// `dispatch`.
async fn audit_preflight(
    State(runtime): State<SharedRuntime>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let is_preflight = request.method() == Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);
    if !is_preflight {
        return next.run(request).await;
    }

    let started = Instant::now();
    let transport_request = HttpRequest {
        method: request.method().to_string(),
        target: request_target(&request),
        headers: collect_headers(request.headers()),
        body: Vec::new(),
    };
    let response = next.run(request).await;
    record_exchange(
        &runtime,
        &transport_request,
        response.status().as_u16(),
        0,
        RequestPhase::Received,
        started,
    );
    response
}

fn request_target(request: &Request<Body>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    out
}

fn response_from_transport(response: HttpResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    if status != StatusCode::NO_CONTENT {
        out.headers_mut().insert(
            CONTENT_TYPE,
            response
                .content_type
                .parse()
                .unwrap_or(HeaderValue::from_static("application/json")),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn sample_state() -> AppState {
        AppState {
            runtime: Arc::new(DirectoryRuntime::in_memory()),
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), MAX_HTTP_BODY_BYTES)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn dispatch_health_returns_ok_json() {
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(sample_state()), request)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn dispatch_post_contact_then_list_it() {
        let state = sample_state();
        let create = Request::builder()
            .method("POST")
            .uri("/contacts")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ada Lovelace","number":"040-123456"}"#))
            .unwrap();
        let response = dispatch(State(state.clone()), create)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let created: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(created["name"], "Ada Lovelace");

        let list = Request::builder()
            .method("GET")
            .uri("/contacts")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(state), list).await.into_response();
        let listed: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
        assert_eq!(listed[0]["id"], created["id"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn dispatch_audits_oversized_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/contacts")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; MAX_HTTP_BODY_BYTES + 10]))
            .unwrap();
        let response = dispatch(State(sample_state()), request)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, r#"{"error":"malformatted body"}"#);
        assert!(logs_contain("POST /contacts 400"));
        assert!(logs_contain("phase=\"error\""));
    }

    #[tokio::test]
    async fn dispatch_delete_has_no_content_type() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/contacts/6f1c2c8e-8a43-4b43-9d3e-2c1f7a9b0e11")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(sample_state()), request)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(body_text(response).await.is_empty());
    }
}
