// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! HTTP server: listener setup, request dispatch, the auth gate, the
//! self-capture tee, and the schema/diff/project/endpoint handlers.

use crate::auth::{self, TokenVerifier};
use crate::live::{LiveRequest, LiveService};
use crate::proxy::ProxyRegistry;
use crate::schema_ir::{SchemaIR, SchemaSource};
use crate::store::Store;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Largest request/response body the self-capture tee will decode.
const MAX_CAPTURE_BODY: usize = 1024 * 1024;

/// Everything the handlers share.
pub struct AppState {
    pub store: Store,
    pub live: LiveService,
    pub proxies: ProxyRegistry,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            store: Store::new(),
            live: LiveService::new(),
            proxies: ProxyRegistry::new(),
            verifier,
        }
    }
}

/// Bind the listener and return the bound address plus the serving future.
///
/// The future completes after `shutdown` resolves and in-flight requests
/// drain. Binding errors surface immediately.
pub fn serve(
    listen: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>)> {
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_request(req, state).await) }
            }))
        }
    });

    let server = Server::try_bind(&listen)?
        .http1_header_read_timeout(Duration::from_secs(15))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .serve(make_svc);
    let local_addr = server.local_addr();
    info!(%local_addr, "listening");

    Ok((local_addr, server.with_graceful_shutdown(shutdown)))
}

/// Top-level request entry: health bypasses auth, everything else is
/// authenticated and then (optionally) teed through self-capture.
pub async fn handle_request(req: Request<Body>, state: Arc<AppState>) -> Response<Body> {
    if req.uri().path() == "/api/health" && req.method() == hyper::Method::GET {
        return respond_json(StatusCode::OK, &serde_json::json!({"status": "healthy"}));
    }

    let user = match auth::authenticate(&req, &*state.verifier) {
        Ok(user) => user,
        Err(e) => return respond_error(StatusCode::UNAUTHORIZED, e.message()),
    };

    // Self-capture tee. The live API is excluded so the capture pipeline
    // never captures itself (the SSE stream would also never yield a
    // complete body to tee).
    if !req.uri().path().starts_with("/api/live/") {
        if let Some(project_id) = state.live.capturing_project_for(&user) {
            return capture_and_route(req, state, user, project_id).await;
        }
    }

    route(req, state, user).await
}

async fn capture_and_route(
    req: Request<Body>,
    state: Arc<AppState>,
    user: String,
    project_id: uuid::Uuid,
) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let method = parts.method.to_string();

    let body_bytes = hyper::body::to_bytes(body).await.unwrap_or_default();
    let request_body = if body_bytes.len() > MAX_CAPTURE_BODY {
        None
    } else {
        serde_json::from_slice(&body_bytes).ok()
    };
    let rebuilt = Request::from_parts(parts, Body::from(body_bytes));

    let started = Instant::now();
    let timestamp = chrono::Utc::now();
    let resp = route(rebuilt, state.clone(), user).await;
    let duration_ms = started.elapsed().as_millis() as f64;

    let (resp_parts, resp_body) = resp.into_parts();
    let resp_bytes = hyper::body::to_bytes(resp_body).await.unwrap_or_default();
    let response_body = if resp_bytes.len() > MAX_CAPTURE_BODY {
        None
    } else {
        serde_json::from_slice(&resp_bytes).ok()
    };
    let status_code = resp_parts.status.as_u16();
    let response = Response::from_parts(resp_parts, Body::from(resp_bytes));

    state.live.ingest(
        project_id,
        vec![LiveRequest {
            id: String::new(),
            timestamp: Some(timestamp),
            path,
            method,
            status_code,
            duration_ms,
            request_body,
            response_body,
            source: "self".to_string(),
        }],
    );

    response
}

async fn route(req: Request<Body>, state: Arc<AppState>, user: String) -> Response<Body> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let segs: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (method.as_str(), segs.as_slice()) {
        ("POST", ["api", "analyze", "backend"]) => {
            upload_schemas(req, &state, &user, SchemaSource::BackendStatic).await
        }
        ("POST", ["api", "analyze", "frontend"]) => {
            upload_schemas(req, &state, &user, SchemaSource::FrontendStatic).await
        }
        ("POST", ["api", "analyze", "runtime"]) => {
            upload_schemas(req, &state, &user, SchemaSource::Runtime).await
        }

        ("GET", ["api", "diff", endpoint_id]) => compute_diff(&state, &user, endpoint_id),
        ("GET", ["api", "stats"]) => get_stats(&state, &user),

        ("GET", ["api", "endpoints"]) => list_endpoints(&req, &state, &user),
        ("GET", ["api", "endpoints", endpoint_id]) => get_endpoint(&state, &user, endpoint_id),

        ("POST", ["api", "projects"]) => create_project(req, &state, &user).await,
        ("GET", ["api", "projects"]) => {
            respond_json(StatusCode::OK, &state.store.list_projects(&user))
        }
        ("GET", ["api", "projects", project_id]) => get_project(&state, &user, project_id),
        ("DELETE", ["api", "projects", project_id]) => delete_project(&state, &user, project_id),

        (_, ["api", "live", ..]) => crate::live_api::route_live(req, state, user).await,

        _ => respond_error(StatusCode::NOT_FOUND, "Not found"),
    }
}

#[derive(Deserialize)]
struct UploadSchemasRequest {
    project_id: String,
    schemas: Vec<SchemaIR>,
}

async fn upload_schemas(
    req: Request<Body>,
    state: &AppState,
    user: &str,
    source: SchemaSource,
) -> Response<Body> {
    let body: UploadSchemasRequest = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let Some(project_id) = parse_uuid(&body.project_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid project ID");
    };
    if state.store.accessible_project(project_id, user).is_none() {
        return respond_error(StatusCode::NOT_FOUND, "Project not found");
    }

    let count = body.schemas.len();
    let schemas: Vec<SchemaIR> = body
        .schemas
        .into_iter()
        .map(|mut s| {
            s.source = source;
            s
        })
        .collect();
    state.store.upsert_schemas(project_id, schemas);

    respond_json(
        StatusCode::CREATED,
        &serde_json::json!({"message": "Schemas uploaded successfully", "count": count}),
    )
}

fn compute_diff(state: &AppState, user: &str, endpoint_id: &str) -> Response<Body> {
    let Some(endpoint_id) = parse_uuid(endpoint_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid endpoint ID");
    };
    let Some(endpoint) = state.store.get_endpoint(endpoint_id) else {
        return respond_error(StatusCode::NOT_FOUND, "Endpoint not found");
    };
    if state
        .store
        .accessible_project(endpoint.project_id, user)
        .is_none()
    {
        return respond_error(StatusCode::NOT_FOUND, "Project not found");
    }

    let irs = state.store.schema_irs_for_endpoint(endpoint_id);
    let result = crate::diff::compare(&endpoint.path, &endpoint.method, &irs);
    if irs.len() >= 2 {
        state.store.record_diff(endpoint_id, &result);
    }

    respond_json(StatusCode::OK, &result)
}

fn get_stats(state: &AppState, user: &str) -> Response<Body> {
    let project_ids: Vec<uuid::Uuid> = state
        .store
        .list_projects(user)
        .iter()
        .map(|p| p.id)
        .collect();
    respond_json(StatusCode::OK, &state.store.stats(&project_ids))
}

fn list_endpoints(req: &Request<Body>, state: &AppState, user: &str) -> Response<Body> {
    let Some(project_id) = query_param(req, "project_id") else {
        return respond_error(
            StatusCode::BAD_REQUEST,
            "project_id query parameter is required",
        );
    };
    let Some(project_id) = parse_uuid(&project_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid project ID");
    };
    if state.store.accessible_project(project_id, user).is_none() {
        return respond_error(StatusCode::NOT_FOUND, "Project not found");
    }
    respond_json(StatusCode::OK, &state.store.list_endpoints(project_id))
}

fn get_endpoint(state: &AppState, user: &str, endpoint_id: &str) -> Response<Body> {
    let Some(endpoint_id) = parse_uuid(endpoint_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid endpoint ID");
    };
    let Some(endpoint) = state.store.get_endpoint(endpoint_id) else {
        return respond_error(StatusCode::NOT_FOUND, "Endpoint not found");
    };
    if state
        .store
        .accessible_project(endpoint.project_id, user)
        .is_none()
    {
        return respond_error(StatusCode::NOT_FOUND, "Project not found");
    }
    respond_json(StatusCode::OK, &endpoint)
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_project(req: Request<Body>, state: &AppState, user: &str) -> Response<Body> {
    let body: CreateProjectRequest = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if body.name.is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "Name is required");
    }
    let project = state.store.create_project(user, &body.name, &body.description);
    respond_json(StatusCode::CREATED, &project)
}

fn get_project(state: &AppState, user: &str, project_id: &str) -> Response<Body> {
    let Some(project_id) = parse_uuid(project_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid project ID");
    };
    match state.store.accessible_project(project_id, user) {
        Some(project) => respond_json(StatusCode::OK, &project),
        None => respond_error(StatusCode::NOT_FOUND, "Project not found"),
    }
}

fn delete_project(state: &AppState, user: &str, project_id: &str) -> Response<Body> {
    let Some(project_id) = parse_uuid(project_id) else {
        return respond_error(StatusCode::BAD_REQUEST, "Invalid project ID");
    };
    if state.store.delete_project(project_id, user) {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap_or_else(|_| Response::new(Body::empty()))
    } else {
        respond_error(StatusCode::NOT_FOUND, "Project not found")
    }
}

pub(crate) fn parse_uuid(s: &str) -> Option<uuid::Uuid> {
    uuid::Uuid::parse_str(s).ok()
}

pub(crate) fn query_param(req: &Request<Body>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix(name).and_then(|r| r.strip_prefix('=')) {
            return Some(value.to_string());
        }
    }
    None
}

pub(crate) async fn read_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Body>,
) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|_| respond_error(StatusCode::BAD_REQUEST, "Invalid request body"))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| respond_error(StatusCode::BAD_REQUEST, "Invalid request body"))
}

pub(crate) fn respond_json<T: serde::Serialize>(status: StatusCode, data: &T) -> Response<Body> {
    let body = match serde_json::to_vec(data) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode JSON response");
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from(r#"{"error":"internal error"}"#))
                .unwrap_or_else(|_| Response::new(Body::empty()));
        }
    };
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

pub(crate) fn respond_error(status: StatusCode, message: &str) -> Response<Body> {
    respond_json(status, &serde_json::json!({"error": message}))
}
