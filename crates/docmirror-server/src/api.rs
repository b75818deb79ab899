//! The served replication API.
//!
//! A single service `Replication` with one reserved method, plus a health
//! probe. `SendDocument` is scope-guarded but not yet implemented; its
//! shape is reserved for pushing a specific document out-of-band.

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::{parse_bearer, AuthInfo};

const SEND_DOCUMENT_SCOPES: &[&str] = &["doc_admin", "doc_write"];

/// Builds the API router.
pub fn router(cors_hosts: &[String]) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/rpc/Replication/SendDocument", post(send_document));

    if !cors_hosts.is_empty() {
        let origins: Vec<HeaderValue> = cors_hosts
            .iter()
            .filter_map(|host| HeaderValue::from_str(host).ok())
            .collect();
        router = router.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );
    }

    router
}

/// Builds the internal router served on the profiling/ops address.
pub fn internal_router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn send_document(request: Request) -> Response {
    let auth = match caller(&request) {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    if !auth.has_any_scope(SEND_DOCUMENT_SCOPES) {
        return error_response(
            StatusCode::FORBIDDEN,
            "permission_denied",
            "one of the scopes doc_admin, doc_write is required",
        );
    }

    error_response(StatusCode::NOT_IMPLEMENTED, "unimplemented", "soon")
}

fn caller(request: &Request) -> Result<AuthInfo, Response> {
    let Some(header_value) = request.headers().get(header::AUTHORIZATION) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "authorization required",
        ));
    };

    let token = header_value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "bearer token required",
        ));
    };

    parse_bearer(token).map_err(|err| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            &err.to_string(),
        )
    })
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({"code": code, "message": message}))).into_response()
}
