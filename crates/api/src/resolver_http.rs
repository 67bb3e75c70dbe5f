#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lws_resolver::{resolve_did_key, CidResolver, ResolverError};
use serde::Deserialize;

use crate::ErrorResponse;

/// State of the standalone resolver service.
#[derive(Clone)]
pub struct ResolverState {
    resolver: Arc<CidResolver>,
}

impl ResolverState {
    #[must_use]
    pub fn new(resolver: Arc<CidResolver>) -> Self {
        Self { resolver }
    }
}

pub fn resolver_router(state: ResolverState) -> Router {
    Router::new()
        .route("/resolve", get(resolve))
        .route("/verification-method", get(verification_method))
        .route("/resolve-did-key", get(resolve_did_key_endpoint))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(state)
}

#[derive(Deserialize)]
struct ResolveParams {
    uri: String,
}

#[derive(Deserialize)]
struct VerificationMethodParams {
    uri: String,
    kid: String,
}

#[derive(Deserialize)]
struct DidKeyParams {
    did: String,
}

async fn resolve(
    State(state): State<ResolverState>,
    Query(params): Query<ResolveParams>,
) -> Response {
    match state.resolver.resolve(&params.uri).await {
        Ok(document) => Json(document).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn verification_method(
    State(state): State<ResolverState>,
    Query(params): Query<VerificationMethodParams>,
) -> Response {
    let document = match state.resolver.resolve(&params.uri).await {
        Ok(document) => document,
        Err(error) => return error_response(&error),
    };
    match document.verification_method(&params.kid) {
        Some(method) => Json(method.clone()).into_response(),
        None => error_response(&ResolverError::NoVerificationMethod(params.kid)),
    }
}

async fn resolve_did_key_endpoint(Query(params): Query<DidKeyParams>) -> Response {
    match resolve_did_key(&params.did) {
        Ok(jwk) => Json(serde_json::json!({ "publicKeyJwk": jwk })).into_response(),
        Err(error) => error_response(&error),
    }
}

fn error_response(error: &ResolverError) -> Response {
    let status = match error {
        ResolverError::InvalidUri(_)
        | ResolverError::HttpsRequired(_)
        | ResolverError::UnsupportedKeyType(_)
        | ResolverError::UnsupportedKeyFormat(_) => StatusCode::BAD_REQUEST,
        ResolverError::NoVerificationMethod(_) => StatusCode::NOT_FOUND,
        ResolverError::DocumentTooLarge(_)
        | ResolverError::Timeout
        | ResolverError::FetchFailed(_)
        | ResolverError::Unreachable(_)
        | ResolverError::InvalidDocument(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse::with_description(
            resolver_error_code(error),
            error.to_string(),
        )),
    )
        .into_response()
}

fn resolver_error_code(error: &ResolverError) -> &'static str {
    match error {
        ResolverError::InvalidUri(_) => "invalid_uri",
        ResolverError::HttpsRequired(_) => "https_required",
        ResolverError::DocumentTooLarge(_) => "document_too_large",
        ResolverError::Timeout => "timeout",
        ResolverError::FetchFailed(_) => "fetch_failed",
        ResolverError::Unreachable(_) => "fetch_failed",
        ResolverError::InvalidDocument(_) => "invalid_document",
        ResolverError::UnsupportedKeyType(_) => "unsupported_key_type",
        ResolverError::UnsupportedKeyFormat(_) => "unsupported_key_format",
        ResolverError::NoVerificationMethod(_) => "no_verification_method",
    }
}
