#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use lws_auth::{ExchangeError, ExchangeRequest, RealmKeys, TokenExchange};
use lws_core::GRANT_TYPE_TOKEN_EXCHANGE;

use crate::ErrorResponse;

/// State of the authorization-server surface: the exchange handler plus the
/// realm's public keys for `/jwks`.
#[derive(Clone)]
pub struct AuthorizationState {
    exchange: Arc<TokenExchange>,
    keys: Arc<RealmKeys>,
    realm: String,
}

impl AuthorizationState {
    #[must_use]
    pub fn new(exchange: Arc<TokenExchange>, keys: Arc<RealmKeys>, realm: String) -> Self {
        Self {
            exchange,
            keys,
            realm,
        }
    }
}

pub fn authorization_router(state: AuthorizationState) -> Router {
    Router::new()
        .route("/token", post(token_exchange))
        .route("/.well-known/lws-configuration", get(lws_configuration))
        .route("/jwks", get(jwks))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(state)
}

async fn token_exchange(
    State(state): State<AuthorizationState>,
    Form(request): Form<ExchangeRequest>,
) -> Response {
    match state.exchange.exchange(request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => {
            let status = match error {
                ExchangeError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(ErrorResponse::with_description(
                    error.error_code(),
                    error.to_string(),
                )),
            )
                .into_response()
        }
    }
}

async fn lws_configuration(State(state): State<AuthorizationState>) -> Json<serde_json::Value> {
    let realm = state.realm.trim_end_matches('/').to_owned();
    Json(serde_json::json!({
        "issuer": state.realm,
        "token_endpoint": format!("{realm}/token"),
        "jwks_uri": format!("{realm}/jwks"),
        "grant_types_supported": [GRANT_TYPE_TOKEN_EXCHANGE],
        "subject_token_types_supported": state.exchange.supported_token_types(),
    }))
}

async fn jwks(State(state): State<AuthorizationState>) -> Json<lws_resolver::Jwks> {
    Json(state.keys.public_jwks().clone())
}
