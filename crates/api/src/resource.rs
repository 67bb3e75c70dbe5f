#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lws_auth::{AccessTokenError, AccessTokenValidator};
use lws_core::{Action, ValidatedRequest};
use lws_storage::{Storage, StorageError};

use crate::ErrorResponse;

/// State of the resource-server surface. The realm URI is the audience
/// authority; its origin plus the request path forms the resource URI that
/// audience containment is checked against.
#[derive(Clone)]
pub struct ResourceState {
    validator: Arc<AccessTokenValidator>,
    storage: Arc<dyn Storage>,
    realm: String,
    authorization_server_uri: String,
    realm_origin: String,
}

impl ResourceState {
    pub fn new(
        validator: Arc<AccessTokenValidator>,
        storage: Arc<dyn Storage>,
        realm: String,
        authorization_server_uri: String,
    ) -> Self {
        let realm_origin = origin_of(&realm);
        Self {
            validator,
            storage,
            realm,
            authorization_server_uri,
            realm_origin,
        }
    }

    fn challenge(&self, error: Option<&str>) -> HeaderValue {
        let mut value = format!(
            "Bearer as_uri=\"{}\", realm=\"{}\"",
            self.authorization_server_uri, self.realm
        );
        if let Some(error) = error {
            value.push_str(&format!(", error=\"{error}\""));
        }
        HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
    }
}

fn origin_of(realm: &str) -> String {
    match url::Url::parse(realm) {
        Ok(url) => {
            let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
            if let Some(port) = url.port() {
                origin.push(':');
                origin.push_str(&port.to_string());
            }
            origin
        }
        Err(_) => realm.trim_end_matches('/').to_owned(),
    }
}

pub fn resource_router(state: ResourceState) -> Router {
    let middleware_state = state.clone();
    Router::new()
        .route("/.well-known/lws-storage-server", get(storage_metadata))
        .route("/health", get(|| async { StatusCode::OK }))
        .fallback(dispatch_to_storage)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            middleware_state,
            challenge_middleware,
        ))
}

async fn storage_metadata(State(state): State<ResourceState>) -> Response {
    let mut response = Json(serde_json::json!({
        "as_uri": state.authorization_server_uri.clone(),
        "realm": state.realm.clone(),
    }))
    .into_response();
    // The discovery endpoint carries the same challenge so clients learn
    // where to exchange tokens before their first 401.
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, state.challenge(None));
    response
}

async fn challenge_middleware(
    State(state): State<ResourceState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return challenge_response(&state, StatusCode::UNAUTHORIZED, None, "missing authorization");
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return challenge_response(
            &state,
            StatusCode::UNAUTHORIZED,
            Some("invalid_token"),
            "invalid authorization header format",
        );
    };

    let resource = format!("{}{}", state.realm_origin, request.uri().path());
    match state
        .validator
        .validate(token, request.method().as_str(), &resource)
        .await
    {
        Ok(validated) => {
            request.extensions_mut().insert(validated);
            next.run(request).await
        }
        Err(AccessTokenError::MethodNotAllowed) => challenge_response(
            &state,
            StatusCode::METHOD_NOT_ALLOWED,
            Some("method_not_allowed"),
            "method not allowed",
        ),
        Err(error @ AccessTokenError::Upstream(_)) => {
            tracing::error!(%error, "access-token validation hit an upstream failure");
            challenge_response(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("server_error"),
                "validation dependency failed",
            )
        }
        Err(error) => challenge_response(
            &state,
            StatusCode::UNAUTHORIZED,
            Some(error.error_code()),
            &error.to_string(),
        ),
    }
}

fn is_public_path(path: &str) -> bool {
    matches!(path, "/.well-known/lws-storage-server" | "/health")
}

fn challenge_response(
    state: &ResourceState,
    status: StatusCode,
    error: Option<&str>,
    message: &str,
) -> Response {
    let mut response = (
        status,
        Json(ErrorResponse::with_description(
            error.unwrap_or("unauthorized"),
            message,
        )),
    )
        .into_response();
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, state.challenge(error));
    response
}

async fn dispatch_to_storage(
    State(state): State<ResourceState>,
    request: Request,
) -> Response {
    let Some(validated) = request.extensions().get::<ValidatedRequest>().cloned() else {
        // Only reachable if the middleware was bypassed; refuse outright.
        return challenge_response(&state, StatusCode::UNAUTHORIZED, None, "missing validation");
    };

    let body = match axum::body::to_bytes(request.into_body(), 1 << 20).await {
        Ok(body) => body,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorResponse::new("payload_too_large")),
            )
                .into_response()
        }
    };

    let path = validated.resource_path.as_str();
    let result = perform(&state, validated.action, path, &body).await;
    match result {
        Ok(response) => response,
        Err(StorageError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(StorageError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn perform(
    state: &ResourceState,
    action: Action,
    path: &str,
    body: &Bytes,
) -> Result<Response, StorageError> {
    match action {
        Action::Read => {
            let content = state.storage.read(path).await?;
            Ok((StatusCode::OK, content).into_response())
        }
        Action::Create => {
            state.storage.create(path, body).await?;
            Ok(StatusCode::CREATED.into_response())
        }
        Action::Update => {
            state.storage.write(path, body).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Action::Append => {
            state.storage.append(path, body).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Action::Delete => {
            state.storage.delete(path).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}
