use crate::server_security::AuthToken;
use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reelqa_protocol::{serialize_json, ErrorEnvelope, HealthResponse, QueryRequest};
use reelqa_search::{Generator, Pipeline, SearchError, ServiceContext};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct HttpState {
    pub(crate) context: Arc<ServiceContext>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) auth_token: Option<AuthToken>,
}

pub(crate) fn router(state: HttpState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

fn is_authorized(headers: &HeaderMap, token: &AuthToken) -> bool {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    token.matches_http_authorization_header(value)
}

fn check_auth(state: &HttpState, headers: &HeaderMap) -> Option<Response> {
    let token = state.auth_token.as_ref()?;
    if is_authorized(headers, token) {
        return None;
    }
    let envelope = ErrorEnvelope::new("UNAUTHORIZED", "Missing or invalid Authorization header")
        .with_hint(format!(
            "Send 'Authorization: Bearer <token>' matching --auth-token or {}.",
            crate::server_security::AUTH_TOKEN_ENV
        ));
    Some(json_response(StatusCode::UNAUTHORIZED, &envelope))
}

async fn query_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_auth(&state, &headers) {
        return denied;
    }

    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let envelope =
                ErrorEnvelope::new("INVALID_REQUEST", format!("Invalid JSON request: {err}"))
                    .with_hint("Send a JSON body of the form {\"query\": \"...\"}.");
            return json_response(StatusCode::BAD_REQUEST, &envelope);
        }
    };

    match Pipeline::new(&state.context)
        .process(&request.query, state.generator.as_ref())
        .await
    {
        Ok(outcome) => json_response(StatusCode::OK, &outcome.to_response()),
        Err(err) => {
            log::warn!("Query failed ({}): {err}", err.code());
            error_response(&err)
        }
    }
}

async fn health_handler(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_auth(&state, &headers) {
        return denied;
    }
    json_response(StatusCode::OK, &HealthResponse::ok(env!("CARGO_PKG_VERSION")))
}

pub(crate) const fn status_for(err: &SearchError) -> StatusCode {
    match err {
        SearchError::EmptyRetrieval => StatusCode::NOT_FOUND,
        SearchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SearchError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SearchError::Generation(_) => StatusCode::BAD_GATEWAY,
        SearchError::EmptyQuery => StatusCode::BAD_REQUEST,
        SearchError::VectorStoreError(_) | SearchError::CorpusError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn hint_for(err: &SearchError) -> Option<&'static str> {
    match err {
        SearchError::EmptyRetrieval => {
            Some("Check that the index and metadata artifacts describe the same corpus.")
        }
        SearchError::Timeout { .. } => {
            Some("Raise generation.deadline_ms in the profile or retry later.")
        }
        SearchError::ModelUnavailable { .. } => {
            Some("Run `reelqa doctor` to check model assets and artifact paths.")
        }
        SearchError::Generation(_) => {
            Some("Check REELQA_LLM_BASE_URL, REELQA_LLM_MODEL and the API key.")
        }
        SearchError::EmptyQuery => Some("Send a non-empty \"query\" string."),
        SearchError::VectorStoreError(_) | SearchError::CorpusError(_) => None,
    }
}

pub(crate) fn error_response(err: &SearchError) -> Response {
    let mut envelope = ErrorEnvelope::new(err.code(), err.to_string());
    if let Some(hint) = hint_for(err) {
        envelope = envelope.with_hint(hint);
    }
    json_response(status_for(err), &envelope)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serialize_json(body) {
        Ok(json) => {
            let mut response = (status, [(CONTENT_TYPE, "application/json")], json).into_response();
            if status == StatusCode::UNAUTHORIZED {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, axum::http::HeaderValue::from_static("Bearer"));
            }
            response
        }
        Err(err) => {
            log::error!("Failed to serialize response: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
