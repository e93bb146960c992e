//! Request handlers and error-to-status mapping.

use axum::extract::{Form, Query, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use onetime_common::{Error, StoreMode};
use onetime_vault::Vault;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Query string of `POST /api/encrypt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptQuery {
    pub store_type: String,
}

/// Form body of `POST /api/encrypt`.
#[derive(Deserialize)]
pub struct EncryptForm {
    pub data: String,
}

/// Query string of `GET /api/decrypt`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptQuery {
    pub key_name: String,
}

/// Build the application router around a shared vault.
pub fn router(vault: Arc<Vault>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/encrypt", post(encrypt))
        .route("/api/decrypt", get(decrypt))
        .with_state(vault)
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "msg": msg }))).into_response()
}

/// Map a vault error to a response.
///
/// `NotFound` gets one fixed body so callers cannot tell a consumed token
/// from an expired or invented one. Retryable failures carry `Retry-After`.
fn error_response(error: &Error) -> Response {
    let mut response = match error {
        Error::Validation(_) => message(StatusCode::BAD_REQUEST, "Invalid request"),
        Error::Storage(_) => message(StatusCode::SERVICE_UNAVAILABLE, "Storing data failed"),
        Error::NotFound => message(StatusCode::NOT_FOUND, "Key incorrect or data missing"),
        Error::Decryption(_) => message(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Stored data could not be decrypted",
        ),
        Error::Crypto(_) | Error::Config(_) | Error::Io(_) => {
            message(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    };
    if error.is_retryable() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("1"));
    }
    response
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn encrypt(
    State(vault): State<Arc<Vault>>,
    Query(query): Query<EncryptQuery>,
    Form(form): Form<EncryptForm>,
) -> Response {
    let mode: StoreMode = match query.store_type.parse() {
        Ok(mode) => mode,
        Err(_) => {
            debug!(store_type = %query.store_type, "Rejected unsupported store type");
            return message(StatusCode::BAD_REQUEST, "Unsupported storeType provided");
        }
    };

    match vault.put(mode, &form.data).await {
        Ok(token) => (StatusCode::CREATED, Json(json!({ "key": token.as_str() }))).into_response(),
        Err(e) => {
            warn!(mode = %mode, error = %e, "Encrypt request failed");
            error_response(&e)
        }
    }
}

async fn decrypt(State(vault): State<Arc<Vault>>, Query(query): Query<DecryptQuery>) -> Response {
    match vault.get(&query.key_name).await {
        Ok(data) => (StatusCode::OK, Json(json!({ "data": data }))).into_response(),
        Err(e) => {
            debug!(error = %e, "Decrypt request failed");
            error_response(&e)
        }
    }
}
