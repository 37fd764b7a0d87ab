use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    store: &'a str,
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            store: state.dispatcher.engine().store_backend(),
        }),
    )
}

/// `PUT /{resource_type}?criteria`
pub async fn conditional_update(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_request(format!("request body is not valid JSON: {e}")))?;

    // Dropping the request future (client went away) cancels in-flight work.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let written = state
        .dispatcher
        .conditional_update(&resource_type, body, query.as_deref().unwrap_or(""), &cancel)
        .await?;

    let status = if written.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut headers = HeaderMap::new();
    if let Ok(etag) = HeaderValue::from_str(&written.etag) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(location) = HeaderValue::from_str(&written.location) {
        headers.insert(header::LOCATION, location);
    }
    Ok((status, headers, Json(written.body)).into_response())
}
