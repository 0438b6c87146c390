//! Operation endpoints.
//!
//! Passthrough routes invoke one operation directly through the engine.
//! Every other path under the base goes through the Requesting mediator:
//! the request is recorded, its flow is settled, and the handler answers
//! with whatever a route rule resolved it with.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediator_core::Document;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::AppState;
use crate::requesting::{RequestingError, REQUESTING};
use crate::service::operation::{UnitError, GENERIC_INTERNAL_ERROR};

const TIMED_OUT: &str = "Request timed out.";

/// Reads a request body. Empty means absent (`null`); anything that is not
/// JSON is treated as an empty document.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        debug!(error = %e, "unparseable request body");
        Value::Object(Document::new())
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn unit_error_response(route: &str, e: &UnitError) -> Response {
    let status = match e {
        UnitError::Rejected(_) => StatusCode::BAD_REQUEST,
        UnitError::UnknownOperation { .. } => StatusCode::NOT_FOUND,
        UnitError::Internal(_) => {
            error!(route, error = %e, "operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.public_message())
}

/// `POST {base}/{unit}/{operation}` for a passthrough route.
pub async fn passthrough_handler(
    state: AppState,
    unit: &'static str,
    operation: &'static str,
    body: Bytes,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    match state.engine.invoke(unit, operation, parse_body(&body)).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => unit_error_response(&format!("{unit}/{operation}"), &e),
    }
}

/// `POST {base}/{*path}` for every route that is not passthrough.
pub async fn mediated_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    let path = format!("/{path}");
    let input = match parse_body(&body) {
        Value::Object(doc) => Value::Object(doc),
        _ => Value::Object(Document::new()),
    };

    let ctx = state.engine.begin_flow();
    let opened = match ctx
        .invoke(REQUESTING, "request", json!({ "path": path, "input": input }))
        .await
    {
        Ok(out) => out,
        Err(e) => return unit_error_response(&path, &e),
    };
    let Some(request) = opened.get("request").and_then(Value::as_str).map(str::to_string) else {
        error!(path = %path, "mediator returned no request id");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_INTERNAL_ERROR);
    };

    // The caller is answered once the whole reaction chain has run. The flow
    // runs on its own task so a dropped connection does not cut it short.
    let deadline = Instant::now() + state.config.request_timeout;
    let flow = tokio::spawn(async move { ctx.settle().await });
    match tokio::time::timeout_at(deadline, flow).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(path = %path, request = %request, error = %e, "flow task failed"),
        Err(_) => warn!(path = %path, request = %request, "flow still running at the request deadline"),
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match state.requesting.await_response(&request, remaining).await {
        Ok(response) if response.contains_key("error") => {
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        Ok(response) => Json(response).into_response(),
        Err(RequestingError::Timeout { .. }) => error_response(StatusCode::GATEWAY_TIMEOUT, TIMED_OUT),
        Err(e) => {
            error!(path = %path, request = %request, error = %e, "mediated request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_INTERNAL_ERROR)
        }
    }
}
