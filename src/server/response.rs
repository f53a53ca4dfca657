use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::engine::Transcription;
use crate::error::Error;
use crate::server::params::CorrelationId;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Turn a handler outcome into exactly one JSON envelope, logging it under `id`.
pub fn respond(id: &CorrelationId, outcome: Result<Transcription, Error>) -> Response {
    match outcome {
        Ok(transcription) => success(id, transcription),
        Err(err) => failure(id, &err),
    }
}

/// `{id, latency, ...result}` with status 200.
///
/// Keys in the engine payload win over `id`/`latency`, matching object-spread semantics.
pub fn success(id: &CorrelationId, transcription: Transcription) -> Response {
    info!(
        id = %id,
        status = StatusCode::OK.as_u16(),
        latency_ms = transcription.latency_ms,
        "transcription succeeded"
    );

    let mut body = Map::new();
    body.insert("id".into(), serde_json::to_value(id).unwrap_or(Value::Null));
    body.insert("latency".into(), Value::from(transcription.latency_ms));
    body.extend(transcription.result);

    (StatusCode::OK, Json(Value::Object(body))).into_response()
}

/// `{error}` with the status mapped from the error kind.
pub fn failure(id: &CorrelationId, err: &Error) -> Response {
    let status = err.status();
    warn!(id = %id, status = status.as_u16(), error = %err, "transcription failed");

    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}
