// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trigger endpoints: storage events and direct ingestion requests.

use crate::config::StorageMode;
use crate::error::AppError;
use crate::models::IngestEvent;
use crate::services::TerminalState;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Event routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{token}", post(handle_event))
        .route("/ingest/{token}", post(handle_ingest))
}

/// Direct ingestion request.
#[derive(Deserialize, Debug)]
struct IngestRequest {
    file_key: String,
    #[serde(default)]
    lineage: Option<String>,
}

fn token_matches(state: &AppState, token: &str, route: &'static str) -> bool {
    if token == state.config.event_path_token {
        return true;
    }
    tracing::warn!(route, "Security Alert: event path token mismatch");
    false
}

/// Handle a storage event (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    if !token_matches(&state, &token, "events") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let event = match IngestEvent::from_json(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected event payload");
            return e.into_response();
        }
    };

    if let (StorageMode::Gcs { bucket }, Some(event_bucket)) =
        (&state.config.storage, &event.bucket)
    {
        if bucket != event_bucket {
            tracing::warn!(
                expected = %bucket,
                received = %event_bucket,
                object_key = %event.object_key,
                "Event for unexpected bucket"
            );
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    run(&state, event).await
}

/// Handle a direct ingestion request (POST).
async fn handle_ingest(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(request): Json<IngestRequest>,
) -> Response {
    if !token_matches(&state, &token, "ingest") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut event = IngestEvent::local(request.file_key);
    if let Some(lineage) = request.lineage {
        event = event.with_lineage(lineage);
    }
    run(&state, event).await
}

async fn run(state: &AppState, event: IngestEvent) -> Response {
    let result = state.pipeline.process(&event).await;
    let terminal = TerminalState::of(&result);

    match result {
        Ok(outcome) => {
            tracing::info!(
                file_key = %outcome.file_key,
                state = ?terminal,
                "Event handled"
            );
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => {
            log_abort(&event, &e);
            e.into_response()
        }
    }
}

fn log_abort(event: &IngestEvent, error: &AppError) {
    match error {
        AppError::Parse(_) | AppError::BadRequest(_) | AppError::NotFound(_) => {
            tracing::warn!(
                file_key = %event.object_key,
                state = ?TerminalState::Aborted,
                error = %error,
                "Event rejected"
            );
        }
        _ => {
            tracing::error!(
                file_key = %event.object_key,
                state = ?TerminalState::Aborted,
                error = %error,
                "Event aborted"
            );
        }
    }
}
