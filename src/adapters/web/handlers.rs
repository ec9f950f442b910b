//! HTTP request handlers for the web adapter.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::domain::orchestrator::{Actor, Mode, Orchestrator, Role, Scope};

use super::{AppState, WebError};

/// Pull the actor out of the headers the auth layer sets.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, WebError> {
    let user_id = headers
        .get("X-Actor-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| WebError::unauthorized("missing or malformed X-Actor-Id header"))?;

    let role = match headers.get("X-Actor-Role").and_then(|v| v.to_str().ok()) {
        Some("admin") => Role::Admin,
        _ => Role::Member,
    };

    Ok(Actor { user_id, role })
}

fn scope_from(model_id: Option<i64>, task_id: Option<i64>) -> Result<Scope, WebError> {
    match (model_id, task_id) {
        (Some(_), Some(_)) | (None, None) => Err(WebError::bad_request(
            "provide exactly one of model_id or task_id",
        )),
        (Some(model_id), None) => Ok(Scope::Model(model_id)),
        (None, Some(task_id)) => Ok(Scope::Task(task_id)),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct VerifyRequest {
    pub user_id: Option<i64>,
    pub model_id: Option<i64>,
    pub task_id: Option<i64>,
    /// One of `preview`, `run`, `recalc_all`.
    pub mode: String,
}

/// Machine-readable shape: evaluate and return the structured report.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Response, WebError> {
    let actor = actor_from_headers(&headers)?;
    let engine = Orchestrator::new(&*state.catalog, &*state.ledger, &*state.progress)
        .with_chunk_size(state.chunk_size);
    let as_of = Utc::now().date_naive();

    match req.mode.as_str() {
        "recalc_all" => {
            let model_id = req
                .model_id
                .ok_or_else(|| WebError::bad_request("recalc_all requires model_id"))?;
            let batch = engine.recalc_all(&actor, model_id, as_of)?;
            Ok(Json(batch).into_response())
        }
        mode @ ("preview" | "run") => {
            let mode = if mode == "preview" {
                Mode::Preview
            } else {
                Mode::Run
            };
            let target = req.user_id.unwrap_or(actor.user_id);
            let scope = scope_from(req.model_id, req.task_id)?;
            let report = engine.verify(&actor, target, scope, mode, as_of)?;
            Ok(Json(report).into_response())
        }
        other => Err(WebError::bad_request(format!("unknown mode: {other}"))),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ApplyForm {
    pub user_id: Option<i64>,
    pub model_id: i64,
    pub task_id: Option<i64>,
}

/// Interactive shape: run, then redirect back to the model page with a
/// human-readable status summary. Same evaluation path as [`verify`].
pub async fn verify_apply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ApplyForm>,
) -> Result<Response, WebError> {
    let actor = actor_from_headers(&headers)?;
    let engine = Orchestrator::new(&*state.catalog, &*state.ledger, &*state.progress)
        .with_chunk_size(state.chunk_size);

    let target = form.user_id.unwrap_or(actor.user_id);
    let scope = match form.task_id {
        Some(task_id) => Scope::Task(task_id),
        None => Scope::Model(form.model_id),
    };

    let report = engine.verify(&actor, target, scope, Mode::Run, Utc::now().date_naive())?;

    let location = format!(
        "/models/{}?status={}",
        form.model_id,
        urlencoding::encode(&report.summary())
    );
    Ok(Redirect::to(&location).into_response())
}

/// Liveness probe used by deployment tooling.
pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
