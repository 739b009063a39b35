//! Handlers for `/questions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/questions` | Optional `?project_id=` |
//! | `POST`   | `/questions` | Body: [`NewQuestion`]; returns 201 + question and lint warnings |
//! | `GET`    | `/questions/:id` | 404 if not found |
//! | `PATCH`  | `/questions/:id` | Body: [`QuestionPatch`] |
//! | `DELETE` | `/questions/:id` | 409 once the question has runs |
//! | `POST`   | `/questions/:id/status` | Body: `{"status":"active"}` |
//! | `POST`   | `/questions/:id/deprecate` | |
//! | `POST`   | `/questions/:id/execute` | Body: [`ExecuteRequest`]; always 200 once a run exists |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use cqv_core::{
  engine::{Authored, Engine, ExecuteRequest},
  graph::GraphStore,
  question::{CompetencyQuestion, CqStatus, NewQuestion, QuestionPatch},
  run::CqRun,
  store::ValidationStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub project_id: Option<String>,
}

/// `GET /questions[?project_id=<id>]`
pub async fn list<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CompetencyQuestion>>> {
  Ok(Json(engine.list_questions(params.project_id.as_deref()).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /questions`
pub async fn create<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Json(body): Json<NewQuestion>,
) -> Result<impl IntoResponse> {
  let authored = engine.create_question(body).await?;
  Ok((StatusCode::CREATED, Json(authored)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /questions/:id`
pub async fn get_one<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CompetencyQuestion>> {
  Ok(Json(engine.get_question(id).await?))
}

// ─── Update / delete ──────────────────────────────────────────────────────────

/// `PATCH /questions/:id`
pub async fn update<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<QuestionPatch>,
) -> Result<Json<Authored>> {
  Ok(Json(engine.update_question(id, patch).await?))
}

/// `DELETE /questions/:id`
pub async fn delete<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode> {
  engine.delete_question(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: CqStatus,
}

/// `POST /questions/:id/status`
pub async fn set_status<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<CompetencyQuestion>> {
  Ok(Json(engine.set_status(id, body.status).await?))
}

/// `POST /questions/:id/deprecate`
pub async fn deprecate<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CompetencyQuestion>> {
  Ok(Json(engine.deprecate(id).await?))
}

// ─── Execute ──────────────────────────────────────────────────────────────────

/// `POST /questions/:id/execute`
///
/// A contract or execution failure is a recorded run with `pass: false`, not
/// an HTTP error. Only rejections before binding return an error status.
pub async fn execute<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ExecuteRequest>,
) -> Result<Json<CqRun>> {
  Ok(Json(engine.execute(id, body).await?))
}
