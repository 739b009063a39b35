//! Handlers for `/microtheories` endpoints.
//!
//! `:id` accepts either the microtheory UUID or its graph IRI
//! (percent-encoded).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/microtheories` | `?project_id` required |
//! | `POST`   | `/microtheories` | Body: [`NewMicrotheory`]; returns 201 |
//! | `GET`    | `/microtheories/:id` | 404 if not found |
//! | `DELETE` | `/microtheories/:id` | Drops the graph; run history is kept |
//! | `POST`   | `/microtheories/:id/clone` | Body: `{"label":"..."}`; returns 201 |
//! | `POST`   | `/microtheories/:id/default` | |
//! | `POST`   | `/microtheories/:id/load` | Body: Turtle text |
//! | `POST`   | `/microtheories/:id/revalidate` | Re-runs stale questions |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use cqv_core::{
  Error,
  engine::Engine,
  graph::GraphStore,
  microtheory::{Microtheory, MicrotheoryRef, NewMicrotheory},
  run::CqRun,
  store::ValidationStore,
};
use serde::Deserialize;

use crate::error::{ApiError, Result};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub project_id: String,
}

/// `GET /microtheories?project_id=<id>`
pub async fn list<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Microtheory>>> {
  Ok(Json(engine.microtheories().list(&params.project_id).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /microtheories`
pub async fn create<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Json(body): Json<NewMicrotheory>,
) -> Result<impl IntoResponse> {
  if body.label.trim().is_empty() {
    return Err(ApiError::BadRequest("label must not be empty".into()));
  }
  let mt = engine.microtheories().create(body).await?;
  Ok((StatusCode::CREATED, Json(mt)))
}

// ─── Get one / delete ─────────────────────────────────────────────────────────

/// `GET /microtheories/:id`
pub async fn get_one<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
) -> Result<Json<Microtheory>> {
  let r = MicrotheoryRef::parse(&id);
  let mt = engine
    .microtheories()
    .get(&r)
    .await?
    .ok_or_else(|| Error::MicrotheoryNotFound(r.to_string()))?;
  Ok(Json(mt))
}

/// `DELETE /microtheories/:id`
pub async fn delete<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
) -> Result<StatusCode> {
  engine.microtheories().delete(&MicrotheoryRef::parse(&id)).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Clone ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CloneBody {
  pub label: String,
}

/// `POST /microtheories/:id/clone`
pub async fn clone_one<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
  Json(body): Json<CloneBody>,
) -> Result<impl IntoResponse> {
  if body.label.trim().is_empty() {
    return Err(ApiError::BadRequest("label must not be empty".into()));
  }
  let mt = engine.microtheories().clone_from(&MicrotheoryRef::parse(&id), body.label).await?;
  Ok((StatusCode::CREATED, Json(mt)))
}

// ─── Default / load ───────────────────────────────────────────────────────────

/// `POST /microtheories/:id/default`
pub async fn set_default<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
) -> Result<Json<Microtheory>> {
  Ok(Json(engine.microtheories().set_default(&MicrotheoryRef::parse(&id)).await?))
}

/// `POST /microtheories/:id/load`; body is Turtle.
pub async fn load<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
  turtle: String,
) -> Result<Json<Microtheory>> {
  Ok(Json(engine.microtheories().load(&MicrotheoryRef::parse(&id), &turtle).await?))
}

// ─── Revalidate ───────────────────────────────────────────────────────────────

/// `POST /microtheories/:id/revalidate`; returns the runs it produced.
pub async fn revalidate<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<CqRun>>> {
  Ok(Json(engine.revalidate(&MicrotheoryRef::parse(&id)).await?))
}
