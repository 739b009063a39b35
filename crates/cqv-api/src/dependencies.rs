//! Handlers for dependency tracking and the change feed.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/microtheories/:id/dependencies` | Optional `?stale_only=true` |
//! | `GET`  | `/microtheories/:id/stale-questions` | |
//! | `GET`  | `/dependencies?element_iri=<iri>` | Across all microtheories |
//! | `POST` | `/notifications` | Body: [`ChangeNotification`], applied before responding |
//! | `POST` | `/notifications/batch` | Body: array, queued on the change feed (202) |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use cqv_core::{
  dependency::{ChangeNotification, OntologyDependency},
  engine::Engine,
  graph::GraphStore,
  microtheory::MicrotheoryRef,
  store::ValidationStore,
  tracker::StaleQuestion,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

#[derive(Debug, Deserialize)]
pub struct MicrotheoryParams {
  #[serde(default)]
  pub stale_only: bool,
}

/// `GET /microtheories/:id/dependencies[?stale_only=true]`
pub async fn for_microtheory<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
  Query(params): Query<MicrotheoryParams>,
) -> Result<Json<Vec<OntologyDependency>>> {
  let mt = engine.microtheories().resolve(&MicrotheoryRef::parse(&id)).await?;
  Ok(Json(engine.tracker().dependencies(&mt.iri, params.stale_only).await?))
}

/// `GET /microtheories/:id/stale-questions`
pub async fn stale<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<StaleQuestion>>> {
  Ok(Json(engine.stale_questions(&MicrotheoryRef::parse(&id)).await?))
}

#[derive(Debug, Deserialize)]
pub struct ElementParams {
  pub element_iri: String,
}

/// `GET /dependencies?element_iri=<iri>`
pub async fn for_element<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Query(params): Query<ElementParams>,
) -> Result<Json<Vec<OntologyDependency>>> {
  Ok(Json(engine.tracker().for_element(&params.element_iri).await?))
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
  pub invalidated: u64,
}

/// `POST /notifications`
pub async fn notify<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Json(body): Json<ChangeNotification>,
) -> Result<Json<NotifyResponse>> {
  if body.element_iri.is_empty() {
    return Err(ApiError::BadRequest("element_iri must not be empty".into()));
  }
  let invalidated = engine.notify(&body).await?;
  Ok(Json(NotifyResponse { invalidated }))
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
  pub queued: usize,
}

/// `POST /notifications/batch`
pub async fn notify_batch<S: ValidationStore + 'static, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Json(body): Json<Vec<ChangeNotification>>,
) -> Result<(StatusCode, Json<QueuedResponse>)> {
  if body.iter().any(|n| n.element_iri.is_empty()) {
    return Err(ApiError::BadRequest("element_iri must not be empty".into()));
  }
  let queued = engine.enqueue(body).await?;
  Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}
