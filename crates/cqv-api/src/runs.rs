//! Handlers for run history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/questions/:id/runs` | Newest first; `?limit` (default 50), `?offset` |
//! | `GET` | `/questions/:id/runs/latest` | `null` when the question never ran |
//! | `GET` | `/runs/:id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use cqv_core::{
  engine::Engine,
  graph::GraphStore,
  run::{CqRun, Page},
  store::ValidationStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, Result};

const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

impl ListParams {
  fn page(&self) -> Result<Page> {
    let default = Page::default();
    let limit = self.limit.unwrap_or(default.limit);
    if limit == 0 || limit > MAX_LIMIT {
      return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_LIMIT}")));
    }
    Ok(Page { limit, offset: self.offset.unwrap_or(default.offset) })
  }
}

/// `GET /questions/:id/runs[?limit=..][&offset=..]`
pub async fn list<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CqRun>>> {
  Ok(Json(engine.list_runs(id, params.page()?).await?))
}

/// `GET /questions/:id/runs/latest`
pub async fn latest<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Option<CqRun>>> {
  Ok(Json(engine.latest_run(id).await?))
}

/// `GET /runs/:id`
pub async fn get_one<S: ValidationStore, G: GraphStore>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CqRun>> {
  Ok(Json(engine.get_run(id).await?))
}
