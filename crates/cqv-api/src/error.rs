//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use cqv_core::graph::GraphError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] cqv_core::Error),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    use cqv_core::Error as E;
    match self {
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Engine(e) => match e {
        E::QuestionNotFound(_) | E::MicrotheoryNotFound(_) | E::RunNotFound(_) => {
          StatusCode::NOT_FOUND
        }
        E::DuplicateQuestionName { .. }
        | E::DuplicateMicrotheoryLabel { .. }
        | E::QuestionDeprecated(_)
        | E::QuestionHasRuns(_)
        | E::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
        E::InvalidTemplate(_)
        | E::InvalidParameterSchema(_)
        | E::NoTargetMicrotheory
        | E::MicrotheoryOutsideProject { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        E::Graph(GraphError::InvalidContent(_)) => StatusCode::BAD_REQUEST,
        E::Graph(_) => StatusCode::BAD_GATEWAY,
        E::RunNotRecorded(_) | E::ChangeFeedClosed => StatusCode::SERVICE_UNAVAILABLE,
        E::Store(_) | E::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn code(&self) -> &'static str {
    match self {
      Self::BadRequest(_) => "bad_request",
      Self::Engine(e) => e.code(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::warn!(code = self.code(), error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string(), "code": self.code() }))).into_response()
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
