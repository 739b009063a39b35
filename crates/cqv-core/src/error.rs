//! Error types for `cqv-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{graph::GraphError, question::CqStatus};

#[derive(Debug, Error)]
pub enum Error {
  #[error("competency question not found: {0}")]
  QuestionNotFound(Uuid),

  #[error("competency question {name:?} already exists in project {project_id:?}")]
  DuplicateQuestionName { project_id: String, name: String },

  #[error("competency question {0} is deprecated")]
  QuestionDeprecated(Uuid),

  #[error("competency question {0} has recorded runs and cannot be deleted")]
  QuestionHasRuns(Uuid),

  #[error("cannot move a question from {from} to {to}")]
  InvalidStatusTransition { from: CqStatus, to: CqStatus },

  #[error("invalid query template: {0}")]
  InvalidTemplate(String),

  #[error("invalid parameter schema: {0}")]
  InvalidParameterSchema(String),

  #[error("microtheory not found: {0}")]
  MicrotheoryNotFound(String),

  #[error("microtheory {label:?} already exists in project {project_id:?}")]
  DuplicateMicrotheoryLabel { project_id: String, label: String },

  #[error("microtheory {microtheory} belongs to project {actual:?}, not {expected:?}")]
  MicrotheoryOutsideProject { microtheory: String, expected: String, actual: String },

  #[error("run not found: {0}")]
  RunNotFound(Uuid),

  #[error("no target microtheory: no override, no question default and no project default")]
  NoTargetMicrotheory,

  #[error("run record could not be written: {0}")]
  RunNotRecorded(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("change feed is no longer running")]
  ChangeFeedClosed,

  #[error("graph store error: {0}")]
  Graph(#[from] GraphError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a storage backend error.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// A stable machine-readable code for this error.
  pub fn code(&self) -> &'static str {
    match self {
      Self::QuestionNotFound(_) => "question_not_found",
      Self::DuplicateQuestionName { .. } => "duplicate_question_name",
      Self::QuestionDeprecated(_) => "question_deprecated",
      Self::QuestionHasRuns(_) => "question_has_runs",
      Self::InvalidStatusTransition { .. } => "invalid_status_transition",
      Self::InvalidTemplate(_) => "invalid_template",
      Self::InvalidParameterSchema(_) => "invalid_parameter_schema",
      Self::MicrotheoryNotFound(_) => "microtheory_not_found",
      Self::DuplicateMicrotheoryLabel { .. } => "duplicate_microtheory_label",
      Self::MicrotheoryOutsideProject { .. } => "microtheory_outside_project",
      Self::RunNotFound(_) => "run_not_found",
      Self::NoTargetMicrotheory => "no_target_microtheory",
      Self::RunNotRecorded(_) => "run_not_recorded",
      Self::ChangeFeedClosed => "change_feed_closed",
      Self::Graph(GraphError::InvalidContent(_)) => "invalid_graph_content",
      Self::Graph(e) => e.reason().as_str(),
      Self::Store(_) => "store_error",
      Self::Serialization(_) => "serialization_error",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
