//! The `ValidationStore` trait: durable state for questions, microtheory
//! metadata, run history and ontology dependencies.
//!
//! The trait is implemented by storage backends (e.g. `cqv-store-sqlite`).
//! The engine and the HTTP layer depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  dependency::{ChangeKind, ElementRef, OntologyDependency},
  microtheory::Microtheory,
  question::{CompetencyQuestion, CqStatus},
  run::{CqRun, Page},
};

/// Abstraction over a validation store backend.
///
/// Runs are append-only. Questions and microtheories are mutable metadata;
/// uniqueness of `(project_id, name)` and `(project_id, label)` is enforced
/// by the backend and reported through [`StoreConflict`].
pub trait ValidationStore: Send + Sync {
  type Error: std::error::Error + StoreConflict + Send + Sync + 'static;

  // ── Questions ─────────────────────────────────────────────────────────

  fn create_question(
    &self,
    cq: CompetencyQuestion,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_question(
    &self,
    cq_id: Uuid,
  ) -> impl Future<Output = Result<Option<CompetencyQuestion>, Self::Error>> + Send + '_;

  fn get_question_by_name<'a>(
    &'a self,
    project_id: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<CompetencyQuestion>, Self::Error>> + Send + 'a;

  /// Questions in `project_id`, ordered by name. `None` lists every project.
  fn list_questions<'a>(
    &'a self,
    project_id: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<CompetencyQuestion>, Self::Error>> + Send + 'a;

  /// Overwrite the mutable fields of an existing question.
  fn update_question(
    &self,
    cq: CompetencyQuestion,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_question_status(
    &self,
    cq_id: Uuid,
    status: CqStatus,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Hard-delete a question. Callers check [`Self::count_runs`] first.
  fn delete_question(
    &self,
    cq_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn count_runs(&self, cq_id: Uuid) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Microtheories ─────────────────────────────────────────────────────

  /// Insert a microtheory. When `mt.is_default` is set, the project's current
  /// default is cleared in the same transaction.
  fn create_microtheory(
    &self,
    mt: Microtheory,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_microtheory(
    &self,
    mt_id: Uuid,
  ) -> impl Future<Output = Result<Option<Microtheory>, Self::Error>> + Send + '_;

  fn get_microtheory_by_iri<'a>(
    &'a self,
    iri: &'a str,
  ) -> impl Future<Output = Result<Option<Microtheory>, Self::Error>> + Send + 'a;

  fn list_microtheories<'a>(
    &'a self,
    project_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Microtheory>, Self::Error>> + Send + 'a;

  fn default_microtheory<'a>(
    &'a self,
    project_id: &'a str,
  ) -> impl Future<Output = Result<Option<Microtheory>, Self::Error>> + Send + 'a;

  /// Atomically make `mt_id` the only default of its project. Returns the
  /// updated row, or `None` if it does not exist.
  fn set_default_microtheory(
    &self,
    mt_id: Uuid,
  ) -> impl Future<Output = Result<Option<Microtheory>, Self::Error>> + Send + '_;

  /// Remove the microtheory row and its dependency rows. Runs are kept.
  fn delete_microtheory(
    &self,
    mt_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Runs ──────────────────────────────────────────────────────────────

  /// Append a run. Never updates an existing row.
  fn record_run(&self, run: CqRun) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_run(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<Option<CqRun>, Self::Error>> + Send + '_;

  /// Run history for a question, newest first.
  fn list_runs(
    &self,
    cq_id: Uuid,
    page: Page,
  ) -> impl Future<Output = Result<Vec<CqRun>, Self::Error>> + Send + '_;

  /// The most recent passing run of `cq_id` against `microtheory_iri`.
  fn latest_passing_run<'a>(
    &'a self,
    cq_id: Uuid,
    microtheory_iri: &'a str,
  ) -> impl Future<Output = Result<Option<CqRun>, Self::Error>> + Send + 'a;

  /// Questions with at least one passing run against `microtheory_iri`.
  fn questions_passing_in<'a>(
    &'a self,
    microtheory_iri: &'a str,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + 'a;

  // ── Dependencies ──────────────────────────────────────────────────────

  /// Insert or refresh one row per element: new rows get `first_seen_at`,
  /// every row gets `last_validated_at = at` and `is_valid = true`.
  fn upsert_dependencies<'a>(
    &'a self,
    microtheory_iri: &'a str,
    elements: &'a [ElementRef],
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Flip matching valid rows to invalid. `graph_iri = None` matches every
  /// microtheory. Returns the number of rows changed.
  fn invalidate_dependencies<'a>(
    &'a self,
    graph_iri: Option<&'a str>,
    element_iri: &'a str,
    kind: ChangeKind,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  fn list_dependencies<'a>(
    &'a self,
    microtheory_iri: &'a str,
    invalid_only: bool,
  ) -> impl Future<Output = Result<Vec<OntologyDependency>, Self::Error>> + Send + 'a;

  /// Every microtheory's row for `element_iri`.
  fn dependencies_for_element<'a>(
    &'a self,
    element_iri: &'a str,
  ) -> impl Future<Output = Result<Vec<OntologyDependency>, Self::Error>> + Send + 'a;
}

/// Lets the engine distinguish uniqueness violations from other backend
/// failures without knowing the backend's error type.
pub trait StoreConflict {
  fn is_conflict(&self) -> bool;
}
